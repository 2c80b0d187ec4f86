#![expect(missing_docs, reason = "benchmarks")]

use std::hint::black_box;
use std::pin::pin;
use std::task;
use std::task::Waker;

use criterion::{Criterion, criterion_group, criterion_main};
use value_source::{CompletionSource, SourcePool};

fn entrypoint(c: &mut Criterion) {
    let mut g = c.benchmark_group("value_source_vs_3p");

    let pool = SourcePool::<i32>::builder().capacity(4).build();

    g.bench_function("pooled_set_get_result", |b| {
        b.iter(|| {
            let (source, future) = pool.create();

            source.set_result(42);

            _ = black_box(future.get_result());
        });
    });

    g.bench_function("pooled_set_poll", |b| {
        b.iter(|| {
            let (source, future) = pool.create();
            let mut future = pin!(future);

            source.set_result(42);

            let mut cx = task::Context::from_waker(Waker::noop());
            _ = black_box(future.as_mut().poll(&mut cx));
        });
    });

    g.bench_function("unpooled_set_poll", |b| {
        b.iter(|| {
            let (source, future) = CompletionSource::<i32>::create_unpooled();
            let mut future = pin!(future);

            source.set_result(42);

            let mut cx = task::Context::from_waker(Waker::noop());
            _ = black_box(future.as_mut().poll(&mut cx));
        });
    });

    g.bench_function("oneshot_send_receive", |b| {
        b.iter(|| {
            let (sender, receiver) = oneshot::channel::<i32>();
            let mut receiver = pin!(receiver);

            sender.send(42).unwrap();

            let mut cx = task::Context::from_waker(Waker::noop());
            _ = black_box(receiver.as_mut().poll(&mut cx));
        });
    });

    g.bench_function("pooled_set_poll_2poll", |b| {
        b.iter(|| {
            let (source, future) = pool.create();
            let mut future = pin!(future);

            let mut cx = task::Context::from_waker(Waker::noop());

            _ = black_box(future.as_mut().poll(&mut cx));
            source.set_result(42);
            _ = black_box(future.as_mut().poll(&mut cx));
        });
    });

    g.bench_function("oneshot_send_receive_2poll", |b| {
        b.iter(|| {
            let (sender, receiver) = oneshot::channel::<i32>();
            let mut receiver = pin!(receiver);

            let mut cx = task::Context::from_waker(Waker::noop());

            _ = black_box(receiver.as_mut().poll(&mut cx));
            sender.send(42).unwrap();
            _ = black_box(receiver.as_mut().poll(&mut cx));
        });
    });

    g.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
