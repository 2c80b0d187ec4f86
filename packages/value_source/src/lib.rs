#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Pooled single-assignment completion sources.
//!
//! A [`CompletionSource`] lets a producer complete an asynchronous operation exactly once, with a
//! value, an error or a cancellation. The paired [`ValueFuture`] lets a consumer observe the
//! outcome: by awaiting it, by polling its [`Status`] or by registering a callback.
//!
//! Both handles refer to a [`SignalSlot`] that is drawn from a [`SourcePool`] and returned there
//! once the consumer has taken the outcome. Each reuse of a slot is a new generation identified
//! by a token carried in the handles, so handles left over from an earlier generation can never
//! affect a later one. A steady stream of operations completed and consumed one after another
//! allocates a single slot.
//!
//! # Quick start
//!
//! ```rust
//! use std::thread;
//!
//! use value_source::{CompletionSource, Status};
//! # use futures::executor::block_on;
//!
//! # block_on(async {
//! let (source, future) = CompletionSource::<u32>::create();
//!
//! assert_eq!(future.status(), Status::Pending);
//!
//! thread::spawn(move || source.set_result(42));
//!
//! assert_eq!(future.await.unwrap(), 42);
//! # });
//! ```
//!
//! # Completion
//!
//! A source can be cloned and the clones may race to complete it. The first completion wins; the
//! `try_*` methods of the losers return `false` and the `set_*` methods panic. A producer that
//! fails reports its own error type via [`CompletionSource::set_error()`] and the consumer
//! receives exactly that error, wrapped in [`Error::Faulted`]. Cancellation is reported as
//! [`Error::Canceled`].
//!
//! # Continuations
//!
//! [`ValueFuture::register_continuation()`] registers a callback that runs once the operation
//! completes. [`ContinuationFlags`] decide what the callback captures from the registering
//! thread:
//!
//! * [`ContinuationFlags::USE_SCHEDULING_CONTEXT`] captures the current
//!   [`SynchronizationContext`] or [`TaskScheduler`] and delivers the callback through it.
//! * [`ContinuationFlags::FLOW_EXECUTION_CONTEXT`] captures the current `tracing` span and
//!   re-enters it around the callback.
//!
//! Without a captured context, a callback registered before completion runs on the completing
//! thread, unless the pool was configured to [run continuations asynchronously][1]. A callback
//! registered after completion is always handed to the shared [`ThreadPool`], so it never runs
//! inside the registering call.
//!
//! # Misuse
//!
//! Using a handle whose generation has already been consumed, registering two continuations,
//! or asking for the result before completion are programming errors and panic.
//!
//! [1]: SourcePoolBuilder::run_continuations_asynchronously

mod context;
mod dispatch;
mod error;
mod future;
mod pool;
mod slot;
mod source;
mod state;
mod status;
mod thread_pool;

pub use context::*;
pub use dispatch::ContinuationFlags;
pub use error::*;
pub use future::*;
pub use pool::{SourcePool, SourcePoolBuilder};
pub use slot::*;
pub use source::*;
pub use status::*;
pub use thread_pool::*;
