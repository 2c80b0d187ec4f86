use std::any::type_name;
use std::cell::UnsafeCell;
use std::fmt;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Poll, Waker};

use tracing::{debug, trace};

use crate::dispatch::{Continuation, dispatch};
use crate::pool::PoolCore;
use crate::state::{
    EXHAUSTED_TOKEN, PHASE_AWAITING, PHASE_CANCELED, PHASE_COMPLETING, PHASE_CONSUMING,
    PHASE_FAULTED, PHASE_PENDING, PHASE_REGISTERING, PHASE_SUCCEEDED, is_completed_phase, pack,
    phase_name, phase_of, token_of,
};
use crate::{CompletionSource, ContinuationFlags, Error, Result, Status, ValueFuture};

/// The reusable state behind one [`CompletionSource`] and [`ValueFuture`] pair.
///
/// A slot coordinates the delivery of one outcome per generation from a producer to a consumer
/// on any thread. Every operation is gated by the generation token that the handles were bound
/// to. Once the consumer has taken the outcome, the token advances and any handle still carrying
/// the old token is stale: completion through it fails and queries through it panic.
///
/// Slots are normally used through the handles; the slot-level operations exist for consumers
/// that hand the slot and token to continuations instead of the [`ValueFuture`] itself.
pub struct SignalSlot<T>
where
    T: Send + 'static,
{
    /// Generation token and phase, packed; see `state.rs`.
    state: AtomicU32,

    /// Populated while the phase is one of the completed phases, empty otherwise.
    ///
    /// We use `UnsafeCell` because we are a synchronization primitive and
    /// do our own synchronization of reads/writes.
    outcome: UnsafeCell<Option<Result<T>>>,

    /// Populated while the phase is `awaiting`, empty in every other stable phase.
    ///
    /// We use `UnsafeCell` because we are a synchronization primitive and
    /// do our own synchronization of reads/writes.
    continuation: UnsafeCell<Option<Continuation>>,

    /// Where the slot goes once the outcome has been consumed. Dangling for unpooled slots.
    pool: Weak<PoolCore<T>>,

    run_continuations_asynchronously: bool,
}

impl<T> SignalSlot<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(pool: Weak<PoolCore<T>>, run_continuations_asynchronously: bool) -> Self {
        Self::with_state(pack(0, PHASE_PENDING), pool, run_continuations_asynchronously)
    }

    fn with_state(
        state: u32,
        pool: Weak<PoolCore<T>>,
        run_continuations_asynchronously: bool,
    ) -> Self {
        Self {
            state: AtomicU32::new(state),
            outcome: UnsafeCell::new(None),
            continuation: UnsafeCell::new(None),
            pool,
            run_continuations_asynchronously,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_token(token: u16, pool: Weak<PoolCore<T>>) -> Self {
        Self::with_state(pack(token, PHASE_PENDING), pool, false)
    }

    /// Creates the handle pair for the current generation of a slot that nobody else holds.
    pub(crate) fn bind(slot: Arc<Self>) -> (CompletionSource<T>, ValueFuture<T>) {
        let state = slot.state.load(Ordering::Acquire);
        let token = token_of(state);

        debug_assert_eq!(
            phase_of(state),
            PHASE_PENDING,
            "only blank slots may be bound to a new completion source"
        );
        debug_assert_ne!(token, EXHAUSTED_TOKEN, "exhausted slots must never be reused");

        trace!(token, "binding slot to a new completion source");

        (
            CompletionSource::new(Arc::clone(&slot), token),
            ValueFuture::new(slot, token),
        )
    }

    /// The token of the generation the slot is currently serving.
    #[must_use]
    pub fn token(&self) -> u16 {
        token_of(self.state.load(Ordering::Acquire))
    }

    /// Whether the slot has used up all of its generations and will never be reused.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.token() == EXHAUSTED_TOKEN
    }

    /// Whether continuations registered before completion are still moved off the completing
    /// thread.
    #[must_use]
    pub fn runs_continuations_asynchronously(&self) -> bool {
        self.run_continuations_asynchronously
    }

    /// Reports the status of the generation identified by `token`.
    ///
    /// # Panics
    ///
    /// Panics if `token` does not identify the current generation, if the slot is retired or if
    /// the outcome is concurrently being consumed.
    #[must_use]
    pub fn status(&self, token: u16) -> Status {
        let state = self.state.load(Ordering::Acquire);
        Self::check_token(state, token, "querying status");

        match phase_of(state) {
            PHASE_PENDING | PHASE_AWAITING | PHASE_REGISTERING | PHASE_COMPLETING => {
                Status::Pending
            }
            PHASE_SUCCEEDED => Status::Succeeded,
            PHASE_FAULTED => Status::Faulted,
            PHASE_CANCELED => Status::Canceled,
            PHASE_CONSUMING => {
                panic!("invalid operation: querying status while the outcome is being consumed")
            }
            phase => unreachable!("unreachable SignalSlot phase on status: {phase}"),
        }
    }

    /// Whether the generation identified by `token` has been completed.
    ///
    /// Unlike [`status()`][Self::status], this accepts tokens of past generations, which are
    /// completed by definition because a token only advances once the outcome was consumed.
    pub(crate) fn has_completed(&self, token: u16) -> bool {
        let state = self.state.load(Ordering::Acquire);

        token_of(state) != token
            || is_completed_phase(phase_of(state))
            || phase_of(state) == PHASE_CONSUMING
    }

    /// Registers a callback to run once the generation identified by `token` completes.
    ///
    /// If the generation has already completed, the callback is dispatched as if asynchronous
    /// continuations were demanded, so it never runs inside this call.
    ///
    /// # Panics
    ///
    /// Panics if `token` does not identify the current generation, if a continuation is already
    /// registered or if the outcome is being consumed.
    pub fn register_continuation<F, S>(
        &self,
        token: u16,
        callback: F,
        state: S,
        flags: ContinuationFlags,
    ) where
        F: FnOnce(S) + Send + 'static,
        S: Send + 'static,
    {
        // Captured before we claim the slot, so the claim only covers the field write.
        let continuation = Continuation::capture(Box::new(move || callback(state)), flags);

        let mut current = self.state.load(Ordering::Acquire);

        loop {
            Self::check_token(current, token, "registering a continuation");

            match phase_of(current) {
                PHASE_PENDING => {
                    // We use Acquire on both paths because a failed exchange may reveal a
                    // completion whose outcome we are about to act on.
                    match self.state.compare_exchange_weak(
                        current,
                        pack(token, PHASE_REGISTERING),
                        Ordering::Acquire,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            // SAFETY: The `registering` phase grants us exclusive access to the
                            // continuation field; the producer spins until we leave it.
                            unsafe {
                                *self.continuation.get() = Some(continuation);
                            }

                            // Release the continuation field to whoever completes the slot.
                            self.state
                                .store(pack(token, PHASE_AWAITING), Ordering::Release);

                            trace!(token, "continuation registered");
                            return;
                        }
                        Err(actual) => current = actual,
                    }
                }
                PHASE_AWAITING => {
                    panic!("invalid operation: a continuation is already registered")
                }
                PHASE_REGISTERING => panic!(
                    "invalid operation: a continuation is concurrently being registered by another thread"
                ),
                PHASE_COMPLETING => {
                    // The producer is about to publish the outcome. This is short.
                    spin_loop();
                    current = self.state.load(Ordering::Acquire);
                }
                PHASE_SUCCEEDED | PHASE_FAULTED | PHASE_CANCELED => {
                    trace!(
                        token,
                        "continuation registered after completion, dispatching asynchronously"
                    );

                    dispatch(continuation, true);
                    return;
                }
                PHASE_CONSUMING => panic!(
                    "invalid operation: registering a continuation while the outcome is being consumed"
                ),
                phase => unreachable!("unreachable SignalSlot phase on registration: {phase}"),
            }
        }
    }

    /// We are intended to be polled via `Future::poll`, so we have an equivalent signature here.
    ///
    /// On `Ready`, the outcome has been consumed and the slot has moved on to its next
    /// generation.
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause timeouts and hailstorms.
    pub(crate) fn poll_result(self: &Arc<Self>, token: u16, waker: &Waker) -> Poll<Result<T>> {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            Self::check_token(current, token, "polling");

            match phase_of(current) {
                phase @ (PHASE_PENDING | PHASE_AWAITING) => {
                    match self.state.compare_exchange_weak(
                        current,
                        pack(token, PHASE_REGISTERING),
                        Ordering::Acquire,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            self.store_waker(token, phase, waker);
                            return Poll::Pending;
                        }
                        Err(actual) => current = actual,
                    }
                }
                PHASE_REGISTERING => panic!(
                    "invalid operation: a continuation is concurrently being registered by another thread"
                ),
                PHASE_COMPLETING => {
                    spin_loop();
                    current = self.state.load(Ordering::Acquire);
                }
                PHASE_SUCCEEDED | PHASE_FAULTED | PHASE_CANCELED => {
                    return Poll::Ready(self.get_result(token));
                }
                PHASE_CONSUMING => {
                    panic!("invalid operation: polling while the outcome is being consumed")
                }
                phase => unreachable!("unreachable SignalSlot phase on poll: {phase}"),
            }
        }
    }

    /// Stores or replaces the waker. Must be called in the `registering` phase, which this
    /// leaves again via `awaiting`.
    fn store_waker(&self, token: u16, previous_phase: u32, waker: &Waker) {
        // SAFETY: The `registering` phase grants us exclusive access to the continuation field;
        // the producer spins until we leave it.
        let continuation = unsafe { &mut *self.continuation.get() };

        if continuation.as_ref().is_some_and(|existing| !existing.is_waker()) {
            // Someone registered an explicit callback and is now also polling. We put
            // everything back as it was and refuse.
            self.state
                .store(pack(token, previous_phase), Ordering::Release);
            panic!("invalid operation: a continuation is already registered");
        }

        let replaced = if continuation
            .as_ref()
            .is_some_and(|existing| existing.will_wake(waker))
        {
            None
        } else {
            continuation.replace(Continuation::from_waker(waker.clone()))
        };

        // Release the continuation field to whoever completes the slot.
        self.state
            .store(pack(token, PHASE_AWAITING), Ordering::Release);

        // Dropped outside the claim because a waker drop can run arbitrary code.
        drop(replaced);
    }

    /// Takes the outcome of the generation identified by `token`, advances the slot to its next
    /// generation and returns the slot to its pool.
    ///
    /// # Panics
    ///
    /// Panics if `token` does not identify the current generation (e.g. because the outcome was
    /// already consumed) or if the generation has not completed yet. Waiting for completion is
    /// not supported; register a continuation or await the [`ValueFuture`] instead.
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause timeouts and hailstorms.
    pub fn get_result(self: &Arc<Self>, token: u16) -> Result<T> {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            Self::check_token(current, token, "getting the result");

            match phase_of(current) {
                PHASE_SUCCEEDED | PHASE_FAULTED | PHASE_CANCELED => {
                    // Acquire pairs with the Release that published the outcome.
                    match self.state.compare_exchange_weak(
                        current,
                        pack(token, PHASE_CONSUMING),
                        Ordering::Acquire,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
                PHASE_CONSUMING => {
                    panic!("invalid operation: the outcome is already being consumed")
                }
                _ => panic!(
                    "invalid operation: result requested before completion; waiting for completion is not supported"
                ),
            }
        }

        // SAFETY: The `consuming` phase grants us exclusive access to the outcome field; the
        // producer only writes it in `completing`, which it cannot enter for this generation.
        let outcome = unsafe { (*self.outcome.get()).take() };

        let Some(outcome) = outcome else {
            unreachable!("completed SignalSlot has no outcome");
        };

        // `check_token` rejects the exhausted token, so this cannot overflow.
        let next_token = token + 1;

        // Release our exclusive access. Handles of the consumed generation are stale from here on.
        self.state
            .store(pack(next_token, PHASE_PENDING), Ordering::Release);

        trace!(token, next_token, "outcome consumed");

        self.recycle(next_token);

        outcome
    }

    /// Attempts to complete the generation identified by `token` with `outcome`.
    ///
    /// Returns `false` if the generation has already been completed, if `token` belongs to a
    /// past generation or if the slot is retired. In that case the outcome is dropped.
    ///
    /// If a continuation was registered, it is dispatched before this returns (or handed off, if
    /// it must run elsewhere).
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause timeouts and hailstorms.
    pub fn try_set_outcome(&self, token: u16, outcome: Result<T>) -> bool {
        let outcome = outcome.map_err(Error::normalized);
        let completed_phase = Status::of_outcome(&outcome).completed_phase();

        if token == EXHAUSTED_TOKEN {
            trace!(token, "completion of a retired slot rejected");
            return false;
        }

        let mut current = self.state.load(Ordering::Relaxed);

        let previous_phase = loop {
            if token_of(current) != token {
                trace!(token, current_token = token_of(current), "stale completion rejected");
                return false;
            }

            match phase_of(current) {
                phase @ (PHASE_PENDING | PHASE_AWAITING) => {
                    // Acquire on success pairs with the Release that stored the continuation.
                    match self.state.compare_exchange_weak(
                        current,
                        pack(token, PHASE_COMPLETING),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break phase,
                        Err(actual) => current = actual,
                    }
                }
                PHASE_REGISTERING => {
                    // The consumer is writing its continuation. This is short.
                    spin_loop();
                    current = self.state.load(Ordering::Relaxed);
                }
                _ => {
                    trace!(token, "completion rejected, slot already completed");
                    return false;
                }
            }
        };

        // SAFETY: The `completing` phase grants us exclusive access to the outcome field, which
        // is empty because the previous outcome was taken before the token advanced.
        unsafe {
            *self.outcome.get() = Some(outcome);
        }

        let continuation = if previous_phase == PHASE_AWAITING {
            // SAFETY: The `completing` phase grants us exclusive access to the continuation
            // field and the `awaiting` phase we came from guarantees it is populated.
            unsafe { (*self.continuation.get()).take() }
        } else {
            None
        };

        let forced_async = self.run_continuations_asynchronously;

        // Release the outcome to the consumer. From here on, the consumer may take the outcome
        // and recycle the slot, so we touch nothing but the continuation we now own.
        self.state
            .store(pack(token, completed_phase), Ordering::Release);

        trace!(
            token,
            phase = phase_name(completed_phase),
            has_continuation = continuation.is_some(),
            "slot completed"
        );

        if let Some(continuation) = continuation {
            dispatch(continuation, forced_async);
        }

        true
    }

    fn recycle(self: &Arc<Self>, next_token: u16) {
        if next_token == EXHAUSTED_TOKEN {
            debug!("signal slot has used up all of its tokens and is retired");
            return;
        }

        if let Some(pool) = self.pool.upgrade() {
            pool.return_slot(Arc::clone(self));
        }
    }

    fn check_token(state: u32, token: u16, operation: &str) {
        let current = token_of(state);

        assert!(
            token != EXHAUSTED_TOKEN,
            "invalid operation: {operation} on a slot that has used up all of its tokens"
        );
        assert!(
            current == token,
            "invalid operation: {operation} with token {token} but the slot is at token {current}; \
             the handle belongs to a generation that has already been consumed"
        );
    }
}

impl<T> fmt::Debug for SignalSlot<T>
where
    T: Send + 'static,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);

        f.debug_struct(type_name::<Self>())
            .field("token", &token_of(state))
            .field("phase", &phase_name(phase_of(state)))
            .field(
                "run_continuations_asynchronously",
                &self.run_continuations_asynchronously,
            )
            .finish_non_exhaustive()
    }
}

// SAFETY: Access to the `UnsafeCell` fields is synchronized by the state machine, so the slot
// can be shared between threads as long as the outcome itself can move between them.
// Continuations are always `Send`.
unsafe impl<T> Send for SignalSlot<T> where T: Send + 'static {}
// SAFETY: See above.
unsafe impl<T> Sync for SignalSlot<T> where T: Send + 'static {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, mpsc};
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::{CountingWaker, with_watchdog};

    use super::*;

    assert_impl_all!(SignalSlot<u32>: Send, Sync);

    fn unpooled() -> Arc<SignalSlot<u32>> {
        Arc::new(SignalSlot::new(Weak::new(), false))
    }

    #[test]
    fn new_slot_is_pending_at_token_zero() {
        let slot = unpooled();

        assert_eq!(slot.token(), 0);
        assert_eq!(slot.status(0), Status::Pending);
        assert!(!slot.has_completed(0));
        assert!(!slot.is_exhausted());
    }

    #[test]
    fn consuming_advances_token() {
        let slot = unpooled();

        assert!(slot.try_set_outcome(0, Ok(42)));
        assert_eq!(slot.status(0), Status::Succeeded);
        assert_eq!(slot.get_result(0).unwrap(), 42);

        assert_eq!(slot.token(), 1);
        assert_eq!(slot.status(1), Status::Pending);
        assert!(slot.has_completed(0));
    }

    #[test]
    fn second_completion_is_rejected() {
        let slot = unpooled();

        assert!(slot.try_set_outcome(0, Err(Error::canceled(None))));
        assert!(!slot.try_set_outcome(0, Ok(1)));

        assert_eq!(slot.status(0), Status::Canceled);
        assert!(slot.get_result(0).unwrap_err().is_canceled());
    }

    #[test]
    fn stale_token_completion_is_rejected() {
        let slot = unpooled();

        assert!(slot.try_set_outcome(0, Ok(1)));
        slot.get_result(0).unwrap();

        assert!(!slot.try_set_outcome(0, Ok(2)));
        assert_eq!(slot.status(1), Status::Pending);
    }

    #[test]
    fn faulted_status_is_reported() {
        let slot = unpooled();

        assert!(slot.try_set_outcome(0, Err(Error::faulted("broken"))));

        assert_eq!(slot.status(0), Status::Faulted);
        assert!(slot.has_completed(0));
    }

    #[test]
    #[should_panic]
    fn status_with_stale_token_panics() {
        let slot = unpooled();

        let _status = slot.status(1);
    }

    #[test]
    #[should_panic]
    fn result_before_completion_panics() {
        let slot = unpooled();

        _ = slot.get_result(0);
    }

    #[test]
    #[should_panic]
    fn consuming_twice_panics() {
        let slot = unpooled();

        assert!(slot.try_set_outcome(0, Ok(1)));
        slot.get_result(0).unwrap();

        _ = slot.get_result(0);
    }

    #[test]
    fn continuation_registered_before_completion_runs_on_completer() {
        let slot = unpooled();
        let (tx, rx) = mpsc::channel();

        slot.register_continuation(
            0,
            |tx: mpsc::Sender<_>| tx.send(thread::current().id()).unwrap(),
            tx,
            ContinuationFlags::NONE,
        );

        assert_eq!(slot.status(0), Status::Pending);
        assert!(slot.try_set_outcome(0, Ok(5)));

        assert_eq!(rx.try_recv().unwrap(), thread::current().id());
        assert_eq!(slot.get_result(0).unwrap(), 5);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn continuation_registered_after_completion_runs_elsewhere() {
        with_watchdog(|| {
            let slot = unpooled();
            let (tx, rx) = mpsc::channel();

            assert!(slot.try_set_outcome(0, Ok(5)));

            slot.register_continuation(
                0,
                |tx: mpsc::Sender<_>| tx.send(thread::current().id()).unwrap(),
                tx,
                ContinuationFlags::NONE,
            );

            assert_ne!(rx.recv().unwrap(), thread::current().id());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn asynchronous_slot_moves_continuation_off_completer() {
        with_watchdog(|| {
            let slot = Arc::new(SignalSlot::<u32>::new(Weak::new(), true));
            let (tx, rx) = mpsc::channel();

            slot.register_continuation(
                0,
                |tx: mpsc::Sender<_>| tx.send(thread::current().id()).unwrap(),
                tx,
                ContinuationFlags::NONE,
            );

            assert!(slot.try_set_outcome(0, Ok(5)));

            assert_ne!(rx.recv().unwrap(), thread::current().id());
            assert!(slot.runs_continuations_asynchronously());
        });
    }

    #[test]
    #[should_panic]
    fn second_registration_panics() {
        let slot = unpooled();

        slot.register_continuation(0, |()| {}, (), ContinuationFlags::NONE);
        slot.register_continuation(0, |()| {}, (), ContinuationFlags::NONE);
    }

    #[test]
    fn poll_registers_waker_and_completion_wakes_it() {
        let slot = unpooled();
        let counter = CountingWaker::new();
        let waker = counter.waker();

        assert!(slot.poll_result(0, &waker).is_pending());
        assert_eq!(counter.wake_count(), 0);

        assert!(slot.try_set_outcome(0, Ok(9)));
        assert_eq!(counter.wake_count(), 1);

        match slot.poll_result(0, &waker) {
            Poll::Ready(outcome) => assert_eq!(outcome.unwrap(), 9),
            Poll::Pending => panic!("completed slot must be ready"),
        }

        assert_eq!(slot.token(), 1);
    }

    #[test]
    fn repoll_replaces_waker() {
        let slot = unpooled();
        let first = CountingWaker::new();
        let second = CountingWaker::new();

        assert!(slot.poll_result(0, &first.waker()).is_pending());
        assert!(slot.poll_result(0, &second.waker()).is_pending());

        assert!(slot.try_set_outcome(0, Ok(1)));

        assert_eq!(first.wake_count(), 0);
        assert_eq!(second.wake_count(), 1);
    }

    #[test]
    fn repoll_with_same_waker_wakes_once() {
        let slot = unpooled();
        let counter = CountingWaker::new();
        let waker = counter.waker();

        assert!(slot.poll_result(0, &waker).is_pending());
        assert!(slot.poll_result(0, &waker).is_pending());

        assert!(slot.try_set_outcome(0, Ok(1)));

        assert_eq!(counter.wake_count(), 1);
    }

    #[test]
    #[should_panic]
    fn polling_after_explicit_registration_panics() {
        let slot = unpooled();
        let counter = CountingWaker::new();

        slot.register_continuation(0, |()| {}, (), ContinuationFlags::NONE);
        _ = slot.poll_result(0, &counter.waker());
    }

    #[test]
    fn last_generation_retires_slot() {
        let slot = Arc::new(SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN - 1, Weak::new()));

        assert!(slot.try_set_outcome(EXHAUSTED_TOKEN - 1, Ok(1)));
        assert_eq!(slot.get_result(EXHAUSTED_TOKEN - 1).unwrap(), 1);

        assert!(slot.is_exhausted());
    }

    #[test]
    fn retired_slot_rejects_completion() {
        let slot = Arc::new(SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN, Weak::new()));

        assert!(!slot.try_set_outcome(EXHAUSTED_TOKEN, Ok(1)));
        assert!(slot.is_exhausted());
    }

    #[test]
    #[should_panic]
    fn retired_slot_status_panics() {
        let slot = SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN, Weak::new());

        let _status = slot.status(EXHAUSTED_TOKEN);
    }

    #[test]
    #[should_panic]
    fn retired_slot_registration_panics() {
        let slot = SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN, Weak::new());

        slot.register_continuation(EXHAUSTED_TOKEN, |()| {}, (), ContinuationFlags::NONE);
    }

    #[test]
    #[should_panic]
    fn retired_slot_poll_panics() {
        let slot = Arc::new(SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN, Weak::new()));

        _ = slot.poll_result(EXHAUSTED_TOKEN, Waker::noop());
    }

    #[test]
    #[should_panic]
    fn retired_slot_result_panics() {
        let slot = Arc::new(SignalSlot::<u32>::with_token(EXHAUSTED_TOKEN, Weak::new()));

        _ = slot.get_result(EXHAUSTED_TOKEN);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn concurrent_completers_only_one_wins() {
        with_watchdog(|| {
            const COMPLETERS: usize = 8;

            let slot = unpooled();
            let barrier = Arc::new(Barrier::new(COMPLETERS));
            let winners = Arc::new(AtomicUsize::new(0));

            let handles = (0..COMPLETERS)
                .map(|index| {
                    let slot = Arc::clone(&slot);
                    let barrier = Arc::clone(&barrier);
                    let winners = Arc::clone(&winners);

                    thread::spawn(move || {
                        barrier.wait();

                        if slot.try_set_outcome(0, Ok(u32::try_from(index).unwrap())) {
                            winners.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect::<Vec<_>>();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(winners.load(Ordering::Relaxed), 1);
            assert_eq!(slot.status(0), Status::Succeeded);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn registration_racing_completion_runs_once() {
        with_watchdog(|| {
            for _ in 0..200 {
                let slot = unpooled();
                let barrier = Arc::new(Barrier::new(2));
                let (tx, rx) = mpsc::channel();

                let completer = thread::spawn({
                    let slot = Arc::clone(&slot);
                    let barrier = Arc::clone(&barrier);

                    move || {
                        barrier.wait();
                        assert!(slot.try_set_outcome(0, Ok(42)));
                    }
                });

                barrier.wait();
                slot.register_continuation(
                    0,
                    |tx: mpsc::Sender<()>| tx.send(()).unwrap(),
                    tx,
                    ContinuationFlags::NONE,
                );

                completer.join().unwrap();

                rx.recv().unwrap();
                assert!(rx.recv().is_err());
                assert_eq!(slot.get_result(0).unwrap(), 42);
            }
        });
    }
}
