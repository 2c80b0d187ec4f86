use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::{ContinuationFlags, Result, SignalSlot, Status};

/// The consumer side of a single-assignment asynchronous operation.
///
/// The future resolves to the outcome that the paired [`CompletionSource`][crate::CompletionSource]
/// completed the operation with. Taking the outcome (by awaiting the future or calling
/// [`get_result()`][1]) ends the generation, after which the underlying slot is recycled.
///
/// Besides being awaited, the future can be observed without an executor: poll
/// [`status()`][2] or [register a callback][3] to be told about completion.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
///
/// use value_source::{CompletionSource, ContinuationFlags, Status};
///
/// let (source, future) = CompletionSource::<&str>::create();
/// let (tx, rx) = mpsc::channel();
///
/// future.register_continuation(
///     |tx: mpsc::Sender<()>| tx.send(()).unwrap(),
///     tx,
///     ContinuationFlags::NONE,
/// );
///
/// source.set_result("ready");
///
/// rx.recv().unwrap();
/// assert_eq!(future.status(), Status::Succeeded);
/// assert_eq!(future.get_result().unwrap(), "ready");
/// ```
///
/// [1]: Self::get_result
/// [2]: Self::status
/// [3]: Self::register_continuation
pub struct ValueFuture<T>
where
    T: Send + 'static,
{
    slot: Arc<SignalSlot<T>>,
    token: u16,
}

impl<T> ValueFuture<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(slot: Arc<SignalSlot<T>>, token: u16) -> Self {
        Self { slot, token }
    }

    /// The generation token this future is bound to.
    #[must_use]
    pub fn token(&self) -> u16 {
        self.token
    }

    /// The slot this future observes.
    #[must_use]
    pub fn slot(&self) -> &Arc<SignalSlot<T>> {
        &self.slot
    }

    /// The current status of the operation.
    ///
    /// # Panics
    ///
    /// Panics if the future has already been polled to completion.
    #[must_use]
    pub fn status(&self) -> Status {
        self.slot.status(self.token)
    }

    /// Whether the operation has completed, in any way.
    ///
    /// # Panics
    ///
    /// Panics if the future has already been polled to completion.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status().is_completed()
    }

    /// Registers `callback` to be called with `state` once the operation completes.
    ///
    /// `flags` decides which context the callback runs in; see [`ContinuationFlags`].
    /// Without a captured context, a callback registered before completion runs inline on the
    /// thread that completes the operation. A callback registered after completion never runs
    /// inline within this call; it is handed to a worker thread instead.
    ///
    /// # Panics
    ///
    /// Panics if a callback is already registered, if the future is being awaited or if the
    /// future has already been polled to completion.
    pub fn register_continuation<F, S>(&self, callback: F, state: S, flags: ContinuationFlags)
    where
        F: FnOnce(S) + Send + 'static,
        S: Send + 'static,
    {
        self.slot
            .register_continuation(self.token, callback, state, flags);
    }

    /// Takes the outcome of the completed operation.
    ///
    /// # Panics
    ///
    /// Panics if the operation has not completed yet. Waiting is not supported; await the future
    /// or register a continuation to find out when the outcome is available.
    pub fn get_result(self) -> Result<T> {
        self.slot.get_result(self.token)
    }
}

impl<T> Future for ValueFuture<T>
where
    T: Send + 'static,
{
    type Output = Result<T>;

    // Once this has returned `Ready`, the token is stale and any further poll panics.
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause timeouts and hailstorms.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.slot.poll_result(self.token, cx.waker())
    }
}

impl<T> PartialEq for ValueFuture<T>
where
    T: Send + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot) && self.token == other.token
    }
}

impl<T> Eq for ValueFuture<T> where T: Send + 'static {}

impl<T> Hash for ValueFuture<T>
where
    T: Send + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.slot).hash(state);
        self.token.hash(state);
    }
}

impl<T> fmt::Debug for ValueFuture<T>
where
    T: Send + 'static,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("slot", &self.slot)
            .field("token", &self.token)
            .finish()
    }
}
