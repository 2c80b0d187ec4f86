use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::{BoxedError, CancelCause, Error, Result, SignalSlot, SourcePool, ValueFuture};

/// The producer side of a single-assignment asynchronous operation.
///
/// A source completes its operation exactly once, with a value, an error or a cancellation.
/// The paired [`ValueFuture`] observes the outcome. Completion may happen on any thread and
/// clones of the source may race to complete it; exactly one of them wins.
///
/// A source is bound to one generation of its [`SignalSlot`]. After the consumer has taken the
/// outcome and the slot has moved on, every completion attempt through the source fails.
///
/// Dropping a source without completing it leaves the future pending forever.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use value_source::CompletionSource;
///
/// let (source, future) = CompletionSource::<u32>::create();
///
/// thread::spawn(move || {
///     source.set_result(42);
/// });
///
/// let value = futures::executor::block_on(future).unwrap();
/// assert_eq!(value, 42);
/// ```
pub struct CompletionSource<T>
where
    T: Send + 'static,
{
    slot: Arc<SignalSlot<T>>,
    token: u16,
}

impl<T> CompletionSource<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(slot: Arc<SignalSlot<T>>, token: u16) -> Self {
        Self { slot, token }
    }

    /// Creates a source and its future from the shared pool for `T`.
    ///
    /// Use [`SourcePool::create()`] to draw from a specific pool instead.
    #[must_use]
    pub fn create() -> (Self, ValueFuture<T>) {
        SourcePool::<T>::shared().create()
    }

    /// Creates a source and its future on a freshly allocated slot that belongs to no pool.
    ///
    /// The slot is released once both handles are gone.
    #[must_use]
    pub fn create_unpooled() -> (Self, ValueFuture<T>) {
        SignalSlot::bind(Arc::new(SignalSlot::new(Weak::new(), false)))
    }

    /// The generation token this source is bound to.
    #[must_use]
    pub fn token(&self) -> u16 {
        self.token
    }

    /// The slot this source completes.
    #[must_use]
    pub fn slot(&self) -> &Arc<SignalSlot<T>> {
        &self.slot
    }

    /// Whether the operation has been completed, by this source or any of its clones.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.slot.has_completed(self.token)
    }

    /// Completes the operation with a value.
    ///
    /// Returns `false` (dropping `value`) if the operation has already been completed.
    pub fn try_set_result(&self, value: T) -> bool {
        self.try_complete(Ok(value))
    }

    /// Completes the operation with an error.
    ///
    /// The consumer receives [`Error::Faulted`] wrapping exactly this error. Passing a
    /// [`Canceled`][crate::Canceled] cancels the operation instead, same as
    /// [`try_set_canceled()`][Self::try_set_canceled].
    ///
    /// Returns `false` if the operation has already been completed.
    pub fn try_set_error(&self, error: impl Into<BoxedError>) -> bool {
        self.try_complete(Err(Error::faulted(error)))
    }

    /// Cancels the operation, optionally identifying what caused the cancellation.
    ///
    /// Returns `false` if the operation has already been completed.
    pub fn try_set_canceled(&self, cause: Option<CancelCause>) -> bool {
        self.try_complete(Err(Error::canceled(cause)))
    }

    /// Completes the operation with a ready-made outcome.
    ///
    /// Returns `false` if the operation has already been completed.
    pub fn try_complete(&self, outcome: Result<T>) -> bool {
        self.slot.try_set_outcome(self.token, outcome)
    }

    /// Completes the operation with a value.
    ///
    /// # Panics
    ///
    /// Panics if the operation has already been completed.
    pub fn set_result(&self, value: T) {
        assert!(
            self.try_set_result(value),
            "completion source has already been completed"
        );
    }

    /// Completes the operation with an error.
    ///
    /// # Panics
    ///
    /// Panics if the operation has already been completed.
    pub fn set_error(&self, error: impl Into<BoxedError>) {
        assert!(
            self.try_set_error(error),
            "completion source has already been completed"
        );
    }

    /// Cancels the operation.
    ///
    /// # Panics
    ///
    /// Panics if the operation has already been completed.
    pub fn set_canceled(&self, cause: Option<CancelCause>) {
        assert!(
            self.try_set_canceled(cause),
            "completion source has already been completed"
        );
    }

    /// Completes the operation with a ready-made outcome.
    ///
    /// # Panics
    ///
    /// Panics if the operation has already been completed.
    pub fn complete(&self, outcome: Result<T>) {
        assert!(
            self.try_complete(outcome),
            "completion source has already been completed"
        );
    }
}

impl<T> Clone for CompletionSource<T>
where
    T: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            token: self.token,
        }
    }
}

impl<T> PartialEq for CompletionSource<T>
where
    T: Send + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot) && self.token == other.token
    }
}

impl<T> Eq for CompletionSource<T> where T: Send + 'static {}

impl<T> Hash for CompletionSource<T>
where
    T: Send + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.slot).hash(state);
        self.token.hash(state);
    }
}

impl<T> fmt::Debug for CompletionSource<T>
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
