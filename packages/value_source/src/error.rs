use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use thiserror::Error;

/// An arbitrary error reported by the producer of a value.
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// The ways an operation behind a completion source can end without a value.
///
/// A producer either reports a failure of its own ([`Error::Faulted`]) or cancels the operation
/// ([`Error::Canceled`]). The consumer receives exactly the error the producer supplied.
///
/// # Example
///
/// ```rust
/// use std::io;
///
/// use value_source::{CompletionSource, Error};
///
/// let (source, future) = CompletionSource::<u32>::create_unpooled();
/// source.set_error(io::Error::other("disk on fire"));
///
/// let error = future.get_result().unwrap_err();
/// assert!(error.is_faulted());
/// assert_eq!(
///     error.downcast_ref::<io::Error>().unwrap().kind(),
///     io::ErrorKind::Other
/// );
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The producer reported a failure. The original error is carried verbatim.
    #[error(transparent)]
    Faulted(BoxedError),

    /// The producer canceled the operation.
    #[error(transparent)]
    Canceled(#[from] Canceled),
}

impl Error {
    /// Wraps a producer-side error.
    ///
    /// A [`Canceled`] error is a cancellation no matter which way it is reported, so it becomes
    /// [`Error::Canceled`] instead.
    #[must_use]
    pub fn faulted(error: impl Into<BoxedError>) -> Self {
        Self::Faulted(error.into()).normalized()
    }

    /// Unwraps a [`Canceled`] that was boxed as a producer failure.
    pub(crate) fn normalized(self) -> Self {
        match self {
            Self::Faulted(error) => match error.downcast::<Canceled>() {
                Ok(canceled) => Self::Canceled(*canceled),
                Err(error) => Self::Faulted(error),
            },
            canceled @ Self::Canceled(_) => canceled,
        }
    }

    /// Creates a cancellation error, optionally carrying the cause.
    #[must_use]
    pub fn canceled(cause: Option<CancelCause>) -> Self {
        Self::Canceled(Canceled::new(cause))
    }

    /// Whether this is a cancellation rather than an ordinary failure.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Whether this is a failure reported by the producer.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    /// Returns the cancellation details if this is a cancellation.
    #[must_use]
    pub fn as_canceled(&self) -> Option<&Canceled> {
        match self {
            Self::Canceled(canceled) => Some(canceled),
            Self::Faulted(_) => None,
        }
    }

    /// Attempts to view the producer-reported error as a concrete type.
    ///
    /// Returns [`None`] for cancellations or if the error is of a different type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Faulted(error) => error.downcast_ref::<E>(),
            Self::Canceled(_) => None,
        }
    }
}

/// Identifies why an operation was canceled.
///
/// Producers that cancel in response to some external signal can attach a cause so that
/// consumers can tell which signal it was.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CancelCause {
    reason: Arc<str>,
}

impl CancelCause {
    /// Creates a cause with a human-readable reason.
    #[must_use]
    pub fn new(reason: impl Into<Arc<str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given when the cause was created.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for CancelCause {
    #[cfg_attr(test, mutants::skip)] // No API contract for the message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Indicates that the operation behind a completion source was canceled.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Canceled {
    cause: Option<CancelCause>,
}

impl Canceled {
    /// Creates a cancellation, optionally carrying the cause.
    #[must_use]
    pub fn new(cause: Option<CancelCause>) -> Self {
        Self { cause }
    }

    /// The cause attached by the producer, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&CancelCause> {
        self.cause.as_ref()
    }
}

impl StdError for Canceled {}

impl Display for Canceled {
    #[cfg_attr(test, mutants::skip)] // No API contract for the message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "the operation was canceled: {cause}"),
            None => write!(f, "the operation was canceled"),
        }
    }
}

/// A specialized `Result` type for completion outcomes, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;
    use std::io;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);
    assert_impl_all!(Canceled: Send, Sync, Clone);
    assert_impl_all!(CancelCause: Send, Sync, Clone);

    #[test]
    fn faulted_preserves_original_type() {
        let error = Error::faulted(io::Error::new(io::ErrorKind::TimedOut, "slow"));

        assert!(error.is_faulted());
        assert!(!error.is_canceled());
        assert!(error.as_canceled().is_none());

        let original = error.downcast_ref::<io::Error>().unwrap();
        assert_eq!(original.kind(), io::ErrorKind::TimedOut);
        assert_eq!(error.to_string(), "slow");
    }

    #[test]
    fn canceled_exposes_cause() {
        let error = Error::canceled(Some(CancelCause::new("shutdown")));

        assert!(error.is_canceled());
        assert!(error.downcast_ref::<io::Error>().is_none());

        let canceled = error.as_canceled().unwrap();
        assert_eq!(canceled.cause().unwrap().reason(), "shutdown");
    }

    #[test]
    fn canceled_without_cause() {
        let error = Error::canceled(None);

        assert!(error.as_canceled().unwrap().cause().is_none());
    }

    #[test]
    fn faulted_with_canceled_is_cancellation() {
        let error = Error::faulted(Canceled::new(Some(CancelCause::new("deadline"))));

        assert!(error.is_canceled());
        assert!(!error.is_faulted());
        assert_eq!(
            error.as_canceled().unwrap().cause().unwrap().reason(),
            "deadline"
        );
    }

    #[test]
    fn boxed_canceled_is_normalized() {
        let error = Error::Faulted(Box::new(Canceled::default())).normalized();

        assert!(error.is_canceled());

        let error = Error::Faulted("broken".into()).normalized();

        assert!(error.is_faulted());
    }

    #[test]
    fn canceled_converts_into_error() {
        let error: Error = Canceled::default().into();

        assert!(error.is_canceled());
    }
}
