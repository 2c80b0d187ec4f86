use crate::state::{PHASE_CANCELED, PHASE_FAULTED, PHASE_SUCCEEDED};
use crate::{Error, Result};

/// The observable status of the operation behind a [`ValueFuture`][crate::ValueFuture].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Status {
    /// The producer has not completed the operation yet.
    Pending,

    /// The operation completed with a value.
    Succeeded,

    /// The operation completed with an error reported by the producer.
    Faulted,

    /// The operation was canceled.
    Canceled,
}

impl Status {
    /// Whether the operation has completed, in any way.
    #[must_use]
    pub fn is_completed(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub(crate) fn of_outcome<T>(outcome: &Result<T>) -> Self {
        match outcome {
            Ok(_) => Self::Succeeded,
            Err(Error::Canceled(_)) => Self::Canceled,
            Err(Error::Faulted(_)) => Self::Faulted,
        }
    }

    pub(crate) fn completed_phase(self) -> u32 {
        match self {
            Self::Succeeded => PHASE_SUCCEEDED,
            Self::Faulted => PHASE_FAULTED,
            Self::Canceled => PHASE_CANCELED,
            Self::Pending => unreachable!("a pending status has no completed phase"),
        }
    }
}
