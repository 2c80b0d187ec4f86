//! Continuation capture and delivery.
//!
//! The dispatcher decides where a continuation runs once the outcome of its source is known:
//!
//! | captured context        | forced async | behavior                                  |
//! |-------------------------|--------------|-------------------------------------------|
//! | none                    | no           | invoked inline on the completing thread   |
//! | none                    | yes          | queued on the shared [`ThreadPool`]       |
//! | synchronization context | either       | posted to that context                    |
//! | task scheduler          | either       | scheduled, detached, on that scheduler    |
//!
//! If an execution context (a `tracing` span) was captured, the work item re-enters it before
//! invoking the callback, wherever the table above sends it.
//!
//! Wakers are the exception: they are always woken inline. Waking only marks a task as ready
//! and the executor that owns the task decides where it resumes.

use std::fmt;
use std::ops::BitOr;
use std::task::Waker;

use tracing::{Span, trace};

use crate::context::SchedulingContext;
use crate::{TaskScheduler, ThreadPool, Work};

/// Controls what a continuation captures from the registering thread.
///
/// Flags combine with `|`.
///
/// # Example
///
/// ```rust
/// use value_source::ContinuationFlags;
///
/// let flags =
///     ContinuationFlags::FLOW_EXECUTION_CONTEXT | ContinuationFlags::USE_SCHEDULING_CONTEXT;
///
/// assert!(flags.contains(ContinuationFlags::FLOW_EXECUTION_CONTEXT));
/// assert!(flags.contains(ContinuationFlags::USE_SCHEDULING_CONTEXT));
/// assert!(!ContinuationFlags::NONE.contains(ContinuationFlags::USE_SCHEDULING_CONTEXT));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ContinuationFlags {
    bits: u8,
}

impl ContinuationFlags {
    /// Capture nothing; the continuation runs wherever the dispatcher decides.
    pub const NONE: Self = Self { bits: 0 };

    /// Capture the current `tracing` span and re-enter it when the continuation runs.
    pub const FLOW_EXECUTION_CONTEXT: Self = Self { bits: 0b01 };

    /// Capture the current synchronization context (or, if there is none, the current task
    /// scheduler) and deliver the continuation through it.
    pub const USE_SCHEDULING_CONTEXT: Self = Self { bits: 0b10 };

    /// Whether all flags in `other` are also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl BitOr for ContinuationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

enum Callback {
    Waker(Waker),
    Function(Work),
}

/// A registered continuation together with whatever it captured at registration time.
pub(crate) struct Continuation {
    callback: Callback,
    scheduling_context: Option<SchedulingContext>,
    execution_context: Option<Span>,
}

impl Continuation {
    pub(crate) fn from_waker(waker: Waker) -> Self {
        Self {
            callback: Callback::Waker(waker),
            scheduling_context: None,
            execution_context: None,
        }
    }

    /// Captures the contexts requested by `flags` from the current thread.
    pub(crate) fn capture(work: Work, flags: ContinuationFlags) -> Self {
        let execution_context = flags
            .contains(ContinuationFlags::FLOW_EXECUTION_CONTEXT)
            .then(Span::current);

        let scheduling_context = if flags.contains(ContinuationFlags::USE_SCHEDULING_CONTEXT) {
            SchedulingContext::capture()
        } else {
            None
        };

        Self {
            callback: Callback::Function(work),
            scheduling_context,
            execution_context,
        }
    }

    /// Whether this continuation is a waker that would wake the same task as `waker`.
    pub(crate) fn will_wake(&self, waker: &Waker) -> bool {
        match &self.callback {
            Callback::Waker(existing) => existing.will_wake(waker),
            Callback::Function(_) => false,
        }
    }

    pub(crate) fn is_waker(&self) -> bool {
        matches!(self.callback, Callback::Waker(_))
    }
}

impl fmt::Debug for Continuation {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callback = match self.callback {
            Callback::Waker(_) => "waker",
            Callback::Function(_) => "function",
        };

        f.debug_struct("Continuation")
            .field("callback", &callback)
            .field("scheduling_context", &self.scheduling_context)
            .field("execution_context", &self.execution_context)
            .finish()
    }
}

/// Delivers a continuation according to the dispatch table.
///
/// `forced_async` is set when the continuation must not run on the current thread, either
/// because it was registered after completion (so the registering call would otherwise invoke
/// it reentrantly) or because the source demands asynchronous continuations.
///
/// Panics from inline continuations and from scheduling contexts propagate to the caller.
#[cfg_attr(test, mutants::skip)] // Critical for code execution to occur in async contexts.
pub(crate) fn dispatch(continuation: Continuation, forced_async: bool) {
    let Continuation {
        callback,
        scheduling_context,
        execution_context,
    } = continuation;

    let work = match callback {
        Callback::Waker(waker) => {
            trace!("waking awaiting task");
            waker.wake();
            return;
        }
        Callback::Function(work) => work,
    };

    let work: Work = match execution_context {
        Some(span) => Box::new(move || span.in_scope(work)),
        None => work,
    };

    match scheduling_context {
        Some(context) => {
            trace!(context = ?context, "delivering continuation via captured context");
            context.submit(work);
        }
        None if forced_async => {
            trace!("delivering continuation via shared thread pool");
            ThreadPool::shared().schedule(work);
        }
        None => {
            trace!("invoking continuation inline");
            work();
        }
    }
}
