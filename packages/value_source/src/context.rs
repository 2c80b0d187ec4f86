//! Scheduling contexts that continuations can be captured into.
//!
//! A thread may designate a [`SynchronizationContext`] (e.g. "the UI thread", "this actor's
//! mailbox") and/or a [`TaskScheduler`] as current. Continuations registered with
//! [`ContinuationFlags::USE_SCHEDULING_CONTEXT`][crate::ContinuationFlags::USE_SCHEDULING_CONTEXT]
//! capture whichever is current at registration time and are later delivered through it instead
//! of running on the completing thread.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A unit of work handed to a scheduling context.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// A target that accepts work to be run "in its context", typically on a specific thread.
///
/// Implementations must not run the work inline inside `post()` if that could re-enter the
/// caller; posting is expected to be asynchronous.
pub trait SynchronizationContext: Send + Sync + 'static {
    /// Queues the work for execution within this context.
    fn post(&self, work: Work);
}

/// A scheduler that runs detached work items.
///
/// Work scheduled here has no parent-child relationship with whatever scheduled it.
pub trait TaskScheduler: Send + Sync + 'static {
    /// Schedules the work for execution.
    fn schedule(&self, work: Work);
}

thread_local! {
    static CURRENT_SYNCHRONIZATION_CONTEXT: RefCell<Option<Arc<dyn SynchronizationContext>>> =
        const { RefCell::new(None) };

    static CURRENT_TASK_SCHEDULER: RefCell<Option<Arc<dyn TaskScheduler>>> =
        const { RefCell::new(None) };
}

/// Makes `context` the current synchronization context of this thread until the returned guard
/// is dropped, at which point the previous one (if any) is restored.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use value_source::{
///     SynchronizationContext, Work, current_synchronization_context, enter_synchronization_context,
/// };
///
/// struct Inline;
///
/// impl SynchronizationContext for Inline {
///     fn post(&self, work: Work) {
///         work();
///     }
/// }
///
/// assert!(current_synchronization_context().is_none());
///
/// {
///     let _guard = enter_synchronization_context(Arc::new(Inline));
///     assert!(current_synchronization_context().is_some());
/// }
///
/// assert!(current_synchronization_context().is_none());
/// ```
#[must_use = "the context is only current until the guard is dropped"]
pub fn enter_synchronization_context(context: Arc<dyn SynchronizationContext>) -> ContextGuard {
    let previous =
        CURRENT_SYNCHRONIZATION_CONTEXT.with_borrow_mut(|current| current.replace(context));

    ContextGuard {
        previous: Previous::SynchronizationContext(previous),
        _single_threaded: PhantomData,
    }
}

/// Makes `scheduler` the current task scheduler of this thread until the returned guard is
/// dropped, at which point the previous one (if any) is restored.
#[must_use = "the scheduler is only current until the guard is dropped"]
pub fn enter_task_scheduler(scheduler: Arc<dyn TaskScheduler>) -> ContextGuard {
    let previous = CURRENT_TASK_SCHEDULER.with_borrow_mut(|current| current.replace(scheduler));

    ContextGuard {
        previous: Previous::TaskScheduler(previous),
        _single_threaded: PhantomData,
    }
}

/// The synchronization context that is current on this thread, if any.
#[must_use]
pub fn current_synchronization_context() -> Option<Arc<dyn SynchronizationContext>> {
    CURRENT_SYNCHRONIZATION_CONTEXT.with_borrow(Clone::clone)
}

/// The task scheduler that is current on this thread, if any.
///
/// The shared [`ThreadPool`][crate::ThreadPool] is the implicit default and is never reported
/// here unless explicitly entered.
#[must_use]
pub fn current_task_scheduler() -> Option<Arc<dyn TaskScheduler>> {
    CURRENT_TASK_SCHEDULER.with_borrow(Clone::clone)
}

enum Previous {
    SynchronizationContext(Option<Arc<dyn SynchronizationContext>>),
    TaskScheduler(Option<Arc<dyn TaskScheduler>>),
}

/// Restores the previously current scheduling context when dropped.
///
/// Guards must be dropped in reverse order of creation and on the thread that created them.
pub struct ContextGuard {
    previous: Previous,

    // The guard manipulates thread-local state, so it must stay on its thread.
    _single_threaded: PhantomData<*const ()>,
}

impl fmt::Debug for ContextGuard {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.previous {
            Previous::SynchronizationContext(_) => "synchronization context",
            Previous::TaskScheduler(_) => "task scheduler",
        };

        f.debug_struct(type_name::<Self>())
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        match &mut self.previous {
            Previous::SynchronizationContext(previous) => {
                let previous = previous.take();
                CURRENT_SYNCHRONIZATION_CONTEXT.with_borrow_mut(|current| *current = previous);
            }
            Previous::TaskScheduler(previous) => {
                let previous = previous.take();
                CURRENT_TASK_SCHEDULER.with_borrow_mut(|current| *current = previous);
            }
        }
    }
}

/// A scheduling context captured from the registering thread.
#[derive(Clone)]
pub(crate) enum SchedulingContext {
    Synchronization(Arc<dyn SynchronizationContext>),
    Scheduler(Arc<dyn TaskScheduler>),
}

impl SchedulingContext {
    /// Captures the current synchronization context or, failing that, the current task
    /// scheduler.
    pub(crate) fn capture() -> Option<Self> {
        current_synchronization_context()
            .map(Self::Synchronization)
            .or_else(|| current_task_scheduler().map(Self::Scheduler))
    }

    pub(crate) fn submit(&self, work: Work) {
        match self {
            Self::Synchronization(context) => context.post(work),
            Self::Scheduler(scheduler) => scheduler.schedule(work),
        }
    }
}

impl fmt::Debug for SchedulingContext {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronization(_) => f.write_str("SynchronizationContext"),
            Self::Scheduler(_) => f.write_str("TaskScheduler"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;
    use testing::WorkQueue;

    use super::*;

    assert_not_impl_any!(ContextGuard: Send, Sync);

    struct QueueContext(Arc<WorkQueue>);

    impl SynchronizationContext for QueueContext {
        fn post(&self, work: Work) {
            self.0.push(work);
        }
    }

    impl TaskScheduler for QueueContext {
        fn schedule(&self, work: Work) {
            self.0.push(work);
        }
    }

    #[test]
    fn nothing_is_captured_by_default() {
        assert!(SchedulingContext::capture().is_none());
    }

    #[test]
    fn guards_restore_previous_context() {
        let outer = Arc::new(QueueContext(Arc::new(WorkQueue::new())));
        let inner = Arc::new(QueueContext(Arc::new(WorkQueue::new())));

        let outer_guard = enter_synchronization_context(outer);
        {
            let _inner_guard = enter_synchronization_context(inner);
            assert!(current_synchronization_context().is_some());
        }

        // The outer context is current again.
        assert!(current_synchronization_context().is_some());

        drop(outer_guard);
        assert!(current_synchronization_context().is_none());
    }

    #[test]
    fn synchronization_context_is_preferred_over_scheduler() {
        let sync_queue = Arc::new(WorkQueue::new());
        let scheduler_queue = Arc::new(WorkQueue::new());

        let _scheduler_guard =
            enter_task_scheduler(Arc::new(QueueContext(Arc::clone(&scheduler_queue))));
        let _sync_guard =
            enter_synchronization_context(Arc::new(QueueContext(Arc::clone(&sync_queue))));

        let captured = SchedulingContext::capture().unwrap();
        assert!(matches!(captured, SchedulingContext::Synchronization(_)));

        captured.submit(Box::new(|| {}));

        assert_eq!(sync_queue.len(), 1);
        assert_eq!(scheduler_queue.len(), 0);
    }

    #[test]
    fn scheduler_is_captured_without_synchronization_context() {
        let queue = Arc::new(WorkQueue::new());
        let _guard = enter_task_scheduler(Arc::new(QueueContext(Arc::clone(&queue))));

        let captured = SchedulingContext::capture().unwrap();
        assert!(matches!(captured, SchedulingContext::Scheduler(_)));

        captured.submit(Box::new(|| {}));
        assert_eq!(queue.run_all(), 1);
    }
}
