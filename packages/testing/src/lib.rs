#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and benchmarking the `value_source` package.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::task::{Wake, Waker};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

/// Runs a test with a timeout to prevent infinite hangs.
///
/// Completion sources are synchronization primitives, so a broken state transition usually
/// shows up as a consumer that waits forever. This wraps the test closure in a watchdog so such
/// a failure turns into a panic instead of a stuck CI job.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where thread
/// synchronization is significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so mutation testing can detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode) and re-raises any
/// panic from the test closure.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 40 + 2);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the watchdog has already given up on us.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {timeout:?} timeout - a consumer is probably never woken up");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// A waker that counts how many times it has been woken.
///
/// Useful for asserting exactly-once wake-up delivery without involving an executor.
///
/// # Example
///
/// ```rust
/// use testing::CountingWaker;
///
/// let counter = CountingWaker::new();
/// let waker = counter.waker();
///
/// waker.wake_by_ref();
/// waker.wake();
///
/// assert_eq!(counter.wake_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct CountingWaker {
    inner: Arc<WakeCounter>,
}

#[derive(Debug, Default)]
struct WakeCounter {
    wakes: AtomicUsize,
}

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingWaker {
    /// Creates a counter with no wake-ups recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a [`Waker`] that increments this counter when woken.
    #[must_use]
    pub fn waker(&self) -> Waker {
        Waker::from(Arc::clone(&self.inner))
    }

    /// Number of times any waker from this counter has been woken.
    #[must_use]
    pub fn wake_count(&self) -> usize {
        self.inner.wakes.load(Ordering::SeqCst)
    }
}

/// A boxed unit of work, as posted to a scheduling context.
pub type QueuedWork = Box<dyn FnOnce() + Send + 'static>;

/// A manually pumped queue of work items.
///
/// Tests plug this behind scheduling-context traits to observe that work was posted somewhere
/// instead of being executed inline, and then run it at a moment of their choosing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use testing::WorkQueue;
///
/// let queue = WorkQueue::new();
/// let ran = Arc::new(AtomicBool::new(false));
///
/// let ran_clone = Arc::clone(&ran);
/// queue.push(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));
///
/// assert_eq!(queue.len(), 1);
/// assert!(!ran.load(Ordering::SeqCst));
///
/// assert_eq!(queue.run_all(), 1);
/// assert!(ran.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<QueuedWork>>,
    pushed: AtomicUsize,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("pushed", &self.pushed_count())
            .finish()
    }
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a work item without running it.
    pub fn push(&self, work: QueuedWork) {
        self.items.lock().push_back(work);
        self.pushed.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of work items waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no work items are waiting to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Total number of work items ever pushed into this queue.
    #[must_use]
    pub fn pushed_count(&self) -> usize {
        self.pushed.load(Ordering::SeqCst)
    }

    /// Runs queued work items on the current thread until the queue is empty, including any
    /// items enqueued by the work itself. Returns how many items were executed.
    pub fn run_all(&self) -> usize {
        let mut executed = 0_usize;

        loop {
            // The lock must be released before running the item so work may post more work.
            let next = self.items.lock().pop_front();

            let Some(work) = next else {
                break;
            };

            work();
            executed = executed.saturating_add(1);
        }

        executed
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn watchdog_returns_correct_value() {
        let result = with_watchdog(|| "hello world");
        assert_eq!(result, "hello world");
    }

    #[test]
    #[should_panic]
    fn watchdog_propagates_panic() {
        let _value: u32 = with_watchdog(|| panic!("intentional"));
    }

    #[test]
    fn counting_waker_counts_all_clones() {
        let counter = CountingWaker::new();
        let waker = counter.waker();
        let clone = waker.clone();

        waker.wake();
        clone.wake_by_ref();

        assert_eq!(counter.wake_count(), 2);
    }

    #[test]
    fn work_queue_runs_nested_work() {
        let queue = Arc::new(WorkQueue::new());
        let ran_nested = Arc::new(AtomicBool::new(false));

        let queue_clone = Arc::clone(&queue);
        let ran_nested_clone = Arc::clone(&ran_nested);
        queue.push(Box::new(move || {
            queue_clone.push(Box::new(move || ran_nested_clone.store(true, Ordering::SeqCst)));
        }));

        assert_eq!(queue.run_all(), 2);
        assert!(ran_nested.load(Ordering::SeqCst));
        assert!(queue.is_empty());
        assert_eq!(queue.pushed_count(), 2);
    }
}
