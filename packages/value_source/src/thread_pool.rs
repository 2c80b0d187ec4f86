//! Worker threads that run continuations forced off the completing thread.

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::{TaskScheduler, Work};

const DEFAULT_THREAD_NAME_PREFIX: &str = "value-source-worker";

static SHARED: LazyLock<ThreadPool> = LazyLock::new(ThreadPool::new);

/// A pool of worker threads that runs fire-and-forget work items.
///
/// This is where continuations go when they must not run on the thread that completed a
/// source and no scheduling context was captured for them. Workers are started lazily on the
/// first submitted work item.
///
/// # Shutdown behavior
///
/// When the pool is dropped, it disconnects the work channel and waits for the workers to exit.
/// Workers drain the channel before exiting, so every work item accepted by [`execute()`][1]
/// runs.
///
/// # Panics
///
/// A panic inside a work item is caught and logged via `tracing::error!`; it does not take the
/// worker down.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
///
/// use value_source::ThreadPool;
///
/// let pool = ThreadPool::builder().worker_count(2).build();
/// let (tx, rx) = mpsc::channel();
///
/// pool.execute(move || tx.send(42).unwrap());
///
/// assert_eq!(rx.recv().unwrap(), 42);
/// ```
///
/// [1]: Self::execute
pub struct ThreadPool {
    /// Taken when the pool is dropped, which disconnects the workers once the channel is empty.
    sender: Option<Sender<Work>>,
    receiver: Receiver<Work>,

    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    workers_spawned: AtomicBool,
    worker_count: NonZero<usize>,
    thread_name_prefix: Cow<'static, str>,
}

impl fmt::Debug for ThreadPool {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("worker_count", &self.worker_count)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("queued", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Creates a pool with one worker per available processor.
    ///
    /// Use [`ThreadPool::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a pool.
    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// The process-wide pool used for forced-asynchronous continuation dispatch.
    #[must_use]
    pub fn shared() -> &'static Self {
        &SHARED
    }

    /// Number of worker threads this pool runs once started.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.worker_count
    }

    /// Queues a work item for execution on one of the worker threads.
    pub fn execute<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(work));
    }

    fn submit(&self, work: Work) {
        self.ensure_workers_spawned();

        let Some(sender) = &self.sender else {
            unreachable!("the sender is only taken when the pool is dropped");
        };

        if sender.send(work).is_err() {
            unreachable!("the pool holds a receiver, so the work channel is never disconnected");
        }

        trace!(pool = %self.thread_name_prefix, "queued work item");
    }

    fn ensure_workers_spawned(&self) {
        // Acquire on failure to synchronize with the Release on successful exchange.
        let already_spawned = self
            .workers_spawned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err();

        if already_spawned {
            return;
        }

        let mut new_handles = Vec::with_capacity(self.worker_count.get());

        for worker_index in 0..self.worker_count.get() {
            let receiver = self.receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{worker_index}", self.thread_name_prefix))
                .spawn(move || {
                    debug!(worker_index, "worker thread started");
                    worker_loop(&receiver);
                    debug!(worker_index, "worker thread exiting");
                })
                .expect("failed to spawn worker thread: thread spawning failure is not supported");

            new_handles.push(handle);
        }

        self.worker_handles.lock().extend(new_handles);
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers finish what is already queued, then see the disconnect and exit.
        drop(self.sender.take());

        let handles = mem::take(&mut *self.worker_handles.lock());

        for handle in handles {
            if let Err(payload) = handle.join() {
                // Work items run inside a panic trap, so a panicking worker means the pool
                // itself is broken. We do not hide that.
                panic::resume_unwind(payload);
            }
        }
    }
}

impl TaskScheduler for ThreadPool {
    fn schedule(&self, work: Work) {
        self.submit(work);
    }
}

fn worker_loop(receiver: &Receiver<Work>) {
    while let Ok(work) = receiver.recv() {
        run_work(work);
    }
}

fn run_work(work: Work) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        let message = format_panic_payload(&payload);
        error!(panic_message = %message, "work item panicked on thread pool worker");
    }
}

/// Formats a panic payload for logging.
fn format_panic_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Configures and creates a [`ThreadPool`].
#[derive(Debug)]
pub struct ThreadPoolBuilder {
    worker_count: Option<NonZero<usize>>,
    thread_name_prefix: Cow<'static, str>,
}

impl ThreadPoolBuilder {
    fn new() -> Self {
        Self {
            worker_count: None,
            thread_name_prefix: Cow::Borrowed(DEFAULT_THREAD_NAME_PREFIX),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Defaults to the available parallelism of the process.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count =
            Some(NonZero::new(count).expect("a thread pool needs at least one worker thread"));
        self
    }

    /// Sets the prefix of the worker thread names; workers are named `{prefix}-{index}`.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Creates the pool. No threads are started until work is submitted.
    #[must_use]
    pub fn build(self) -> ThreadPool {
        let worker_count = self.worker_count.unwrap_or_else(|| {
            thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN)
        });

        let (sender, receiver) = channel::unbounded();

        ThreadPool {
            sender: Some(sender),
            receiver,
            worker_handles: Mutex::new(Vec::new()),
            workers_spawned: AtomicBool::new(false),
            worker_count,
            thread_name_prefix: self.thread_name_prefix,
        }
    }
}
