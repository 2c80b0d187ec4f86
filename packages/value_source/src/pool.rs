use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::marker::PhantomData;
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{CompletionSource, SignalSlot, ValueFuture};

type SharedPools = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// One shared pool per outcome type, created on first use.
static SHARED_POOLS: LazyLock<RwLock<SharedPools>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// A bounded pool of [`SignalSlot`]s from which completion sources are created.
///
/// Once the consumer of a source has taken the outcome, the slot returns here and serves the
/// next [`create()`][1] call under a new generation token. A program that keeps completing and
/// consuming sources one at a time therefore allocates a single slot.
///
/// The pool holds at most [`capacity()`][2] idle slots. Slots returned to a full pool are
/// dropped. Slots whose tokens are exhausted are never accepted.
///
/// The pool is lock-free. Cloning the pool creates another handle to the same slots.
///
/// # Example
///
/// ```rust
/// use value_source::SourcePool;
///
/// let pool = SourcePool::<String>::builder().capacity(4).build();
///
/// for _ in 0..10 {
///     let (source, future) = pool.create();
///     source.set_result("hello".to_string());
///     assert_eq!(future.get_result().unwrap(), "hello");
/// }
///
/// assert_eq!(pool.slots_created(), 1);
/// ```
///
/// [1]: Self::create
/// [2]: Self::capacity
pub struct SourcePool<T>
where
    T: Send + 'static,
{
    core: Arc<PoolCore<T>>,
}

impl<T> SourcePool<T>
where
    T: Send + 'static,
{
    /// Creates a pool with the default configuration.
    ///
    /// Use [`SourcePool::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a pool.
    pub fn builder() -> SourcePoolBuilder<T> {
        SourcePoolBuilder::new()
    }

    /// The process-wide default pool for `T`, used by [`CompletionSource::create()`].
    #[must_use]
    pub fn shared() -> Self {
        let type_id = TypeId::of::<T>();

        if let Some(pool) = SHARED_POOLS
            .read()
            .get(&type_id)
            .and_then(|pool| pool.downcast_ref::<Self>())
        {
            return pool.clone();
        }

        let mut pools = SHARED_POOLS.write();

        let pool = pools.entry(type_id).or_insert_with(|| {
            debug!(item_type = type_name::<T>(), "creating shared source pool");
            Box::new(Self::new())
        });

        let Some(pool) = pool.downcast_ref::<Self>() else {
            unreachable!("shared pool registered under the TypeId of another type");
        };

        pool.clone()
    }

    /// Creates a completion source and the future observing it, reusing an idle slot if there is
    /// one.
    #[must_use]
    pub fn create(&self) -> (CompletionSource<T>, ValueFuture<T>) {
        SignalSlot::bind(self.core.rent())
    }

    /// The maximum number of idle slots the pool retains.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.items.len().saturating_add(1)
    }

    /// The number of idle slots currently held by the pool.
    ///
    /// This is a snapshot; concurrent rentals and returns may change it at any time.
    #[must_use]
    pub fn available(&self) -> usize {
        let first = usize::from(self.core.first.load().is_some());

        self.core
            .items
            .iter()
            .filter(|item| item.load().is_some())
            .count()
            .saturating_add(first)
    }

    /// The number of slots this pool has allocated over its lifetime.
    #[must_use]
    pub fn slots_created(&self) -> usize {
        self.core.slots_created.load(Ordering::Relaxed)
    }

    /// Whether sources from this pool dispatch every continuation off the completing thread.
    #[must_use]
    pub fn runs_continuations_asynchronously(&self) -> bool {
        self.core.run_continuations_asynchronously
    }
}

impl<T> Clone for SourcePool<T>
where
    T: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Default for SourcePool<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SourcePool<T>
where
    T: Send + 'static,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("slots_created", &self.slots_created())
            .field(
                "run_continuations_asynchronously",
                &self.core.run_continuations_asynchronously,
            )
            .finish()
    }
}

/// The storage of a pool, shared by its handles and referenced weakly by its slots.
pub(crate) struct PoolCore<T>
where
    T: Send + 'static,
{
    /// Checked first on both rent and return, so a single-threaded create/consume cycle never
    /// probes further.
    first: ArcSwapOption<SignalSlot<T>>,

    items: Box<[ArcSwapOption<SignalSlot<T>>]>,

    slots_created: AtomicUsize,

    run_continuations_asynchronously: bool,
}

impl<T> PoolCore<T>
where
    T: Send + 'static,
{
    fn rent(self: &Arc<Self>) -> Arc<SignalSlot<T>> {
        if let Some(slot) = self.first.swap(None) {
            return slot;
        }

        for item in &self.items {
            // Loading first keeps us from writing to items that are empty anyway.
            if item.load().is_none() {
                continue;
            }

            if let Some(slot) = item.swap(None) {
                return slot;
            }
        }

        let created = self
            .slots_created
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);

        trace!(slots_created = created, "source pool empty, creating new slot");

        Arc::new(SignalSlot::new(
            Arc::downgrade(self),
            self.run_continuations_asynchronously,
        ))
    }

    /// Offers a consumed slot back to the pool. The slot is dropped if the pool is full or the
    /// slot cannot serve any more generations.
    pub(crate) fn return_slot(&self, slot: Arc<SignalSlot<T>>) {
        if slot.is_exhausted() {
            debug!("refusing to pool an exhausted signal slot");
            return;
        }

        for item in iter::once(&self.first).chain(self.items.iter()) {
            let current = item.load();

            if current.is_some() {
                continue;
            }

            // This is a conditional swap - we only store into an item that is still empty.
            let previous = item.compare_and_swap(current, Some(Arc::clone(&slot)));

            if previous.is_none() {
                trace!(token = slot.token(), "signal slot returned to pool");
                return;
            }
        }

        debug!("source pool is full, dropping returned signal slot");
    }
}

/// Builder for creating an instance of [`SourcePool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`SourcePool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use value_source::SourcePool;
///
/// let pool = SourcePool::<u64>::builder()
///     .capacity(16)
///     .run_continuations_asynchronously(true)
///     .build();
///
/// assert_eq!(pool.capacity(), 16);
/// ```
///
/// [1]: SourcePool::new
#[must_use]
pub struct SourcePoolBuilder<T> {
    capacity: Option<NonZero<usize>>,
    run_continuations_asynchronously: bool,

    _item: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for SourcePoolBuilder<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .field(
                "run_continuations_asynchronously",
                &self.run_continuations_asynchronously,
            )
            .finish_non_exhaustive()
    }
}

impl<T> SourcePoolBuilder<T>
where
    T: Send + 'static,
{
    fn new() -> Self {
        Self {
            capacity: None,
            run_continuations_asynchronously: false,
            _item: PhantomData,
        }
    }

    /// Sets the maximum number of idle slots the pool retains.
    ///
    /// Defaults to twice the available parallelism of the process.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity =
            Some(NonZero::new(capacity).expect("a source pool must be able to hold one slot"));
        self
    }

    /// Dispatches every continuation off the completing thread, including continuations that
    /// were registered before completion.
    ///
    /// By default such continuations run inline on the thread that completes the source.
    pub fn run_continuations_asynchronously(mut self, value: bool) -> Self {
        self.run_continuations_asynchronously = value;
        self
    }

    /// Builds the pool. No slots are allocated until the first source is created.
    #[must_use]
    pub fn build(self) -> SourcePool<T> {
        let capacity = self.capacity.map_or_else(
            || {
                thread::available_parallelism()
                    .map_or(1, NonZero::get)
                    .saturating_mul(2)
            },
            NonZero::get,
        );

        let items = (1..capacity)
            .map(|_| ArcSwapOption::const_empty())
            .collect();

        SourcePool {
            core: Arc::new(PoolCore {
                first: ArcSwapOption::const_empty(),
                items,
                slots_created: AtomicUsize::new(0),
                run_continuations_asynchronously: self.run_continuations_asynchronously,
            }),
        }
    }
}
