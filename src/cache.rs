//! Memoization with at-most-once computation per key.
//!
//! [`MemoCache::get_or_compute`] runs the producer for a key exactly once even
//! when several threads ask for the same key at the same time: the first
//! caller becomes the owner of a pending slot, later callers block on the
//! slot's condition variable until the owner publishes the value. Values are
//! shared as `Arc<V>` and never change once published.
//!
//! A producer that fails (or panics) abandons its slot: the slot is removed,
//! waiters are woken, and the next caller computes afresh. Failures are never
//! cached. Nothing is evicted; [`CacheManager::reset`] is the only
//! invalidation path.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use log::debug;

use crate::{
    aggregate::{AggregationResult, GroupSeries, MeasureSummary, SummaryStats},
    dataset::CleanDataset,
};

/// Deterministic key assembled from the logical parameters of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: &str) -> Self {
        Self(kind.to_string())
    }

    /// Appends `name=value` with the value quoted and escaped, so separators
    /// inside a value cannot collide with the key structure.
    pub fn part(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push('|');
        self.0.push_str(name);
        self.0.push('=');
        self.0.push_str(&format!("{:?}", value.to_string()));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub computations: u64,
    pub hits: u64,
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            entries: self.entries + other.entries,
            computations: self.computations + other.computations,
            hits: self.hits + other.hits,
        }
    }
}

enum SlotState<V> {
    Pending,
    Ready(Arc<V>),
    Abandoned,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    ready: Condvar,
}

impl<V> Slot<V> {
    fn pending() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Blocks while pending. `None` means the owner gave up.
    fn wait(&self) -> Option<Arc<V>> {
        let mut state = lock(&self.state);
        loop {
            match &*state {
                SlotState::Ready(value) => return Some(Arc::clone(value)),
                SlotState::Abandoned => return None,
                SlotState::Pending => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn settle(&self, outcome: SlotState<V>) {
        *lock(&self.state) = outcome;
        self.ready.notify_all();
    }
}

enum Claim<V> {
    Owner(Arc<Slot<V>>),
    Waiter(Arc<Slot<V>>),
}

pub struct MemoCache<V> {
    name: &'static str,
    slots: Mutex<HashMap<CacheKey, Arc<Slot<V>>>>,
    computations: AtomicU64,
    hits: AtomicU64,
}

impl<V> MemoCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
            computations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn get_or_compute<E, F>(&self, key: &CacheKey, producer: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = loop {
            match self.claim(key) {
                Claim::Owner(slot) => break slot,
                Claim::Waiter(slot) => {
                    if let Some(value) = slot.wait() {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value);
                    }
                    debug!("{} cache: retrying abandoned key {key}", self.name);
                }
            }
        };

        let mut pending = PendingSlot {
            cache: self,
            key,
            slot: &slot,
            settled: false,
        };
        self.computations.fetch_add(1, Ordering::Relaxed);
        debug!("{} cache: computing {key}", self.name);
        let value = Arc::new(producer()?);
        pending.fulfil(Arc::clone(&value));
        Ok(value)
    }

    pub fn reset(&self) {
        let mut slots = lock(&self.slots);
        if !slots.is_empty() {
            debug!("{} cache: dropping {} entries", self.name, slots.len());
        }
        slots.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: lock(&self.slots).len(),
            computations: self.computations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    fn claim(&self, key: &CacheKey) -> Claim<V> {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(key) {
            return Claim::Waiter(Arc::clone(slot));
        }
        let slot = Arc::new(Slot::pending());
        slots.insert(key.clone(), Arc::clone(&slot));
        Claim::Owner(slot)
    }

    fn abandon(&self, key: &CacheKey, slot: &Arc<Slot<V>>) {
        {
            let mut slots = lock(&self.slots);
            if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                slots.remove(key);
            }
        }
        slot.settle(SlotState::Abandoned);
    }
}

/// Owner's handle on a pending slot; abandons the slot unless fulfilled, so a
/// failing or panicking producer never strands its waiters.
struct PendingSlot<'a, V> {
    cache: &'a MemoCache<V>,
    key: &'a CacheKey,
    slot: &'a Arc<Slot<V>>,
    settled: bool,
}

impl<V> PendingSlot<'_, V> {
    fn fulfil(&mut self, value: Arc<V>) {
        self.slot.settle(SlotState::Ready(value));
        self.settled = true;
    }
}

impl<V> Drop for PendingSlot<'_, V> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("{} cache: abandoning {}", self.cache.name, self.key);
            self.cache.abandon(self.key, self.slot);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide query cache, one partition per result type. Shared by
/// reference (usually behind an `Arc`) between every session of a process.
pub struct CacheManager {
    pub datasets: MemoCache<CleanDataset>,
    pub aggregates: MemoCache<AggregationResult>,
    pub summaries: MemoCache<SummaryStats>,
    pub series: MemoCache<Vec<GroupSeries>>,
    pub overviews: MemoCache<Vec<MeasureSummary>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            datasets: MemoCache::new("dataset"),
            aggregates: MemoCache::new("aggregate"),
            summaries: MemoCache::new("summary"),
            series: MemoCache::new("series"),
            overviews: MemoCache::new("overview"),
        }
    }

    /// Drops every entry. Use when the underlying source changes.
    pub fn reset(&self) {
        self.datasets.reset();
        self.aggregates.reset();
        self.summaries.reset();
        self.series.reset();
        self.overviews.reset();
    }

    pub fn stats(&self) -> CacheStats {
        self.datasets.stats()
            + self.aggregates.stats()
            + self.summaries.stats()
            + self.series.stats()
            + self.overviews.stats()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}
