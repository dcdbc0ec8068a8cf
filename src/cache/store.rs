//! Cache Store Module
//!
//! Main cache engine: a sharded concurrent map of entries with lazy expiration,
//! opportunistic background sweeps, priority compaction and eviction callbacks.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::compaction::{compaction_target, select_victims};
use crate::cache::context::LinkingContext;
use crate::cache::dispatch::{invoke_all, DispatchJob, EvictionDispatcher};
use crate::cache::entry::{CacheEntry, EvictionReason};
use crate::cache::link::EntryLink;
use crate::cache::options::CacheEntryOptions;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::cache::trigger::{push_unique, TriggerRef};
use crate::clock::{SystemClock, UtcClock};
use crate::error::Result;

// == Memory Cache Options ==
/// Store-level configuration.
#[derive(Debug, Clone)]
pub struct MemoryCacheOptions {
    /// Source of "now" for every expiration decision
    pub clock: Arc<dyn SystemClock>,
    /// Compact automatically when `size_limit` is exceeded
    pub compact_on_memory_pressure: bool,
    /// Maximum number of entries before pressure compaction kicks in
    pub size_limit: Option<usize>,
    /// Minimum fraction of entries removed by one pressure compaction
    pub compaction_percentage: f64,
    /// Minimum time between two opportunistic expiration sweeps
    pub expiration_scan_frequency: Duration,
    /// Capacity of the background job queue
    pub callback_queue_capacity: usize,
}

impl MemoryCacheOptions {
    pub fn with_clock(mut self, clock: Arc<dyn SystemClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = Some(size_limit);
        self
    }

    pub fn with_compact_on_memory_pressure(mut self, enabled: bool) -> Self {
        self.compact_on_memory_pressure = enabled;
        self
    }

    pub fn with_expiration_scan_frequency(mut self, frequency: Duration) -> Self {
        self.expiration_scan_frequency = frequency;
        self
    }
}

impl Default for MemoryCacheOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(UtcClock),
            compact_on_memory_pressure: true,
            size_limit: None,
            compaction_percentage: 0.10,
            expiration_scan_frequency: Duration::minutes(1),
            callback_queue_capacity: 1024,
        }
    }
}

// == Cache Inner ==
pub(crate) struct CacheInner<V> {
    entries: DashMap<String, Arc<CacheEntry<V>>>,
    options: MemoryCacheOptions,
    stats: StatsCounters,
    last_scan: Mutex<DateTime<Utc>>,
    compaction_queued: AtomicBool,
    dispatcher: EvictionDispatcher<V>,
}

impl<V> CacheInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.options.clock.utc_now()
    }

    /// Removes `entry` if it is still the one stored under its key, then records the eviction.
    fn evict_if_current(&self, entry: &Arc<CacheEntry<V>>, reason: EvictionReason) -> bool {
        let removed = self
            .entries
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry))
            .is_some();
        if removed {
            self.finish_eviction(entry, reason);
        }
        removed
    }

    fn finish_eviction(&self, entry: &CacheEntry<V>, reason: EvictionReason) -> bool {
        if !entry.mark_evicted(reason) {
            return false;
        }
        entry.release_trigger_registrations();
        let reason = entry.eviction_reason();
        self.stats.record_eviction(reason);
        debug!(key = %entry.key(), ?reason, "entry evicted");
        true
    }

    /// Evicts every entry that is expired at `now`.
    pub(crate) fn remove_expired(&self, now: DateTime<Utc>) -> Vec<Arc<CacheEntry<V>>> {
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|r| r.value().check_expired(now))
            .map(|r| Arc::clone(r.value()))
            .collect();

        expired
            .into_iter()
            .filter(|entry| self.evict_if_current(entry, EvictionReason::Expired))
            .collect()
    }

    /// Evicts expired entries, then up to `count` total entries in compaction order.
    fn compact(&self, count: usize, now: DateTime<Utc>) -> Vec<Arc<CacheEntry<V>>> {
        let mut evicted = self.remove_expired(now);
        let remaining = count.saturating_sub(evicted.len());
        if remaining == 0 {
            return evicted;
        }

        let live: Vec<_> = self.entries.iter().map(|r| Arc::clone(r.value())).collect();
        for victim in select_victims(live, remaining) {
            if self.evict_if_current(&victim, EvictionReason::Capacity) {
                evicted.push(victim);
            }
        }
        debug!(evicted = evicted.len(), "compaction finished");
        evicted
    }

    /// Brings the entry count back under the size limit.
    pub(crate) fn compact_to_size_limit(&self) -> Vec<Arc<CacheEntry<V>>> {
        self.compaction_queued.store(false, Ordering::Release);
        let Some(limit) = self.options.size_limit else {
            return Vec::new();
        };
        let len = self.entries.len();
        if len <= limit {
            return Vec::new();
        }
        let count = (len - limit).max(compaction_target(len, self.options.compaction_percentage));
        debug!(len, limit, count, "compacting under memory pressure");
        self.compact(count, self.now())
    }

    /// Queues a sweep if the last one is older than the scan frequency.
    fn start_scan_for_expired_items(&self, now: DateTime<Utc>) {
        {
            let mut last_scan = self.last_scan.lock();
            if now - *last_scan < self.options.expiration_scan_frequency {
                return;
            }
            *last_scan = now;
        }
        if self.dispatcher.try_submit(DispatchJob::ScanExpired).is_err() {
            let evicted = self.remove_expired(now);
            invoke_all(&evicted);
        }
    }

    fn maybe_start_compaction(&self) {
        if !self.options.compact_on_memory_pressure {
            return;
        }
        let Some(limit) = self.options.size_limit else {
            return;
        };
        if self.entries.len() <= limit || self.compaction_queued.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.dispatcher.try_submit(DispatchJob::Compact).is_err() {
            let evicted = self.compact_to_size_limit();
            invoke_all(&evicted);
        }
    }

    fn on_trigger_fired(&self, entry: &Arc<CacheEntry<V>>) {
        entry.set_expired(EvictionReason::TokenExpired);
        if self.evict_if_current(entry, EvictionReason::TokenExpired) {
            self.dispatcher.dispatch_callbacks(vec![Arc::clone(entry)]);
        }
    }

    /// Merges the entry's constraints into each ambient link it does not subscribe to.
    fn propagate(
        &self,
        entry: &CacheEntry<V>,
        options: &CacheEntryOptions<V>,
        ambient: &[EntryLink],
    ) {
        if ambient.is_empty() {
            return;
        }

        let mut absolute = entry.absolute_expiration();
        let mut triggers: Vec<TriggerRef> = entry.triggers().to_vec();
        for link in options.entry_links() {
            let (link_absolute, link_triggers) = link.snapshot();
            absolute = earliest(absolute, link_absolute);
            for trigger in &link_triggers {
                push_unique(&mut triggers, trigger);
            }
        }

        for link in ambient {
            if options.subscribes_to(link) {
                continue;
            }
            if link.contribute(absolute, &triggers) {
                debug!(key = %entry.key(), link = link.id(), "entry contributed to link");
            }
        }
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// == Memory Cache ==
/// Concurrent in-process cache. Cloning yields another handle to the same store.
///
/// Operations on one key are linearizable: a `set` is visible to any later
/// `try_get`, and `remove` has removed the entry when it returns. Callbacks of
/// entries evicted by `set`, `try_get` and `remove` run on the calling thread
/// after the store lock is released; entries evicted by sweeps, compaction or
/// trigger notifications have their callbacks run by a background worker.
pub struct MemoryCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(options: MemoryCacheOptions) -> Self {
        let now = options.clock.utc_now();
        let capacity = options.callback_queue_capacity;
        let inner = Arc::new_cyclic(|weak: &Weak<CacheInner<V>>| CacheInner {
            entries: DashMap::new(),
            options,
            stats: StatsCounters::default(),
            last_scan: Mutex::new(now),
            compaction_queued: AtomicBool::new(false),
            dispatcher: EvictionDispatcher::start(weak.clone(), capacity),
        });
        Self { inner }
    }

    // == Set ==
    /// Creates or overwrites the entry for `key` and returns `value`.
    ///
    /// Options are validated before the store is touched. Overwriting evicts
    /// the previous entry with reason `Replaced`.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        options: &CacheEntryOptions<V>,
    ) -> Result<V> {
        self.set_with_ambient(key.into(), value, options, &[])
    }

    /// Like [`set`](Self::set), and also contributes the entry's absolute
    /// expiration and triggers to `link`.
    pub fn set_linked(
        &self,
        key: impl Into<String>,
        value: V,
        link: &EntryLink,
        options: &CacheEntryOptions<V>,
    ) -> Result<V> {
        self.set_with_ambient(key.into(), value, options, std::slice::from_ref(link))
    }

    /// Stores `value` with default options.
    pub fn insert(&self, key: impl Into<String>, value: V) -> V {
        let options = CacheEntryOptions::new();
        let key = key.into();
        match self.set_with_ambient(key, value.clone(), &options, &[]) {
            Ok(stored) => stored,
            // Default options carry no deadline, so validation cannot fail.
            Err(_) => value,
        }
    }

    pub(crate) fn set_with_ambient(
        &self,
        key: String,
        value: V,
        options: &CacheEntryOptions<V>,
        ambient: &[EntryLink],
    ) -> Result<V> {
        let inner = &self.inner;
        let now = inner.now();
        let absolute = options.expiration().resolve_absolute(now)?;
        let entry = Arc::new(CacheEntry::new(
            key.clone(),
            value.clone(),
            absolute,
            options,
            now,
        ));

        inner.propagate(&entry, options, ambient);
        self.register_trigger_callbacks(&entry, options);

        // The replaced entry's callbacks complete before the new value is stored.
        if let Some((_, prior)) = inner.entries.remove(&key) {
            if inner.finish_eviction(&prior, EvictionReason::Replaced) {
                prior.invoke_eviction_callbacks();
            }
        }

        let mut evicted = Vec::new();
        if let Some(prior) = inner.entries.insert(key, Arc::clone(&entry)) {
            if inner.finish_eviction(&prior, EvictionReason::Replaced) {
                evicted.push(prior);
            }
        }
        if entry.check_expired(now) && inner.evict_if_current(&entry, EvictionReason::Expired) {
            evicted.push(entry);
        }
        invoke_all(&evicted);

        inner.start_scan_for_expired_items(now);
        inner.maybe_start_compaction();
        Ok(value)
    }

    fn register_trigger_callbacks(&self, entry: &Arc<CacheEntry<V>>, options: &CacheEntryOptions<V>) {
        for trigger in options.triggers() {
            if !trigger.is_active() {
                continue;
            }
            let cache = Arc::downgrade(&self.inner);
            let target = Arc::downgrade(entry);
            let registration = trigger.register_callback(Box::new(move || {
                if let (Some(inner), Some(entry)) = (cache.upgrade(), target.upgrade()) {
                    inner.on_trigger_fired(&entry);
                }
            }));
            entry.add_trigger_registration(registration);
        }
    }

    // == Try Get ==
    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry found here is evicted. A hit resets the sliding window.
    pub fn try_get(&self, key: &str) -> Option<V> {
        let inner = &self.inner;
        let now = inner.now();
        let found = inner.entries.get(key).map(|r| Arc::clone(r.value()));

        let result = match found {
            Some(entry) if !entry.check_expired(now) => {
                entry.touch(now);
                inner.stats.record_hit();
                Some(entry.value().clone())
            }
            Some(entry) => {
                if inner.evict_if_current(&entry, EvictionReason::Expired) {
                    entry.invoke_eviction_callbacks();
                }
                inner.stats.record_miss();
                None
            }
            None => {
                inner.stats.record_miss();
                None
            }
        };

        inner.start_scan_for_expired_items(now);
        result
    }

    // == Remove ==
    /// Evicts `key` with reason `Removed`. Absent keys are a no-op.
    pub fn remove(&self, key: &str) {
        let inner = &self.inner;
        let now = inner.now();
        if let Some((_, entry)) = inner.entries.remove(key) {
            if inner.finish_eviction(&entry, EvictionReason::Removed) {
                entry.invoke_eviction_callbacks();
            }
        }
        inner.start_scan_for_expired_items(now);
    }

    // == Linking ==
    /// Creates a context holding its own stack of ambient link scopes.
    ///
    /// Use one context per logical execution flow; `set` calls made through it
    /// contribute to the scopes it has open.
    pub fn linking_context(&self) -> LinkingContext<V> {
        LinkingContext::new(self.clone())
    }

    // == Maintenance ==
    /// Evicts expired entries, then `percentage` of the entries by priority
    /// and last access. Returns the number of evicted entries; their
    /// callbacks are queued.
    pub fn compact(&self, percentage: f64) -> usize {
        let count = compaction_target(self.inner.entries.len(), percentage);
        let evicted = self.inner.compact(count, self.inner.now());
        let total = evicted.len();
        self.inner.dispatcher.dispatch_callbacks(evicted);
        total
    }

    /// Runs a pressure compaction now instead of waiting for the background worker.
    pub fn enforce_size_limit(&self) -> usize {
        let evicted = self.inner.compact_to_size_limit();
        let total = evicted.len();
        self.inner.dispatcher.dispatch_callbacks(evicted);
        total
    }

    /// Evicts every expired entry now. Returns the number of evicted entries;
    /// their callbacks are queued.
    pub fn scan_for_expired_items(&self) -> usize {
        let now = self.inner.now();
        *self.inner.last_scan.lock() = now;
        let evicted = self.inner.remove_expired(now);
        let total = evicted.len();
        self.inner.dispatcher.dispatch_callbacks(evicted);
        total
    }

    // == Introspection ==
    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.entries.len())
    }

    pub fn clock(&self) -> &Arc<dyn SystemClock> {
        &self.inner.options.clock
    }
}

impl<V> Default for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(MemoryCacheOptions::default())
    }
}

impl<V> Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entries.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::options::CacheItemPriority;
    use crate::cache::trigger::{ExpirationTrigger, ManualTrigger};
    use crate::clock::TestClock;
    use crossbeam::channel::unbounded;
    use std::time::Duration as StdDuration;

    fn test_cache() -> (MemoryCache<String>, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let options = MemoryCacheOptions::default()
            .with_clock(clock.clone())
            .with_compact_on_memory_pressure(false);
        (MemoryCache::new(options), clock)
    }

    fn opts() -> CacheEntryOptions<String> {
        CacheEntryOptions::new()
    }

    #[test]
    fn test_store_set_and_get() {
        let (cache, _) = test_cache();

        let stored = cache.set("key1", "value1".to_string(), &opts()).unwrap();
        assert_eq!(stored, "value1");
        assert_eq!(cache.try_get("key1"), Some("value1".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let (cache, _) = test_cache();
        cache.insert("Key", "upper".to_string());
        assert!(cache.try_get("key").is_none());
        assert_eq!(cache.try_get("Key"), Some("upper".to_string()));
    }

    #[test]
    fn test_store_get_nonexistent() {
        let (cache, _) = test_cache();
        assert!(cache.try_get("nonexistent").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_store_remove_is_idempotent() {
        let (cache, _) = test_cache();
        cache.insert("key1", "value1".to_string());

        cache.remove("key1");
        cache.remove("key1");
        cache.remove("never-set");

        assert!(cache.is_empty());
        assert_eq!(cache.stats().removed, 1);
    }

    #[test]
    fn test_invalid_options_do_not_touch_store() {
        let (cache, clock) = test_cache();
        let past = clock.utc_now() - Duration::minutes(1);
        let options = opts().set_absolute_expiration(past).unwrap();

        let err = cache.set("key", "value".to_string(), &options).unwrap_err();
        assert!(err.is_configuration());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_fires_callback_before_returning() {
        let (cache, _) = test_cache();
        let (tx, rx) = unbounded();
        let options = opts().register_post_eviction_callback(move |key, value, reason, _| {
            tx.send((key.to_string(), value.clone(), reason)).unwrap();
        });

        cache.set("key", "old".to_string(), &options).unwrap();
        cache.set("key", "new".to_string(), &opts()).unwrap();

        let (key, value, reason) = rx.try_recv().expect("callback ran inline");
        assert_eq!(key, "key");
        assert_eq!(value, "old");
        assert_eq!(reason, EvictionReason::Replaced);
        assert_eq!(cache.try_get("key"), Some("new".to_string()));
    }

    #[test]
    fn test_options_are_snapshotted() {
        let (cache, clock) = test_cache();
        let options = opts();
        cache.set("key", "value".to_string(), &options).unwrap();

        let _changed = options
            .set_absolute_expiration_relative_to_now(Duration::seconds(1))
            .unwrap();
        clock.add(Duration::seconds(5));

        assert_eq!(cache.try_get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_already_fired_trigger_never_stores() {
        let (cache, _) = test_cache();
        let manual = Arc::new(ManualTrigger::new());
        manual.fire();
        let trigger: Arc<dyn ExpirationTrigger> = manual.clone();

        cache
            .set("key", "value".to_string(), &opts().add_expiration_trigger(trigger))
            .unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().token_expired, 1);
    }

    #[test]
    fn test_active_trigger_evicts_without_access() {
        let (cache, _) = test_cache();
        let (tx, rx) = unbounded();
        let manual = Arc::new(ManualTrigger::new());
        let trigger: Arc<dyn ExpirationTrigger> = manual.clone();
        let options = opts()
            .add_expiration_trigger(trigger)
            .register_post_eviction_callback(move |_, _, reason, _| {
                tx.send(reason).unwrap();
            });

        cache.set("key", "value".to_string(), &options).unwrap();
        manual.fire();

        assert!(cache.is_empty());
        let reason = rx.recv_timeout(StdDuration::from_secs(1)).unwrap();
        assert_eq!(reason, EvictionReason::TokenExpired);
    }

    #[test]
    fn test_compact_evicts_low_priority_first() {
        let (cache, clock) = test_cache();
        let low = opts().set_priority(CacheItemPriority::Low);
        let high = opts().set_priority(CacheItemPriority::High);
        let pinned = opts().set_priority(CacheItemPriority::NeverRemove);

        cache.set("high", "h".to_string(), &high).unwrap();
        cache.set("pinned", "p".to_string(), &pinned).unwrap();
        clock.add(Duration::seconds(1));
        cache.set("low", "l".to_string(), &low).unwrap();
        cache.set("normal", "n".to_string(), &opts()).unwrap();

        assert_eq!(cache.compact(0.5), 2);
        assert!(cache.try_get("low").is_none());
        assert!(cache.try_get("normal").is_none());
        assert!(cache.try_get("high").is_some());

        assert_eq!(cache.compact(1.0), 1);
        assert!(cache.try_get("pinned").is_some());
        assert_eq!(cache.stats().capacity, 3);
    }

    #[test]
    fn test_pressure_compaction_respects_size_limit() {
        let clock = Arc::new(TestClock::new());
        let options = MemoryCacheOptions::default()
            .with_clock(clock)
            .with_size_limit(3);
        let cache: MemoryCache<u32> = MemoryCache::new(options);

        for i in 0..10 {
            cache.insert(format!("key{i}"), i);
        }
        cache.enforce_size_limit();

        assert!(cache.len() <= 3);
    }

    #[test]
    fn test_scan_for_expired_items() {
        let (cache, clock) = test_cache();
        let short = opts()
            .set_absolute_expiration_relative_to_now(Duration::seconds(1))
            .unwrap();
        cache.set("short", "s".to_string(), &short).unwrap();
        cache.insert("long", "l".to_string());

        clock.add(Duration::seconds(2));
        assert_eq!(cache.scan_for_expired_items(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_keys() {
        let (cache, _) = test_cache();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.insert(format!("t{t}-{i}"), format!("{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
