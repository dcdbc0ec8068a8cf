//! Cache Entry Module
//!
//! One stored value with its snapshotted expiration policy and lifecycle state.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::cache::link::{LinkExpiry, WeakEntryLink};
use crate::cache::options::{
    CacheEntryOptions, CacheItemPriority, PostEvictionCallbackRegistration,
};
use crate::cache::trigger::{trigger_fired, TriggerRef, TriggerRegistration};

// == Eviction Reason ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    None,
    /// Explicitly removed.
    Removed,
    /// Overwritten by a `set` on the same key.
    Replaced,
    /// Absolute or sliding expiration elapsed.
    Expired,
    /// A trigger fired.
    TokenExpired,
    /// Removed by compaction.
    Capacity,
}

// == Entry State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Active,
    Expired,
    Evicted,
}

#[derive(Debug)]
struct Status {
    state: EntryState,
    reason: EvictionReason,
    last_accessed: DateTime<Utc>,
}

// == Cache Entry ==
pub(crate) struct CacheEntry<V> {
    key: String,
    value: V,
    absolute_expiration: Option<DateTime<Utc>>,
    sliding_expiration: Option<Duration>,
    priority: CacheItemPriority,
    triggers: Vec<TriggerRef>,
    links: Vec<WeakEntryLink>,
    status: Mutex<Status>,
    callbacks: Mutex<Vec<PostEvictionCallbackRegistration<V>>>,
    registrations: Mutex<Vec<TriggerRegistration>>,
}

impl<V> CacheEntry<V> {
    /// Snapshots `options` into a new entry created at `now`.
    pub(crate) fn new(
        key: String,
        value: V,
        absolute_expiration: Option<DateTime<Utc>>,
        options: &CacheEntryOptions<V>,
        now: DateTime<Utc>,
    ) -> Self
    where
        V: Clone,
    {
        Self {
            key,
            value,
            absolute_expiration,
            sliding_expiration: options.expiration().sliding_expiration(),
            priority: options.priority(),
            triggers: options.triggers().iter().map(Arc::downgrade).collect(),
            links: options.entry_links().iter().map(|l| l.downgrade()).collect(),
            status: Mutex::new(Status {
                state: EntryState::Active,
                reason: EvictionReason::None,
                last_accessed: now,
            }),
            callbacks: Mutex::new(options.post_eviction_callbacks().to_vec()),
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn priority(&self) -> CacheItemPriority {
        self.priority
    }

    pub(crate) fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.absolute_expiration
    }

    pub(crate) fn triggers(&self) -> &[TriggerRef] {
        &self.triggers
    }

    pub(crate) fn last_accessed(&self) -> DateTime<Utc> {
        self.status.lock().last_accessed
    }

    pub(crate) fn state(&self) -> EntryState {
        self.status.lock().state
    }

    pub(crate) fn eviction_reason(&self) -> EvictionReason {
        self.status.lock().reason
    }

    /// Resets the sliding window.
    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        let mut status = self.status.lock();
        if status.state == EntryState::Active && now > status.last_accessed {
            status.last_accessed = now;
        }
    }

    /// Evaluates every expiration source and moves Active to Expired when one applies.
    ///
    /// Boundary: an entry expires once `now` reaches its absolute deadline, or once
    /// the time since last access reaches the sliding window.
    pub(crate) fn check_expired(&self, now: DateTime<Utc>) -> bool {
        let mut status = self.status.lock();
        if status.state != EntryState::Active {
            return true;
        }
        let reason = if self.absolute_expiration.is_some_and(|at| at <= now) {
            Some(EvictionReason::Expired)
        } else if self
            .sliding_expiration
            .is_some_and(|sliding| now - status.last_accessed >= sliding)
        {
            Some(EvictionReason::Expired)
        } else if self.triggers.iter().any(trigger_fired) {
            Some(EvictionReason::TokenExpired)
        } else {
            self.links
                .iter()
                .filter_map(WeakEntryLink::upgrade)
                .find_map(|link| link.check_expired(now))
                .map(|expiry| match expiry {
                    LinkExpiry::Deadline => EvictionReason::Expired,
                    LinkExpiry::Trigger => EvictionReason::TokenExpired,
                })
        };
        match reason {
            Some(reason) => {
                status.state = EntryState::Expired;
                status.reason = reason;
                true
            }
            None => false,
        }
    }

    /// Marks the entry expired for `reason` unless a reason is already recorded.
    pub(crate) fn set_expired(&self, reason: EvictionReason) {
        let mut status = self.status.lock();
        if status.state == EntryState::Active {
            status.state = EntryState::Expired;
        }
        if status.reason == EvictionReason::None {
            status.reason = reason;
        }
    }

    /// Moves the entry to Evicted. The first recorded reason wins.
    /// Returns false if the entry was already evicted.
    pub(crate) fn mark_evicted(&self, reason: EvictionReason) -> bool {
        let mut status = self.status.lock();
        if status.state == EntryState::Evicted {
            return false;
        }
        status.state = EntryState::Evicted;
        if status.reason == EvictionReason::None {
            status.reason = reason;
        }
        true
    }

    /// Keeps a trigger registration until the entry is evicted.
    /// Registrations arriving after eviction are released at once.
    pub(crate) fn add_trigger_registration(&self, registration: TriggerRegistration) {
        let mut registrations = self.registrations.lock();
        if self.state() != EntryState::Evicted {
            registrations.push(registration);
        }
    }

    /// Unregisters this entry from every trigger it was pushed by.
    pub(crate) fn release_trigger_registrations(&self) -> usize {
        let registrations = std::mem::take(&mut *self.registrations.lock());
        registrations.len()
    }

    /// Invokes the registered callbacks. Each runs at most once over the
    /// entry's lifetime; a panicking callback is logged and the rest still run.
    pub(crate) fn invoke_eviction_callbacks(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        if callbacks.is_empty() {
            return 0;
        }
        let reason = self.eviction_reason();
        let mut delivered = 0;
        for registration in callbacks {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (registration.callback)(
                    &self.key,
                    &self.value,
                    reason,
                    registration.state.as_ref(),
                )
            }));
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => warn!(key = %self.key, ?reason, "eviction callback panicked"),
            }
        }
        delivered
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::link::EntryLink;
    use crate::cache::trigger::{ExpirationTrigger, ManualTrigger};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(options: &CacheEntryOptions<String>, now: DateTime<Utc>) -> CacheEntry<String> {
        let absolute = options.expiration().resolve_absolute(now).unwrap();
        CacheEntry::new("key".to_string(), "value".to_string(), absolute, options, now)
    }

    #[test]
    fn test_entry_without_expiration_stays_active() {
        let now = Utc::now();
        let e = entry(&CacheEntryOptions::new(), now);
        assert!(!e.check_expired(now + Duration::days(365)));
        assert_eq!(e.state(), EntryState::Active);
    }

    #[test]
    fn test_absolute_boundary() {
        let now = Utc::now();
        let options = CacheEntryOptions::new()
            .set_absolute_expiration_relative_to_now(Duration::seconds(10))
            .unwrap();
        let e = entry(&options, now);

        assert!(!e.check_expired(now + Duration::milliseconds(9_999)));
        assert!(e.check_expired(now + Duration::seconds(10)));
        assert_eq!(e.eviction_reason(), EvictionReason::Expired);
    }

    #[test]
    fn test_sliding_window_resets_on_touch() {
        let now = Utc::now();
        let options = CacheEntryOptions::new()
            .set_sliding_expiration(Duration::seconds(60))
            .unwrap();
        let e = entry(&options, now);

        e.touch(now + Duration::seconds(50));
        assert!(!e.check_expired(now + Duration::seconds(100)));
        assert!(e.check_expired(now + Duration::seconds(110)));
    }

    #[test]
    fn test_trigger_expires_with_token_reason() {
        let now = Utc::now();
        let manual = Arc::new(ManualTrigger::new());
        let trigger: Arc<dyn ExpirationTrigger> = manual.clone();
        let options = CacheEntryOptions::new().add_expiration_trigger(trigger);
        let e = entry(&options, now);

        assert!(!e.check_expired(now));
        manual.fire();
        assert!(e.check_expired(now));
        assert_eq!(e.eviction_reason(), EvictionReason::TokenExpired);
    }

    #[test]
    fn test_subscribed_link_is_read_live() {
        let now = Utc::now();
        let link = EntryLink::new();
        let options = CacheEntryOptions::new().add_entry_link(&link);
        let e = entry(&options, now);
        assert!(!e.check_expired(now));

        link.contribute(Some(now + Duration::seconds(5)), &[]);
        assert!(!e.check_expired(now + Duration::seconds(4)));
        assert!(e.check_expired(now + Duration::seconds(5)));
    }

    #[test]
    fn test_first_reason_wins() {
        let e = entry(&CacheEntryOptions::new(), Utc::now());
        e.set_expired(EvictionReason::TokenExpired);
        assert!(e.mark_evicted(EvictionReason::Removed));
        assert!(!e.mark_evicted(EvictionReason::Replaced));
        assert_eq!(e.eviction_reason(), EvictionReason::TokenExpired);
        assert_eq!(e.state(), EntryState::Evicted);
    }

    #[test]
    fn test_callbacks_fire_once_and_survive_panics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = calls.clone();
        let third = calls.clone();
        let options = CacheEntryOptions::new()
            .register_post_eviction_callback(move |_, _, _, _| {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .register_post_eviction_callback(|_, _, _, _| panic!("callback failure"))
            .register_post_eviction_callback(move |key, value, reason, _| {
                assert_eq!(key, "key");
                assert_eq!(value, "value");
                assert_eq!(reason, EvictionReason::Removed);
                third.fetch_add(1, Ordering::SeqCst);
            });
        let e = entry(&options, Utc::now());

        e.mark_evicted(EvictionReason::Removed);
        assert_eq!(e.invoke_eviction_callbacks(), 2);
        assert_eq!(e.invoke_eviction_callbacks(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_eviction_releases_trigger_registrations() {
        let now = Utc::now();
        let trigger = ManualTrigger::new();
        let e = entry(&CacheEntryOptions::new(), now);

        e.add_trigger_registration(trigger.register_callback(Box::new(|| {})));
        assert_eq!(trigger.registered_callbacks(), 1);

        assert!(e.mark_evicted(EvictionReason::Removed));
        assert_eq!(e.release_trigger_registrations(), 1);
        assert_eq!(trigger.registered_callbacks(), 0);

        // Registrations added after eviction are not kept.
        e.add_trigger_registration(trigger.register_callback(Box::new(|| {})));
        assert_eq!(trigger.registered_callbacks(), 0);
    }
}
