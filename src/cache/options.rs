//! Cache Entry Options Module
//!
//! Builder-style configuration for a single `set` call.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::entry::EvictionReason;
use crate::cache::link::EntryLink;
use crate::cache::trigger::ExpirationTrigger;
use crate::error::Result;
use crate::expiration::ExpirationSettings;

// == Priority ==
/// Retention priority during compaction. Lower priorities are evicted first;
/// `NeverRemove` entries are never compacted away.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CacheItemPriority {
    Low,
    #[default]
    Normal,
    High,
    NeverRemove,
}

/// Opaque state handed back to an eviction callback.
pub type CallbackState = Arc<dyn Any + Send + Sync>;

/// Callback invoked once after an entry leaves the cache.
pub type PostEvictionCallback<V> =
    Arc<dyn Fn(&str, &V, EvictionReason, Option<&CallbackState>) + Send + Sync>;

/// A callback together with the state it was registered with.
#[derive(Clone)]
pub struct PostEvictionCallbackRegistration<V> {
    pub callback: PostEvictionCallback<V>,
    pub state: Option<CallbackState>,
}

// == Cache Entry Options ==
/// Per-entry configuration. The cache snapshots these fields on `set`,
/// so later changes to the same options value do not affect stored entries.
#[derive(Clone)]
pub struct CacheEntryOptions<V> {
    expiration: ExpirationSettings,
    priority: CacheItemPriority,
    triggers: Vec<Arc<dyn ExpirationTrigger>>,
    callbacks: Vec<PostEvictionCallbackRegistration<V>>,
    links: Vec<EntryLink>,
}

impl<V> Default for CacheEntryOptions<V> {
    fn default() -> Self {
        Self {
            expiration: ExpirationSettings::default(),
            priority: CacheItemPriority::default(),
            triggers: Vec::new(),
            callbacks: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl<V> CacheEntryOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from already validated expiration settings.
    pub fn from_expiration(expiration: ExpirationSettings) -> Self {
        Self {
            expiration,
            ..Self::default()
        }
    }

    /// Sets an absolute expiration date for the entry.
    pub fn set_absolute_expiration(mut self, at: DateTime<Utc>) -> Result<Self> {
        self.expiration.set_absolute_expiration(at)?;
        Ok(self)
    }

    /// Sets an absolute expiration time, relative to the moment of `set`.
    pub fn set_absolute_expiration_relative_to_now(mut self, relative: Duration) -> Result<Self> {
        self.expiration
            .set_absolute_expiration_relative_to_now(relative)?;
        Ok(self)
    }

    /// Sets how long the entry can stay unread before it expires.
    /// This never extends the lifetime past the absolute expiration.
    pub fn set_sliding_expiration(mut self, sliding: Duration) -> Result<Self> {
        self.expiration.set_sliding_expiration(sliding)?;
        Ok(self)
    }

    pub fn set_priority(mut self, priority: CacheItemPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Expires the entry when `trigger` fires. The entry only keeps a weak
    /// reference, so the caller owns the trigger's lifetime.
    pub fn add_expiration_trigger(mut self, trigger: Arc<dyn ExpirationTrigger>) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Subscribes the entry to `link`: the link's aggregate is re-read on every access.
    pub fn add_entry_link(mut self, link: &EntryLink) -> Self {
        if !self.links.iter().any(|l| l.ptr_eq(link)) {
            self.links.push(link.clone());
        }
        self
    }

    /// Runs `callback` after the entry is evicted.
    pub fn register_post_eviction_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&str, &V, EvictionReason, Option<&CallbackState>) + Send + Sync + 'static,
    {
        self.register_callback_registration(Arc::new(callback), None)
    }

    /// Runs `callback` with `state` after the entry is evicted.
    pub fn register_post_eviction_callback_with_state<F>(
        self,
        callback: F,
        state: CallbackState,
    ) -> Self
    where
        F: Fn(&str, &V, EvictionReason, Option<&CallbackState>) + Send + Sync + 'static,
    {
        self.register_callback_registration(Arc::new(callback), Some(state))
    }

    fn register_callback_registration(
        mut self,
        callback: PostEvictionCallback<V>,
        state: Option<CallbackState>,
    ) -> Self {
        self.callbacks
            .push(PostEvictionCallbackRegistration { callback, state });
        self
    }

    pub fn expiration(&self) -> &ExpirationSettings {
        &self.expiration
    }

    pub fn priority(&self) -> CacheItemPriority {
        self.priority
    }

    pub fn triggers(&self) -> &[Arc<dyn ExpirationTrigger>] {
        &self.triggers
    }

    pub fn post_eviction_callbacks(&self) -> &[PostEvictionCallbackRegistration<V>] {
        &self.callbacks
    }

    pub fn entry_links(&self) -> &[EntryLink] {
        &self.links
    }

    /// True when `link` is one of this entry's subscription targets.
    pub fn subscribes_to(&self, link: &EntryLink) -> bool {
        self.links.iter().any(|l| l.ptr_eq(link))
    }
}

impl<V> Debug for CacheEntryOptions<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntryOptions")
            .field("expiration", &self.expiration)
            .field("priority", &self.priority)
            .field("triggers", &self.triggers.len())
            .field("callbacks", &self.callbacks.len())
            .field("links", &self.links)
            .finish()
    }
}
