//! Cache Module
//!
//! Provides the in-process cache: entries with absolute, sliding and
//! trigger-based expiration, entry links that aggregate expiration across
//! dependent entries, priority compaction and post-eviction callbacks.

mod compaction;
mod context;
mod dispatch;
mod entry;
mod link;
mod options;
mod stats;
mod store;
mod trigger;


// Re-export public types
pub use context::LinkingContext;
pub use entry::{EntryState, EvictionReason};
pub use link::{EntryLink, EntryLinkScope, LinkScopeStack};
pub use options::{
    CacheEntryOptions, CacheItemPriority, CallbackState, PostEvictionCallback,
    PostEvictionCallbackRegistration,
};
pub use stats::CacheStats;
pub use store::{MemoryCache, MemoryCacheOptions};
pub use trigger::{
    CancellationTrigger, ExpirationTrigger, ManualTrigger, TimeTrigger, TriggerCallback,
    TriggerRegistration,
};
