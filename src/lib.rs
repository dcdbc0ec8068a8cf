//! linkcache - in-process cache with linked expiration
//!
//! A concurrent key/value cache where every entry carries its own expiration
//! policy (absolute, sliding or trigger-based), evictions fire post-eviction
//! callbacks, capacity pressure triggers priority-aware compaction, and entry
//! links let a derived entry inherit the tightest expiration of its inputs.
//! A Redis-backed distributed cache exposes the same get/set/refresh/remove
//! contract over byte payloads.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod distributed;
pub mod error;
pub mod expiration;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{
    CacheEntryOptions, CacheItemPriority, CacheStats, EntryLink, EntryLinkScope, EvictionReason,
    ExpirationTrigger, LinkingContext, MemoryCache, MemoryCacheOptions,
};
pub use clock::{SystemClock, TestClock, UtcClock};
pub use config::Config;
pub use distributed::{DistributedCache, DistributedCacheEntryOptions, LocalCache, RedisCache};
pub use error::{CacheError, Result};
pub use expiration::ExpirationSettings;
pub use tasks::spawn_cleanup_task;
