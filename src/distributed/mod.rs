//! Distributed Cache Module
//!
//! Byte-payload cache contract shared by remote backends and the in-process adapter.
//! No linking, triggers or priorities: only absolute and sliding expiration.

mod local;
mod redis_cache;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::expiration::ExpirationSettings;

pub use self::local::LocalCache;
pub use self::redis_cache::{RedisCache, RedisCacheOptions};

// == Distributed Cache Trait ==
/// Get / set / refresh / remove over opaque byte payloads.
///
/// A missing key is `Ok(None)`; `Err` is reserved for configuration and
/// backend failures.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Returns the backend name for logging.
    fn name(&self) -> &'static str;

    /// Reads the payload for `key`, renewing its sliding window.
    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `value` and its expiration in one step.
    async fn set(&self, key: &str, value: &[u8], options: &DistributedCacheEntryOptions)
        -> Result<()>;

    /// Renews the sliding window without returning the payload.
    async fn refresh(&self, key: &str) -> Result<()>;

    /// Deletes `key`. Absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

// == Distributed Cache Entry Options ==
/// Expiration options for one distributed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributedCacheEntryOptions {
    expiration: ExpirationSettings,
}

impl DistributedCacheEntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_absolute_expiration(mut self, at: DateTime<Utc>) -> Result<Self> {
        self.expiration.set_absolute_expiration(at)?;
        Ok(self)
    }

    pub fn set_absolute_expiration_relative_to_now(mut self, relative: Duration) -> Result<Self> {
        self.expiration
            .set_absolute_expiration_relative_to_now(relative)?;
        Ok(self)
    }

    pub fn set_sliding_expiration(mut self, sliding: Duration) -> Result<Self> {
        self.expiration.set_sliding_expiration(sliding)?;
        Ok(self)
    }

    pub fn expiration(&self) -> &ExpirationSettings {
        &self.expiration
    }
}
