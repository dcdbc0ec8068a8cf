//! In-process distributed cache adapter backed by a `MemoryCache`.

use async_trait::async_trait;

use crate::cache::{CacheEntryOptions, MemoryCache};
use crate::distributed::{DistributedCache, DistributedCacheEntryOptions};
use crate::error::Result;

/// Serves the distributed contract from a local `MemoryCache<Vec<u8>>`.
#[derive(Debug, Clone)]
pub struct LocalCache {
    cache: MemoryCache<Vec<u8>>,
}

impl LocalCache {
    pub fn new(cache: MemoryCache<Vec<u8>>) -> Self {
        Self { cache }
    }

    pub fn inner(&self) -> &MemoryCache<Vec<u8>> {
        &self.cache
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(MemoryCache::default())
    }
}

#[async_trait]
impl DistributedCache for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.try_get(key))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &DistributedCacheEntryOptions,
    ) -> Result<()> {
        let options = CacheEntryOptions::from_expiration(*options.expiration());
        self.cache.set(key, value.to_vec(), &options)?;
        Ok(())
    }

    async fn refresh(&self, key: &str) -> Result<()> {
        // A read renews the sliding window.
        self.cache.try_get(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.cache.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheOptions;
    use crate::clock::{SystemClock, TestClock};
    use chrono::Duration;
    use std::sync::Arc;

    fn local_cache() -> (LocalCache, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let cache = MemoryCache::new(MemoryCacheOptions::default().with_clock(clock.clone()));
        (LocalCache::new(cache), clock)
    }

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let (cache, _) = local_cache();
        let options = DistributedCacheEntryOptions::new();

        cache.set("key", b"payload", &options).await.unwrap();
        assert_eq!(cache.try_get("key").await.unwrap(), Some(b"payload".to_vec()));

        cache.remove("key").await.unwrap();
        assert_eq!(cache.try_get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_renews_sliding_window() {
        let (cache, clock) = local_cache();
        let options = DistributedCacheEntryOptions::new()
            .set_sliding_expiration(Duration::seconds(10))
            .unwrap();
        cache.set("key", b"v", &options).await.unwrap();

        clock.add(Duration::seconds(8));
        cache.refresh("key").await.unwrap();
        clock.add(Duration::seconds(8));
        assert!(cache.try_get("key").await.unwrap().is_some());

        clock.add(Duration::seconds(10));
        assert!(cache.try_get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let (cache, clock) = local_cache();
        let options = DistributedCacheEntryOptions::new()
            .set_absolute_expiration(clock.utc_now() - Duration::seconds(1))
            .unwrap();

        let err = cache.set("key", b"v", &options).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(cache.inner().is_empty());
    }
}
