//! Expiration Sweep Task
//!
//! Background task that periodically evicts expired cache entries, so an idle
//! cache still releases entries and fires their eviction callbacks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryCache;

/// Spawns a background task that sweeps expired entries every `cleanup_interval_secs`.
///
/// Returns the task handle, which can be aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache: MemoryCache<String> = MemoryCache::default();
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(cache: MemoryCache<V>, cleanup_interval_secs: u64) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiration sweep task with interval of {} seconds",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = cache.scan_for_expired_items();
            if removed > 0 {
                info!("Expiration sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }
    })
}
