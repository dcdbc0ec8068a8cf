//! Compaction Module
//!
//! Chooses which entries to drop when the cache is over capacity.
//!
//! Order of eviction:
//! - Lowest priority first (Low, then Normal, then High)
//! - Within one priority, least recently accessed first
//! - `NeverRemove` entries are never chosen

use std::sync::Arc;

use crate::cache::entry::CacheEntry;
use crate::cache::options::CacheItemPriority;

// == Select Victims ==
/// Picks up to `count` entries in compaction order.
pub(crate) fn select_victims<V, I>(entries: I, count: usize) -> Vec<Arc<CacheEntry<V>>>
where
    I: IntoIterator<Item = Arc<CacheEntry<V>>>,
{
    if count == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<_> = entries
        .into_iter()
        .filter(|e| e.priority() != CacheItemPriority::NeverRemove)
        .map(|e| ((e.priority(), e.last_accessed()), e))
        .collect();

    candidates.sort_by(|(a, ea), (b, eb)| a.cmp(b).then_with(|| ea.key().cmp(eb.key())));
    candidates.truncate(count);
    candidates.into_iter().map(|(_, e)| e).collect()
}

/// Number of entries a compaction of `percentage` removes from `len` entries.
pub(crate) fn compaction_target(len: usize, percentage: f64) -> usize {
    if len == 0 || percentage <= 0.0 {
        return 0;
    }
    let count = (len as f64 * percentage.min(1.0)).ceil() as usize;
    count.min(len)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::options::CacheEntryOptions;
    use chrono::{DateTime, Duration, Utc};

    fn entry(
        key: &str,
        priority: CacheItemPriority,
        accessed: DateTime<Utc>,
    ) -> Arc<CacheEntry<u32>> {
        let options = CacheEntryOptions::new().set_priority(priority);
        Arc::new(CacheEntry::new(key.to_string(), 0, None, &options, accessed))
    }

    fn keys(victims: &[Arc<CacheEntry<u32>>]) -> Vec<&str> {
        victims.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_lower_priority_goes_first() {
        let now = Utc::now();
        let entries = vec![
            entry("high", CacheItemPriority::High, now),
            entry("low", CacheItemPriority::Low, now),
            entry("normal", CacheItemPriority::Normal, now),
        ];

        let victims = select_victims(entries, 2);
        assert_eq!(keys(&victims), vec!["low", "normal"]);
    }

    #[test]
    fn test_oldest_access_within_priority() {
        let now = Utc::now();
        let entries = vec![
            entry("recent", CacheItemPriority::Normal, now),
            entry("stale", CacheItemPriority::Normal, now - Duration::minutes(5)),
            entry("older", CacheItemPriority::Normal, now - Duration::minutes(1)),
        ];

        let victims = select_victims(entries, 3);
        assert_eq!(keys(&victims), vec!["stale", "older", "recent"]);
    }

    #[test]
    fn test_never_remove_is_exempt() {
        let now = Utc::now();
        let entries = vec![
            entry("pinned", CacheItemPriority::NeverRemove, now - Duration::hours(1)),
            entry("normal", CacheItemPriority::Normal, now),
        ];

        let victims = select_victims(entries, 2);
        assert_eq!(keys(&victims), vec!["normal"]);
    }

    #[test]
    fn test_zero_count_selects_nothing() {
        let entries = vec![entry("a", CacheItemPriority::Low, Utc::now())];
        assert!(select_victims(entries, 0).is_empty());
    }

    #[test]
    fn test_compaction_target() {
        assert_eq!(compaction_target(0, 0.5), 0);
        assert_eq!(compaction_target(10, 0.0), 0);
        assert_eq!(compaction_target(10, 0.1), 1);
        assert_eq!(compaction_target(3, 0.1), 1);
        assert_eq!(compaction_target(10, 0.25), 3);
        assert_eq!(compaction_target(10, 2.0), 10);
    }
}
