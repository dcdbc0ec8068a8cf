//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheEntryOptions, CacheItemPriority, CacheStats};

/// Body of a cache hit (GET /get/:key).
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Body returned once an entry is stored (PUT /set).
///
/// Echoes the retention policy the entry was stored with.
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
    pub priority: CacheItemPriority,
    /// Idle window in seconds, if the entry slides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sliding_secs: Option<i64>,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, options: &CacheEntryOptions<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' stored", key),
            key,
            priority: options.priority(),
            sliding_secs: options
                .expiration()
                .sliding_expiration()
                .map(|sliding| sliding.num_seconds()),
        }
    }
}

/// Body returned by DELETE /del/:key. Sent whether or not the key existed.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' evicted", key),
            key,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Evictions across all reasons
    pub evictions: u64,
    pub removed: u64,
    pub replaced: u64,
    pub expired: u64,
    pub token_expired: u64,
    pub capacity: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions(),
            removed: stats.removed,
            replaced: stats.replaced,
            expired: stats.expired,
            token_expired: stats.token_expired,
            capacity: stats.capacity,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
