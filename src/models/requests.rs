//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::cache::{CacheEntryOptions, CacheItemPriority};
use crate::error::{CacheError, Result};

/// Maximum accepted key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
///
/// Expiration fields follow the entry option rules: the two absolute forms are
/// mutually exclusive and durations must be positive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: String,
    /// Fixed expiration instant (RFC 3339)
    #[serde(default)]
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Expiration relative to the write, in seconds
    #[serde(default)]
    pub absolute_expiration_relative_secs: Option<i64>,
    /// Idle timeout in seconds
    #[serde(default)]
    pub sliding_secs: Option<i64>,
    #[serde(default)]
    pub priority: Option<CacheItemPriority>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }

    /// Builds entry options, falling back to `default_sliding` when the
    /// request sets no expiration at all.
    pub fn to_options(&self, default_sliding: Option<Duration>) -> Result<CacheEntryOptions<String>> {
        let mut options = CacheEntryOptions::new();
        if let Some(at) = self.absolute_expiration {
            options = options.set_absolute_expiration(at)?;
        }
        if let Some(secs) = self.absolute_expiration_relative_secs {
            let relative = seconds("absolute_expiration_relative_to_now", secs)?;
            options = options.set_absolute_expiration_relative_to_now(relative)?;
        }
        let sliding = match self.sliding_secs {
            Some(secs) => Some(seconds("sliding_expiration", secs)?),
            None if !self.has_absolute_expiration() => default_sliding,
            None => None,
        };
        if let Some(sliding) = sliding {
            options = options.set_sliding_expiration(sliding)?;
        }
        if let Some(priority) = self.priority {
            options = options.set_priority(priority);
        }
        Ok(options)
    }

    fn has_absolute_expiration(&self) -> bool {
        self.absolute_expiration.is_some() || self.absolute_expiration_relative_secs.is_some()
    }
}

fn seconds(field: &'static str, secs: i64) -> Result<Duration> {
    Duration::try_seconds(secs).ok_or_else(|| {
        CacheError::invalid_option(field, format!("{}s", secs), "the duration is out of range")
    })
}
