//! Expiration Settings Module
//!
//! Absolute / relative / sliding expiration shared by the memory and distributed caches.
//! Every setter validates immediately; nothing is clamped.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CacheError, Result};

const ABSOLUTE: &str = "absolute_expiration";
const RELATIVE: &str = "absolute_expiration_relative_to_now";
const SLIDING: &str = "sliding_expiration";

// == Expiration Settings ==
/// Validated expiration policy for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationSettings {
    absolute_expiration: Option<DateTime<Utc>>,
    absolute_expiration_relative_to_now: Option<Duration>,
    sliding_expiration: Option<Duration>,
}

impl ExpirationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a fixed deadline. Fails if a relative absolute expiration is already set.
    pub fn set_absolute_expiration(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.absolute_expiration_relative_to_now.is_some() {
            return Err(CacheError::ConflictingOption {
                field: ABSOLUTE,
                other: RELATIVE,
            });
        }
        self.absolute_expiration = Some(at);
        Ok(())
    }

    /// Sets a deadline relative to the moment the entry is stored.
    pub fn set_absolute_expiration_relative_to_now(&mut self, relative: Duration) -> Result<()> {
        if self.absolute_expiration.is_some() {
            return Err(CacheError::ConflictingOption {
                field: RELATIVE,
                other: ABSOLUTE,
            });
        }
        if relative <= Duration::zero() {
            return Err(CacheError::invalid_option(
                RELATIVE,
                format_duration(relative),
                "the relative expiration value must be positive",
            ));
        }
        self.absolute_expiration_relative_to_now = Some(relative);
        Ok(())
    }

    /// Sets the idle timeout.
    pub fn set_sliding_expiration(&mut self, sliding: Duration) -> Result<()> {
        if sliding <= Duration::zero() {
            return Err(CacheError::invalid_option(
                SLIDING,
                format_duration(sliding),
                "the sliding expiration value must be positive",
            ));
        }
        self.sliding_expiration = Some(sliding);
        Ok(())
    }

    pub fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.absolute_expiration
    }

    pub fn absolute_expiration_relative_to_now(&self) -> Option<Duration> {
        self.absolute_expiration_relative_to_now
    }

    pub fn sliding_expiration(&self) -> Option<Duration> {
        self.sliding_expiration
    }

    /// Resolves the absolute deadline against `now`.
    ///
    /// A fixed deadline that is not in the future is rejected.
    pub fn resolve_absolute(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        if let Some(relative) = self.absolute_expiration_relative_to_now {
            return now.checked_add_signed(relative).map(Some).ok_or_else(|| {
                CacheError::invalid_option(
                    RELATIVE,
                    format_duration(relative),
                    "the relative expiration value is out of range",
                )
            });
        }
        match self.absolute_expiration {
            Some(at) if at <= now => Err(CacheError::invalid_option(
                ABSOLUTE,
                at.to_rfc3339(),
                "the absolute expiration value must be in the future",
            )),
            other => Ok(other),
        }
    }
}

/// Renders a duration the way error messages print it, e.g. `-60s`, `1.5s` or `-5µs`.
pub(crate) fn format_duration(duration: Duration) -> String {
    if let Some(micros) = duration.num_microseconds() {
        if micros % 1000 != 0 {
            return format!("{}µs", micros);
        }
    }
    let millis = duration.num_milliseconds();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}s", millis as f64 / 1000.0)
    }
}
