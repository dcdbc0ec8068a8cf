//! Configuration Module
//!
//! Handles loading server configuration from environment variables.

use std::env;
use std::str::FromStr;

use chrono::Duration;

use crate::cache::MemoryCacheOptions;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Entry count above which the cache compacts (0 disables the limit)
    pub size_limit: usize,
    /// Compact automatically when the size limit is exceeded
    pub compact_on_pressure: bool,
    /// Minimum seconds between opportunistic expiration sweeps
    pub scan_interval: u64,
    /// Background sweep task interval in seconds
    pub cleanup_interval: u64,
    /// Sliding expiration in seconds for HTTP writes that set no expiration (0 means none)
    pub default_sliding: u64,
    /// HTTP server port
    pub server_port: u16,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Seconds from the environment as a duration; `None` when out of range.
fn secs_to_duration(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SIZE_LIMIT` - Maximum cache entries before compaction (default: 10000)
    /// - `COMPACT_ON_PRESSURE` - Enable pressure compaction (default: true)
    /// - `SCAN_INTERVAL` - Seconds between opportunistic sweeps (default: 60)
    /// - `CLEANUP_INTERVAL` - Background sweep frequency in seconds (default: 30)
    /// - `DEFAULT_SLIDING` - Default sliding expiration in seconds (default: 0, none)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            size_limit: env_or("SIZE_LIMIT", defaults.size_limit),
            compact_on_pressure: env_or("COMPACT_ON_PRESSURE", defaults.compact_on_pressure),
            scan_interval: env_or("SCAN_INTERVAL", defaults.scan_interval),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            default_sliding: env_or("DEFAULT_SLIDING", defaults.default_sliding),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Store options derived from this configuration.
    pub fn cache_options(&self) -> MemoryCacheOptions {
        MemoryCacheOptions {
            compact_on_memory_pressure: self.compact_on_pressure,
            size_limit: (self.size_limit > 0).then_some(self.size_limit),
            expiration_scan_frequency: secs_to_duration(self.scan_interval).unwrap_or(Duration::MAX),
            ..MemoryCacheOptions::default()
        }
    }

    /// Default sliding window for HTTP writes, if configured.
    pub fn default_sliding_expiration(&self) -> Option<Duration> {
        if self.default_sliding == 0 {
            return None;
        }
        secs_to_duration(self.default_sliding)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size_limit: 10_000,
            compact_on_pressure: true,
            scan_interval: 60,
            cleanup_interval: 30,
            default_sliding: 0,
            server_port: 3000,
        }
    }
}
