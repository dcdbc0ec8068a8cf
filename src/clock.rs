//! Clock Module
//!
//! Abstracts "now" so expiration logic can be driven by a manual clock in tests.

use std::fmt::Debug;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

// == System Clock ==
/// Source of the current UTC instant.
pub trait SystemClock: Debug + Send + Sync {
    /// Returns the current instant.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `chrono::Utc::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtcClock;

impl SystemClock for UtcClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// == Test Clock ==
/// Manually advanced clock.
///
/// Starts at a fixed instant and only moves when [`TestClock::add`] is called,
/// which makes expiration scenarios deterministic.
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    /// Creates a clock pinned at 2013-06-15 12:34:56 UTC.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2013, 6, 15, 12, 34, 56)
            .single()
            .unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }

    /// Creates a clock pinned at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward (or backward for a negative duration).
    pub fn add(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock for TestClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
