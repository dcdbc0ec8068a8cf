//! Redis-backed distributed cache.
//!
//! Each key maps to a hash with three fields:
//! - `absexp`: absolute expiration as 100ns ticks since 0001-01-01 UTC, `-1` when unset
//! - `sldexp`: sliding expiration as ticks, `-1` when unset
//! - `data`: the payload
//!
//! The key's physical TTL tracks `min(absolute - now, sliding)` and is renewed
//! on every read when a sliding expiration is configured.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::MultiplexedConnection;
use redis::Script;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::clock::{SystemClock, UtcClock};
use crate::distributed::{DistributedCache, DistributedCacheEntryOptions};
use crate::error::{CacheError, Result};

// KEYS[1] = key
// ARGV[1] = absolute expiration ticks, ARGV[2] = sliding ticks, ARGV[3] = ttl in ms (-1 for none), ARGV[4] = data
const SET_SCRIPT: &str = r"
redis.call('HSET', KEYS[1], 'absexp', ARGV[1], 'sldexp', ARGV[2], 'data', ARGV[4])
if ARGV[3] ~= '-1' then
  redis.call('PEXPIRE', KEYS[1], ARGV[3])
else
  redis.call('PERSIST', KEYS[1])
end
return 1";

const ABSOLUTE_EXPIRATION_FIELD: &str = "absexp";
const SLIDING_EXPIRATION_FIELD: &str = "sldexp";
const DATA_FIELD: &str = "data";
const NOT_PRESENT: i64 = -1;

/// Ticks between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_MICROSECOND: i64 = 10;

// == Options ==
/// Configuration for [`RedisCache`].
#[derive(Debug, Clone)]
pub struct RedisCacheOptions {
    /// Redis connection URL, e.g. `redis://localhost:6379`
    pub configuration: String,
    /// Prefix prepended to every key so several caches can share one server
    pub instance_name: String,
    pub clock: Arc<dyn SystemClock>,
}

impl RedisCacheOptions {
    pub fn new(configuration: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
            instance_name: String::new(),
            clock: Arc::new(UtcClock),
        }
    }

    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn SystemClock>) -> Self {
        self.clock = clock;
        self
    }
}

// == Redis Cache ==
/// Distributed cache over a Redis server. Connects lazily on first use.
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    instance_name: String,
    clock: Arc<dyn SystemClock>,
    set_script: Script,
}

impl RedisCache {
    /// Validates the connection URL. No network traffic happens until the first operation.
    pub fn new(options: RedisCacheOptions) -> Result<Self> {
        let client = redis::Client::open(options.configuration.as_str()).map_err(|e| {
            CacheError::Connection(format!("invalid redis configuration: {}", e))
        })?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            instance_name: options.instance_name,
            clock: options.clock,
            set_script: Script::new(SET_SCRIPT),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.instance_name, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.connection
            .get_or_try_init(|| async {
                let connection = self
                    .client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| {
                        CacheError::Connection(format!("failed to connect to redis: {}", e))
                    })?;
                info!("connected to redis");
                Ok::<_, CacheError>(connection)
            })
            .await
            .cloned()
    }

    /// Reads the expiration metadata (and the payload if `with_data`), then
    /// renews the TTL when a sliding expiration is stored.
    async fn get_and_refresh(&self, key: &str, with_data: bool) -> Result<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("HMGET");
        cmd.arg(&full_key)
            .arg(ABSOLUTE_EXPIRATION_FIELD)
            .arg(SLIDING_EXPIRATION_FIELD);
        if with_data {
            cmd.arg(DATA_FIELD);
        }
        let mut fields: Vec<Option<Vec<u8>>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("hmget", key, e))?;

        let data = if with_data && fields.len() > 2 {
            fields.pop().flatten()
        } else {
            None
        };
        let absolute = fields
            .first()
            .and_then(|f| f.as_deref())
            .and_then(parse_absolute);
        let sliding = fields
            .get(1)
            .and_then(|f| f.as_deref())
            .and_then(parse_sliding);

        if let Some(ttl_ms) = refresh_ms(self.clock.utc_now(), absolute, sliding) {
            let _: () = redis::cmd("PEXPIRE")
                .arg(&full_key)
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::backend("pexpire", key, e))?;
            debug!(key, ttl_ms, "sliding expiration renewed");
        }

        Ok(data)
    }
}

impl Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("instance_name", &self.instance_name)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_and_refresh(key, true).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &DistributedCacheEntryOptions,
    ) -> Result<()> {
        let now = self.clock.utc_now();
        let absolute = options.expiration().resolve_absolute(now)?;
        let sliding = options.expiration().sliding_expiration();
        let ttl_ms = expiration_ms(now, absolute, sliding);

        let mut conn = self.connection().await?;
        let mut invocation = self.set_script.prepare_invoke();
        invocation
            .key(self.full_key(key))
            .arg(absolute.map_or(NOT_PRESENT, instant_to_ticks))
            .arg(sliding.map_or(NOT_PRESENT, duration_to_ticks))
            .arg(ttl_ms.unwrap_or(NOT_PRESENT))
            .arg(value);
        let _: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("set", key, e))?;

        debug!(key, ?ttl_ms, "entry written");
        Ok(())
    }

    async fn refresh(&self, key: &str) -> Result<()> {
        self.get_and_refresh(key, false).await.map(|_| ())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("del", key, e))?;
        Ok(())
    }
}

// == Tick Conversion ==
fn instant_to_ticks(at: DateTime<Utc>) -> i64 {
    UNIX_EPOCH_TICKS + at.timestamp_micros() * TICKS_PER_MICROSECOND
}

fn ticks_to_instant(ticks: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros((ticks - UNIX_EPOCH_TICKS) / TICKS_PER_MICROSECOND)
}

fn duration_to_ticks(duration: Duration) -> i64 {
    duration
        .num_microseconds()
        .map_or(i64::MAX, |us| us.saturating_mul(TICKS_PER_MICROSECOND))
}

fn ticks_to_duration(ticks: i64) -> Duration {
    Duration::microseconds(ticks / TICKS_PER_MICROSECOND)
}

fn parse_ticks(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw)
        .ok()?
        .parse::<i64>()
        .ok()
        .filter(|ticks| *ticks != NOT_PRESENT)
}

fn parse_absolute(raw: &[u8]) -> Option<DateTime<Utc>> {
    parse_ticks(raw).and_then(ticks_to_instant)
}

fn parse_sliding(raw: &[u8]) -> Option<Duration> {
    parse_ticks(raw).map(ticks_to_duration)
}

// == TTL Computation ==
/// Physical TTL applied on write: the earlier of the absolute deadline and the
/// sliding window. `None` when neither is set.
fn expiration_ms(
    now: DateTime<Utc>,
    absolute: Option<DateTime<Utc>>,
    sliding: Option<Duration>,
) -> Option<i64> {
    let remaining = absolute.map(|at| at - now);
    let ttl = match (remaining, sliding) {
        (Some(remaining), Some(sliding)) => Some(remaining.min(sliding)),
        (remaining, None) => remaining,
        (None, sliding) => sliding,
    };
    ttl.map(|d| d.num_milliseconds().max(1))
}

/// TTL reapplied on read. Only entries with a sliding expiration are renewed.
fn refresh_ms(
    now: DateTime<Utc>,
    absolute: Option<DateTime<Utc>>,
    sliding: Option<Duration>,
) -> Option<i64> {
    sliding?;
    expiration_ms(now, absolute, sliding)
}
