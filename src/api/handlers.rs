//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Duration;
use tracing::debug;

use crate::cache::{MemoryCache, MemoryCacheOptions};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// `MemoryCache` is internally synchronized, so handlers share it without an outer lock.
#[derive(Clone)]
pub struct AppState {
    pub cache: MemoryCache<String>,
    /// Sliding window applied to writes that carry no expiration
    pub default_sliding: Option<Duration>,
}

impl AppState {
    /// Creates a new AppState around an existing cache.
    pub fn new(cache: MemoryCache<String>) -> Self {
        Self {
            cache,
            default_sliding: None,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache: MemoryCache::new(config.cache_options()),
            default_sliding: config.default_sliding_expiration(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(MemoryCache::new(MemoryCacheOptions::default()))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair with the expiration and priority given in the body.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let options = req.to_options(state.default_sliding)?;
    state.cache.set(req.key.clone(), req.value, &options)?;
    debug!(key = %req.key, "value stored over http");

    Ok(Json(SetResponse::new(req.key, &options)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .try_get(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
///
/// Removes a key. Deleting an absent key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    state.cache.remove(&key);
    Json(DeleteResponse::new(key))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
