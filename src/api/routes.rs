//! API Routes
//!
//! Axum router for the cache's HTTP demo surface.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, set_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - store a value with expiration and priority options
/// - `GET /get/:key` - read a value, renewing its sliding window
/// - `DELETE /del/:key` - evict a key (idempotent)
/// - `GET /stats` - hit, miss and per-reason eviction counters
/// - `GET /health` - liveness probe
///
/// Requests are traced through `tower_http`; CORS is open.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
