//! API Module
//!
//! HTTP handlers and routing for the demo cache server.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair with expiration options
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
