//! Request and Response models for the cache server API
//!
//! DTOs serialized to and from HTTP bodies. The cache itself never sees them:
//! handlers convert a `SetRequest` into `CacheEntryOptions` first.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{SetRequest, MAX_KEY_LENGTH};
pub use responses::{
    DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetResponse, StatsResponse,
};
