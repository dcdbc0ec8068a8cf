//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the memory cache, the distributed backends and the HTTP surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// An entry option was given an illegal value
    #[error("invalid value '{value}' for '{field}': {reason}")]
    InvalidOption {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Both absolute expiration forms were configured
    #[error("cannot set both '{field}' and '{other}' for absolute expiration time")]
    ConflictingOption {
        field: &'static str,
        other: &'static str,
    },

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Connection to a remote store could not be established
    #[error("connection failed: {0}")]
    Connection(String),

    /// A remote store command failed
    #[error("[{operation}] backend error for key '{key}': {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Creates an [`CacheError::InvalidOption`] error.
    pub fn invalid_option(
        field: &'static str,
        value: impl ToString,
        reason: &'static str,
    ) -> Self {
        CacheError::InvalidOption {
            field,
            value: value.to_string(),
            reason,
        }
    }

    /// Creates a [`CacheError::Backend`] error.
    pub fn backend(operation: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        CacheError::Backend {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// True for errors raised while validating entry options.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidOption { .. } | CacheError::ConflictingOption { .. }
        )
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidOption { .. }
            | CacheError::ConflictingOption { .. }
            | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Connection(_) | CacheError::Backend { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
