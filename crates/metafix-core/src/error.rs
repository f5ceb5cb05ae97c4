//! Error types for metafix.
//!
//! Transport and data errors are produced at the smallest scope possible and
//! are usually converted into a per-record outcome by the caller. Only the
//! session bootstrap (configuration, client construction) lets them escape.

use crate::state::RowState;
use thiserror::Error;

/// Main error type for the metafix engine.
#[derive(Debug, Error)]
pub enum MetafixError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{method} {url} returned {status}: {body}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Working set errors
    #[error("Record {id} not found in {collection}")]
    RecordNotFound { collection: String, id: String },

    #[error("Repair of {id} not permitted while row is {state}")]
    RepairNotPermitted { id: String, state: RowState },

    #[error("Invalid row transition from {from}: {event}")]
    InvalidTransition { from: RowState, event: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for metafix operations.
pub type Result<T> = std::result::Result<T, MetafixError>;

impl From<serde_json::Error> for MetafixError {
    fn from(err: serde_json::Error) -> Self {
        MetafixError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for MetafixError {
    fn from(err: url::ParseError) -> Self {
        MetafixError::Config {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl MetafixError {
    /// Create a network error without an underlying reqwest cause.
    pub fn network(message: impl Into<String>) -> Self {
        MetafixError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            MetafixError::Network { .. } | MetafixError::Timeout(_) => true,
            MetafixError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Check if this error is a broken caller contract rather than a runtime failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MetafixError::RepairNotPermitted { .. } | MetafixError::InvalidTransition { .. }
        )
    }
}
