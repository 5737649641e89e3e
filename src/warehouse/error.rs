//! Error types for the warehouse executor.

use thiserror::Error;

/// Errors that can occur when executing SQL against the warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Credentials missing, malformed, or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The warehouse rejected or failed the SQL.
    #[error("query failed: {message}")]
    Query {
        message: String,
        http_status: Option<u16>,
    },

    /// The warehouse answered with something we could not decode.
    #[error("bad response: {0}")]
    Decode(String),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing credentials env, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl WarehouseError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            http_status: None,
        }
    }

    pub fn query_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Query {
            message: message.into(),
            http_status: Some(status),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this failure is a credential problem rather than a SQL problem.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_failed",
            Self::Query { .. } => "query_failed",
            Self::Decode(_) => "bad_response",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }
}
