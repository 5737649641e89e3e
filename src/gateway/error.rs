//! Error types for the generation gateway.

use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error status (e.g. "INVALID_ARGUMENT").
    pub provider_code: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }
}

/// Errors that can occur when calling the generation provider.
///
/// There is no retryable/permanent split here: the lifecycle never retries a
/// call on its own, the user resubmits instead.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid request - rejected before or by the provider.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Provider rejected the credentials.
    #[error("authentication rejected: {message}")]
    AuthRejected {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Provider accepted the call but returned no usable text.
    #[error("no usable output: {message}")]
    EmptyOutput { message: String },

    /// Provider-side failure.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn auth_rejected(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::AuthRejected {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn empty_output(message: impl Into<String>) -> Self {
        Self::EmptyOutput {
            message: message.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this failure is a credential problem rather than a generation
    /// problem. The lifecycle classifies these differently for the user.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRejected { .. } | Self::Config(_))
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AuthRejected { .. } => "auth_rejected",
            Self::EmptyOutput { .. } => "empty_output",
            Self::Provider { .. } => "provider_error",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::AuthRejected { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::EmptyOutput { .. } | Self::Http(_) | Self::Config(_) => None,
        }
    }
}
