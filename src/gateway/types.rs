//! Core types for the generation gateway.

use std::time::Duration;

use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for telemetry and debugging.
///
/// Every request through the gateway carries attribution so usage records say
/// which session and which code path triggered the call.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Session the request belongs to (if known).
    pub session_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "controller::generate_sql".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// =============================================================================
// GENERATION TYPES
// =============================================================================

/// Request for a single text generation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model identifier, e.g. "gemini-2.5-flash-lite".
    pub model: String,
    /// System instruction prepended to the turn.
    pub system: Option<String>,
    /// The user-turn prompt text.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_output_tokens: Option<u32>,
    /// Attribution for telemetry.
    pub attribution: Attribution,
}

impl GenerateRequest {
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        attribution: Attribution,
    ) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.5,
            max_output_tokens: None,
            attribution,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") => FinishReason::Safety,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from a generation request.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Generated text.
    pub text: String,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}
