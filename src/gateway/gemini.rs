//! Gemini adapter for text generation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for text generation providers.
#[async_trait]
pub trait GenerateProvider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

// =============================================================================
// GEMINI ADAPTER
// =============================================================================

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
const MAX_INPUT_CHARS: usize = 500_000;

/// Google Generative Language API adapter.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    /// Create from API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(
            api_key,
            "https://generativelanguage.googleapis.com/v1beta",
            Duration::from_secs(120),
        )
    }

    /// Create from environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("GOOGLE_LLM_API_KEY")
            .map_err(|_| ProviderError::config("GOOGLE_LLM_API_KEY not set"))?;

        let base_url = std::env::var("GOOGLE_LLM_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());

        let timeout = std::env::var("GOOGLE_LLM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self::with_config(api_key, base_url, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(&api_key)
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert("x-goog-api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent<'a>>,
    contents: Vec<ApiTurn<'a>>,
    generation_config: ApiGenerationConfig,
}

#[derive(Serialize)]
struct ApiContent<'a> {
    parts: Vec<ApiPart<'a>>,
}

#[derive(Serialize)]
struct ApiTurn<'a> {
    role: &'static str,
    parts: Vec<ApiPart<'a>>,
}

#[derive(Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateApiResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

// =============================================================================
// GENERATE PROVIDER IMPL
// =============================================================================

#[async_trait]
impl GenerateProvider for GeminiAdapter {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        // Validate input size
        let total_chars =
            req.prompt.len() + req.system.as_ref().map(|s| s.len()).unwrap_or_default();
        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let start = Instant::now();

        let api_req = GenerateApiRequest {
            system_instruction: req.system.as_deref().map(|text| ApiContent {
                parts: vec![ApiPart { text }],
            }),
            contents: vec![ApiTurn {
                role: "user",
                parts: vec![ApiPart { text: &req.prompt }],
            }],
            generation_config: ApiGenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_output_tokens,
            },
        };

        let mut response = self
            .client
            .post(self.generate_url(&req.model))
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::provider(
                    "gemini",
                    format!("Response too large: {new_len} bytes"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();
        let ctx = ErrorContext::new().with_status(status.as_u16());

        if !status.is_success() {
            // Try to parse the structured error envelope
            if let Ok(parsed) = serde_json::from_str::<GenerateApiResponse>(&body) {
                if let Some(error) = parsed.error {
                    let message = error.message.unwrap_or_default();
                    let ctx = if let Some(code) = error.status {
                        ctx.with_code(&code)
                    } else {
                        ctx
                    };

                    return Err(match status.as_u16() {
                        401 | 403 => ProviderError::auth_rejected(message, ctx),
                        _ => ProviderError::provider_with_context("gemini", message, ctx),
                    });
                }
            }

            return Err(match status.as_u16() {
                401 | 403 => {
                    ProviderError::auth_rejected(format!("HTTP {}", status.as_u16()), ctx)
                }
                _ => ProviderError::provider_with_context(
                    "gemini",
                    format!("HTTP {}", status.as_u16()),
                    ctx,
                ),
            });
        }

        let parsed: GenerateApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider("gemini", format!("Invalid JSON: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::provider(
                "gemini",
                error.message.unwrap_or_default(),
            ));
        }

        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::empty_output("no candidates in response"))?;

        let finish_reason = FinishReason::from(candidate.finish_reason.clone());

        let text: String = candidate
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::empty_output(format!(
                "candidate had no text (finish reason {finish_reason:?})"
            )));
        }

        let usage = parsed.usage_metadata;
        let input_tokens = usage
            .as_ref()
            .and_then(|u| u.prompt_token_count)
            .unwrap_or(0);
        let output_tokens = usage
            .as_ref()
            .and_then(|u| u.candidates_token_count)
            .unwrap_or(0);

        Ok(GenerateResponse {
            text,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason,
        })
    }
}
