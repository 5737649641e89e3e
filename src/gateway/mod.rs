//! Provider gateway for Gemini text generation.

pub mod error;
pub mod gemini;
pub mod types;
pub mod usage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gemini::{GeminiAdapter, GenerateProvider};
use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

/// The seam the lifecycle controller talks through. One call per request,
/// no retries: a failed generation is reported once and the user resubmits.
#[async_trait::async_trait]
pub trait GenerateGateway: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

/// Gateway that wraps the Gemini adapter and records every call through a
/// [`UsageSink`].
pub struct ProviderGateway<U: UsageSinkTrait> {
    adapter: Arc<GeminiAdapter>,
    usage_sink: Arc<U>,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> GenerateGateway for ProviderGateway<U> {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        ProviderGateway::generate(self, req).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn new(adapter: Arc<GeminiAdapter>, usage_sink: Arc<U>) -> Self {
        Self {
            adapter,
            usage_sink,
        }
    }

    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let adapter = GeminiAdapter::from_env()?;
        Ok(Self::new(Arc::new(adapter), usage_sink))
    }

    pub async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let result = self.adapter.generate(&req).await;
        match &result {
            Ok(resp) => {
                let record = ProviderCallRecord::new(
                    "gemini",
                    "generateContent",
                    &req.model,
                    req.attribution.caller,
                )
                .tokens(resp.input_tokens as i32, resp.output_tokens as i32)
                .session(req.attribution.session_id)
                .latency(resp.latency.as_millis() as i32);
                self.usage_sink.record(record).await;
            }
            Err(err) => {
                let record = ProviderCallRecord::new(
                    "gemini",
                    "generateContent",
                    &req.model,
                    req.attribution.caller,
                )
                .session(req.attribution.session_id)
                .error(err.code());
                self.usage_sink.record(record).await;
            }
        }
        result
    }
}

/// Explicitly constructed client factory with its own cache.
///
/// One adapter per credential; the adapter itself keeps a connection pool, so
/// reusing it avoids reconnect/auth overhead on every call. Only client
/// handles are cached here, never responses.
pub struct GeminiClientFactory {
    base_url: String,
    timeout: Duration,
    cache: Mutex<HashMap<String, Arc<GeminiAdapter>>>,
}

impl GeminiClientFactory {
    pub fn new() -> Self {
        Self::with_base_url("https://generativelanguage.googleapis.com/v1beta")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get or create an adapter for the given credential.
    pub fn client(&self, api_key: &str) -> Result<Arc<GeminiAdapter>, ProviderError> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = cache.get(api_key) {
            return Ok(existing.clone());
        }
        let adapter = Arc::new(GeminiAdapter::with_config(
            api_key,
            self.base_url.clone(),
            self.timeout,
        )?);
        cache.insert(api_key.to_string(), adapter.clone());
        Ok(adapter)
    }
}

impl Default for GeminiClientFactory {
    fn default() -> Self {
        Self::new()
    }
}
