//! Service-account credential loading and token exchange.
//!
//! The vendor flow, implemented narrowly: parse the service-account JSON from
//! the environment, sign an RS256 JWT assertion, and trade it for a
//! short-lived access token. Tokens are reused until close to expiry.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::error::WarehouseError;

/// Scope for read-only query access.
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Default OAuth token endpoint, overridable per key file.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh when less than this much lifetime remains.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Parsed service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse the key from a JSON string (the value of the credentials env var).
    pub fn from_json(json: &str) -> Result<Self, WarehouseError> {
        serde_json::from_str(json)
            .map_err(|e| WarehouseError::auth(format!("invalid credentials JSON: {e}")))
    }

    /// Load from the `GOOGLE_BIGQUERY_CREDENTIALS` environment variable.
    pub fn from_env() -> Result<Self, WarehouseError> {
        let raw = std::env::var("GOOGLE_BIGQUERY_CREDENTIALS")
            .map_err(|_| WarehouseError::config("GOOGLE_BIGQUERY_CREDENTIALS not set"))?;
        Self::from_json(&raw)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

/// Source of bearer tokens for warehouse requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, WarehouseError>;
}

/// A fixed, pre-issued token. Used in tests and when the environment already
/// provides a token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, WarehouseError> {
        Ok(self.0.clone())
    }
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges service-account assertions for access tokens, caching the token
/// until close to expiry.
pub struct ServiceAccountTokens {
    key: ServiceAccountKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey) -> Result<Self, WarehouseError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WarehouseError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().and_then(|c| {
            let remaining = (c.expires_at - Utc::now()).num_seconds();
            (remaining > EXPIRY_MARGIN_SECS).then(|| c.token.clone())
        })
    }

    fn store_token(&self, token: String, expires_in: i64) {
        let mut guard = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(CachedToken {
            token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        });
    }

    fn signed_assertion(&self) -> Result<String, WarehouseError> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: BIGQUERY_SCOPE,
            aud: self.key.token_uri(),
            iat: now,
            exp: now + 3600,
        };
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| WarehouseError::auth(format!("invalid private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| WarehouseError::auth(format!("failed to sign assertion: {e}")))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, WarehouseError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let assertion = self.signed_assertion()?;
        let response = self
            .http
            .post(self.key.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| WarehouseError::decode(format!("token response: {e}")))?;

        if !status.is_success() {
            let detail = parsed
                .error_description
                .or(parsed.error)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(WarehouseError::auth(format!("token exchange: {detail}")));
        }

        let token = parsed
            .access_token
            .ok_or_else(|| WarehouseError::decode("token response missing access_token"))?;
        let expires_in = parsed.expires_in.unwrap_or(3600);
        self.store_token(token.clone(), expires_in);
        Ok(token)
    }
}
