//! Configuration surface: environment variables and prompt-context files.

use std::path::PathBuf;
use std::time::Duration;

/// Plain configuration values with no logic attached. All overridable from
/// the environment; `.env` loading is the binary's job (dotenvy), not ours.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key for the generation provider (`GOOGLE_LLM_API_KEY`).
    pub llm_api_key: Option<String>,
    /// Raw service-account JSON for the warehouse
    /// (`GOOGLE_BIGQUERY_CREDENTIALS`).
    pub warehouse_credentials: Option<String>,
    /// Model used for SQL generation.
    pub generation_model: String,
    /// Model used for answer summaries.
    pub summary_model: String,
    /// Dataset the prompt instructs the model to target.
    pub dataset: String,
    /// Maximum rows to return (safety limit).
    pub max_results: u32,
    /// Seconds before a query times out.
    pub query_timeout: Duration,
    /// How many stored examples are included in a generation prompt.
    pub max_prompt_examples: usize,
    /// Database schema description file.
    pub schema_path: PathBuf,
    /// Few-shot example file.
    pub fewshot_path: PathBuf,
    /// Directory CSV exports land in.
    pub export_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            llm_api_key: std::env::var("GOOGLE_LLM_API_KEY").ok(),
            warehouse_credentials: std::env::var("GOOGLE_BIGQUERY_CREDENTIALS").ok(),
            generation_model: env_or("CHAINQUERY_GENERATION_MODEL", "gemini-2.5-flash-lite"),
            summary_model: env_or("CHAINQUERY_SUMMARY_MODEL", "gemini-2.5-flash"),
            dataset: env_or(
                "CHAINQUERY_DATASET",
                "bigquery-public-data.goog_blockchain_ethereum_mainnet_us",
            ),
            max_results: env_parse("CHAINQUERY_MAX_RESULTS", 1000),
            query_timeout: Duration::from_secs(env_parse("CHAINQUERY_QUERY_TIMEOUT_SECONDS", 60)),
            max_prompt_examples: env_parse("CHAINQUERY_MAX_PROMPT_EXAMPLES", 20),
            schema_path: PathBuf::from(env_or(
                "CHAINQUERY_SCHEMA_PATH",
                "data/prompt/eth_mainnet_db_schema.yaml",
            )),
            fewshot_path: crate::fewshot::FewshotStore::default_path(),
            export_dir: PathBuf::from(env_or(
                "CHAINQUERY_EXPORT_DIR",
                "data/sql_query_results",
            )),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Prompt-context data loaded once per process and reused for every
/// generation. Reloading per request would be wasteful, not incorrect.
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Raw schema description text, passed into the prompt verbatim.
    pub schema: String,
    /// Fully-qualified dataset the prompt instructs the model to target.
    pub dataset: String,
}

impl PromptContext {
    pub fn load(path: &std::path::Path, dataset: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            schema: std::fs::read_to_string(path)?,
            dataset: dataset.into(),
        })
    }

    pub fn new(schema: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            dataset: dataset.into(),
        }
    }

    /// Context with the default public dataset; handy in tests.
    pub fn from_schema(schema: impl Into<String>) -> Self {
        Self::new(
            schema,
            "bigquery-public-data.goog_blockchain_ethereum_mainnet_us",
        )
    }
}
