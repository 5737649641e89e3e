//! Durable store of accepted query examples.
//!
//! A JSON file holding an ordered array of examples, used both as few-shot
//! context for future generations and as an audit trail of accepted queries.
//! Append-only: entries are never mutated, deleted, reordered, or compacted.
//! Names are unique; a second write under an existing name is silently
//! dropped, so the first accepted answer for a question stays canonical.
//!
//! Writes rewrite the whole file atomically (temp file + rename) under an
//! advisory lock. The deployment assumption is a single writer; the lock
//! keeps an accidental second process from interleaving the rewrite, nothing
//! more.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::session::TabularResult;

/// How many result rows are kept in an example's preview.
pub const PREVIEW_ROWS: usize = 5;

/// Truncated sample of the result a query produced, stored alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub notes: String,
}

/// A persisted (question, SQL, sample result) triple. The name is the
/// natural-language query that produced it and is the store's unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(rename = "query_name")]
    pub name: String,
    #[serde(rename = "query_sql")]
    pub sql: String,
    #[serde(rename = "expected_result")]
    pub preview: ResultPreview,
}

impl Example {
    /// Build an example from an executed query and its result, truncating the
    /// preview to [`PREVIEW_ROWS`] rows.
    pub fn from_result(
        name: impl Into<String>,
        sql: impl Into<String>,
        result: &TabularResult,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            preview: ResultPreview {
                columns: result.columns().to_vec(),
                rows: result.first_rows(PREVIEW_ROWS),
                notes: notes.into(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid example file: {0}")]
    Format(String),
}

/// File-backed example collection.
pub struct FewshotStore {
    path: PathBuf,
}

impl FewshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("CHAINQUERY_FEWSHOT_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from("data/prompt/eth_mainnet_sql_fewshots.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full collection in insertion order.
    ///
    /// A missing file is an empty store (fresh install). A file that exists
    /// but cannot be read or parsed is an error - callers decide whether to
    /// degrade or propagate.
    pub fn load(&self) -> Result<Vec<Example>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Format(e.to_string()))
    }

    /// Append an example unless one with the same name already exists.
    /// Returns whether an insert happened. The first write under a name wins;
    /// later attempts are dropped, not merged.
    pub fn add_example(&self, example: Example) -> Result<bool, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = self.path.with_extension("json.lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;
        // Lock releases when lock_file drops at the end of this scope.

        let mut examples = self.load()?;
        if examples.iter().any(|e| e.name == example.name) {
            tracing::info!(name = %example.name, "example already stored, skipping");
            return Ok(false);
        }
        examples.push(example);

        let serialized = serde_json::to_string_pretty(&examples)
            .map_err(|e| StoreError::Format(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn example(name: &str, sql: &str) -> Example {
        Example {
            name: name.into(),
            sql: sql.into(),
            preview: ResultPreview {
                columns: vec!["c".into()],
                rows: vec![vec!["1".into()]],
                notes: String::new(),
            },
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FewshotStore::new(dir.path().join("fewshots.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn file_format_matches_wire_keys() {
        let serialized = serde_json::to_value(example("q", "SELECT 1")).expect("serialize");
        assert!(serialized.get("query_name").is_some());
        assert!(serialized.get("query_sql").is_some());
        assert!(serialized
            .get("expected_result")
            .and_then(|r| r.get("columns"))
            .is_some());
    }

    #[test]
    fn preview_truncates_to_five_rows() {
        let rows: Vec<Vec<String>> = (0..8).map(|i| vec![i.to_string()]).collect();
        let result = TabularResult::new(vec!["n".into()], rows).expect("result");
        let ex = Example::from_result("q", "SELECT 1", &result, "notes");
        assert_eq!(ex.preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(ex.preview.rows[0], vec!["0".to_string()]);
    }
}
