//! Session data model and the query lifecycle states.
//!
//! The original interaction model re-derived "what step are we on" from which
//! optional fields happened to be populated. Here the step is a tagged state,
//! and the session's fields can only move through the transitions the
//! controller exposes, so stale data cannot leak across steps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Errors surfaced to the user
// =============================================================================

/// Classification of a failed step in the query lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials missing, malformed, or rejected by a service.
    AuthenticationFailure,
    /// The model call failed or returned unusable output.
    GenerationFailure,
    /// The warehouse rejected or failed the SQL.
    ExecutionFailure,
    /// Bad or empty input, caught before any external call.
    ValidationFailure,
    /// The example store was unreadable or unwritable.
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "authentication_failure",
            Self::GenerationFailure => "generation_failure",
            Self::ExecutionFailure => "execution_failure",
            Self::ValidationFailure => "validation_failure",
            Self::StorageFailure => "storage_failure",
        }
    }
}

/// The most recent failure, kept on the session so the presentation layer can
/// show it distinctly from the most recent success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailure, message)
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

// =============================================================================
// Tabular results
// =============================================================================

/// Rejected result shape: a row whose width differs from the column list,
/// or a duplicated column name.
#[derive(Debug, thiserror::Error)]
pub enum ResultShapeError {
    #[error("row {row} has {got} values, expected {expected}")]
    RowWidth {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Successful outcome of executing SQL. Immutable once produced; the next
/// execution replaces it wholesale.
///
/// Cell values are display strings, not typed values. The few-shot prompt that
/// eventually consumes them is textual, so the stringified form is the
/// canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TabularResult {
    /// Build a result, enforcing that every row matches the column list and
    /// column names are unique.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ResultShapeError> {
        for (i, a) in columns.iter().enumerate() {
            if columns[..i].iter().any(|b| b == a) {
                return Err(ResultShapeError::DuplicateColumn(a.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ResultShapeError::RowWidth {
                    row: i,
                    got: row.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows, cloned, for previews.
    pub fn first_rows(&self, n: usize) -> Vec<Vec<String>> {
        self.rows.iter().take(n).cloned().collect()
    }
}

// =============================================================================
// Lifecycle states
// =============================================================================

/// Where a session is in the intake → generation → execution flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No query submitted yet.
    Idle,
    /// A natural-language query was accepted; generation is in flight.
    AwaitingGeneration,
    /// The model call failed; the user may resubmit.
    GenerationFailed,
    /// SQL is generated and shown for review; execution is a separate
    /// explicit step so nothing is billed before the user approves.
    AwaitingExecution,
    /// The warehouse rejected or failed the SQL; the user may rerun or
    /// resubmit.
    ExecutionFailed,
    /// A result is available. Feedback and reruns are both allowed.
    Completed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingGeneration => "awaiting_generation",
            Self::GenerationFailed => "generation_failed",
            Self::AwaitingExecution => "awaiting_execution",
            Self::ExecutionFailed => "execution_failed",
            Self::Completed => "completed",
        }
    }

    /// Whether `run_query` is a legal transition from this state.
    pub fn can_execute(self) -> bool {
        matches!(
            self,
            Self::AwaitingExecution | Self::ExecutionFailed | Self::Completed
        )
    }
}

// =============================================================================
// Session
// =============================================================================

/// One user's interaction context. Created at session start; every field is
/// mutated only through the transition helpers below, which the controller
/// drives. Submitting a new natural-language query resets everything
/// downstream of it.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    natural_language_query: Option<String>,
    generated_sql: Option<String>,
    edited_sql: Option<String>,
    last_executed_sql: Option<String>,
    execution_result: Option<TabularResult>,
    error: Option<ErrorRecord>,
    feedback_given: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            natural_language_query: None,
            generated_sql: None,
            edited_sql: None,
            last_executed_sql: None,
            execution_result: None,
            error: None,
            feedback_given: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn natural_language_query(&self) -> Option<&str> {
        self.natural_language_query.as_deref()
    }

    pub fn generated_sql(&self) -> Option<&str> {
        self.generated_sql.as_deref()
    }

    /// The user-revised SQL, when it differs from the generated text.
    pub fn edited_sql(&self) -> Option<&str> {
        self.edited_sql.as_deref()
    }

    /// The exact SQL text that produced the current result. This is what gets
    /// persisted as an example, not the originally generated text.
    pub fn last_executed_sql(&self) -> Option<&str> {
        self.last_executed_sql.as_deref()
    }

    pub fn execution_result(&self) -> Option<&TabularResult> {
        self.execution_result.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn feedback_given(&self) -> bool {
        self.feedback_given
    }

    // -------------------------------------------------------------------------
    // Transitions. Each helper keeps the result/error slots mutually
    // exclusive and clears exactly what the new state invalidates.
    // -------------------------------------------------------------------------

    /// Accept a new natural-language query: discard everything downstream of
    /// the previous one and enter `AwaitingGeneration`.
    pub(crate) fn begin_submission(&mut self, text: &str) {
        self.natural_language_query = Some(text.to_string());
        self.generated_sql = None;
        self.edited_sql = None;
        self.last_executed_sql = None;
        self.execution_result = None;
        self.error = None;
        self.feedback_given = false;
        self.state = SessionState::AwaitingGeneration;
    }

    pub(crate) fn complete_generation(&mut self, sql: String) {
        self.generated_sql = Some(sql);
        self.error = None;
        self.state = SessionState::AwaitingExecution;
    }

    pub(crate) fn fail_generation(&mut self, error: ErrorRecord) {
        self.generated_sql = None;
        self.error = Some(error);
        self.state = SessionState::GenerationFailed;
    }

    pub(crate) fn complete_execution(&mut self, executed_sql: &str, result: TabularResult) {
        if self.generated_sql.as_deref() != Some(executed_sql) {
            self.edited_sql = Some(executed_sql.to_string());
        }
        self.last_executed_sql = Some(executed_sql.to_string());
        self.execution_result = Some(result);
        self.error = None;
        self.feedback_given = false;
        self.state = SessionState::Completed;
    }

    pub(crate) fn fail_execution(&mut self, error: ErrorRecord) {
        self.execution_result = None;
        self.error = Some(error);
        self.state = SessionState::ExecutionFailed;
    }

    pub(crate) fn mark_feedback_given(&mut self) {
        self.feedback_given = true;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_rejects_ragged_rows() {
        let err = TabularResult::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()], vec!["3".into()]],
        )
        .unwrap_err();
        assert!(matches!(err, ResultShapeError::RowWidth { row: 1, .. }));
    }

    #[test]
    fn result_rejects_duplicate_columns() {
        let err = TabularResult::new(vec!["a".into(), "a".into()], vec![]).unwrap_err();
        assert!(matches!(err, ResultShapeError::DuplicateColumn(_)));
    }

    #[test]
    fn submission_resets_downstream_fields() {
        let mut s = Session::new();
        s.begin_submission("first");
        s.complete_generation("SELECT 1".into());
        let result = TabularResult::new(vec!["c".into()], vec![vec!["1".into()]]).unwrap();
        s.complete_execution("SELECT 1", result);
        s.mark_feedback_given();

        s.begin_submission("second");
        assert_eq!(s.natural_language_query(), Some("second"));
        assert_eq!(s.state(), SessionState::AwaitingGeneration);
        assert!(s.generated_sql().is_none());
        assert!(s.execution_result().is_none());
        assert!(s.last_error().is_none());
        assert!(!s.feedback_given());
    }

    #[test]
    fn execution_outcome_slots_are_mutually_exclusive() {
        let mut s = Session::new();
        s.begin_submission("q");
        s.complete_generation("SELECT 1".into());

        let result = TabularResult::new(vec!["c".into()], vec![vec!["1".into()]]).unwrap();
        s.complete_execution("SELECT 1", result);
        assert!(s.execution_result().is_some() && s.last_error().is_none());

        s.fail_execution(ErrorRecord::new(ErrorKind::ExecutionFailure, "boom"));
        assert!(s.execution_result().is_none() && s.last_error().is_some());
    }

    #[test]
    fn edited_sql_recorded_only_when_it_differs() {
        let mut s = Session::new();
        s.begin_submission("q");
        s.complete_generation("SELECT 1".into());
        let result = TabularResult::new(vec!["c".into()], vec![]).unwrap();
        s.complete_execution("SELECT 1", result.clone());
        assert!(s.edited_sql().is_none());

        s.complete_execution("SELECT 2", result);
        assert_eq!(s.edited_sql(), Some("SELECT 2"));
        assert_eq!(s.last_executed_sql(), Some("SELECT 2"));
    }
}
