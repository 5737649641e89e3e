//! The query lifecycle controller.
//!
//! Drives one [`Session`] from natural-language intake through SQL
//! generation, execution, and optional persistence of the accepted query as a
//! future few-shot example. Every collaborator failure is converted into an
//! [`ErrorRecord`] on the session; nothing propagates far enough to kill the
//! session. Nothing is retried: the user resubmits, which at this level is
//! indistinguishable from a new request.
//!
//! Generation and execution are two separate, independently repeatable steps.
//! The generated SQL is always shown to the user for review before anything
//! is billed on the warehouse: generation is cheap, execution is not, so the
//! boundary is a cost checkpoint.
//!
//! Contract notes:
//! - Positive feedback leaves the natural-language query in place; the
//!   session stays `Completed` and the same SQL may be run again.
//! - If the example store cannot be read while assembling a generation
//!   prompt, generation proceeds with zero examples and a warning is logged.
//!   A store failure while persisting feedback is surfaced to the caller and
//!   leaves the feedback flag unset.

use std::sync::Arc;

use crate::config::PromptContext;
use crate::fewshot::{Example, FewshotStore};
use crate::gateway::{Attribution, GenerateGateway, GenerateRequest, ProviderError};
use crate::prompts::{examples_block, result_block, ANSWER_SUMMARY_V1, SQL_GENERATION_V1};
use crate::session::{ErrorKind, ErrorRecord, Session, SessionState};
use crate::warehouse::{log_job_stats, QueryExecutor, WarehouseError};

/// How many result rows the summary prompt sees.
const SUMMARY_PROMPT_ROWS: usize = 50;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Model used for SQL generation.
    pub generation_model: String,
    /// Model used for answer summaries.
    pub summary_model: String,
    /// Sampling temperature for both calls.
    pub temperature: f32,
    /// How many stored examples go into a generation prompt.
    pub max_prompt_examples: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            generation_model: "gemini-2.5-flash-lite".into(),
            summary_model: "gemini-2.5-flash".into(),
            temperature: 0.5,
            max_prompt_examples: 20,
        }
    }
}

impl ControllerConfig {
    pub fn from_app(config: &crate::config::AppConfig) -> Self {
        Self {
            generation_model: config.generation_model.clone(),
            summary_model: config.summary_model.clone(),
            temperature: 0.5,
            max_prompt_examples: config.max_prompt_examples,
        }
    }
}

pub struct QueryLifecycleController {
    session: Session,
    generator: Arc<dyn GenerateGateway>,
    summarizer: Arc<dyn GenerateGateway>,
    executor: Arc<dyn QueryExecutor>,
    store: FewshotStore,
    prompt_context: PromptContext,
    config: ControllerConfig,
}

impl QueryLifecycleController {
    pub fn new(
        generator: Arc<dyn GenerateGateway>,
        summarizer: Arc<dyn GenerateGateway>,
        executor: Arc<dyn QueryExecutor>,
        store: FewshotStore,
        prompt_context: PromptContext,
        config: ControllerConfig,
    ) -> Self {
        Self {
            session: Session::new(),
            generator,
            summarizer,
            executor,
            store,
            prompt_context,
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Accept a new natural-language query and generate SQL for it.
    ///
    /// Always allowed: starting a new query discards whatever the previous
    /// one left behind. Empty or whitespace-only text is rejected before any
    /// collaborator is invoked and leaves the session untouched.
    ///
    /// On return the session is in `AwaitingExecution` (SQL ready for
    /// review) or `GenerationFailed`. Execution is a separate explicit step.
    pub async fn submit_natural_language_query(
        &mut self,
        text: &str,
    ) -> Result<SessionState, ErrorRecord> {
        if text.trim().is_empty() {
            return Err(ErrorRecord::validation("natural-language query is empty"));
        }

        self.session.begin_submission(text);
        tracing::info!(session = %self.session.id(), "generating SQL");

        let prompt = self.assemble_generation_prompt(text);
        let request = GenerateRequest::new(
            self.config.generation_model.as_str(),
            prompt.user,
            Attribution::new("controller::generate_sql").with_session(self.session.id()),
        )
        .system(prompt.system)
        .temperature(self.config.temperature);

        let generated = self.generator.generate(request).await;
        match generated {
            Ok(response) => {
                self.session
                    .complete_generation(response.text.trim().to_string());
            }
            Err(err) => {
                tracing::warn!(session = %self.session.id(), error = %err, "generation failed");
                self.session.fail_generation(provider_error_record(&err));
            }
        }
        Ok(self.session.state())
    }

    /// Execute SQL - generated or user-edited - against the warehouse.
    ///
    /// Valid once SQL has been generated, after a failed execution, or from a
    /// completed session (rerun). Blank SQL and invalid source states are
    /// rejected without touching the session, so a prior result never gets
    /// clobbered by a bad request.
    pub async fn run_query(&mut self, sql: &str) -> Result<SessionState, ErrorRecord> {
        if !self.session.state().can_execute() {
            return Err(ErrorRecord::validation(format!(
                "no query ready to execute (state: {})",
                self.session.state().as_str()
            )));
        }
        if sql.trim().is_empty() {
            return Err(ErrorRecord::validation("SQL text is empty"));
        }

        tracing::info!(session = %self.session.id(), "executing query");
        let executed = self.executor.execute(sql).await;
        match executed {
            Ok(outcome) => {
                log_job_stats(&outcome.stats);
                self.session.complete_execution(sql, outcome.result);
            }
            Err(err) => {
                tracing::warn!(session = %self.session.id(), error = %err, "execution failed");
                self.session.fail_execution(warehouse_error_record(&err));
            }
        }
        Ok(self.session.state())
    }

    /// Record the user's verdict on a completed result.
    ///
    /// Only valid from `Completed` while feedback has not been given yet;
    /// calling again afterwards is a no-op, which is what prevents duplicate
    /// saves across repeated refresh cycles. Positive feedback persists the
    /// executed query as an example (deduplicated by name, silently).
    /// Returns whether an example was actually inserted.
    pub fn record_feedback(
        &mut self,
        positive: bool,
        summary_notes: &str,
    ) -> Result<bool, ErrorRecord> {
        if self.session.state() != SessionState::Completed {
            return Err(ErrorRecord::validation(format!(
                "no completed result to rate (state: {})",
                self.session.state().as_str()
            )));
        }
        if self.session.feedback_given() {
            return Ok(false);
        }
        if !positive {
            self.session.mark_feedback_given();
            return Ok(false);
        }

        let example = match (
            self.session.natural_language_query(),
            self.session.last_executed_sql(),
            self.session.execution_result(),
        ) {
            (Some(name), Some(sql), Some(result)) => {
                Example::from_result(name, sql, result, summary_notes)
            }
            _ => {
                return Err(ErrorRecord::validation(
                    "completed session is missing query, SQL, or result",
                ))
            }
        };

        match self.store.add_example(example) {
            Ok(inserted) => {
                self.session.mark_feedback_given();
                Ok(inserted)
            }
            Err(err) => Err(ErrorRecord::new(ErrorKind::StorageFailure, err.to_string())),
        }
    }

    /// Generate a natural-language summary of the completed result.
    ///
    /// Auxiliary to the lifecycle: a failed summary is reported to the caller
    /// but does not disturb the session or its result.
    pub async fn summarize_result(&self) -> Result<String, ErrorRecord> {
        let (query, result) = match (
            self.session.natural_language_query(),
            self.session.execution_result(),
        ) {
            (Some(q), Some(r)) if self.session.state() == SessionState::Completed => (q, r),
            _ => {
                return Err(ErrorRecord::validation(format!(
                    "no completed result to summarize (state: {})",
                    self.session.state().as_str()
                )))
            }
        };

        let results = result_block(result, SUMMARY_PROMPT_ROWS);
        let prompt = ANSWER_SUMMARY_V1.render(&[("user_query", query), ("results", &results)]);
        let request = GenerateRequest::new(
            self.config.summary_model.as_str(),
            prompt.user,
            Attribution::new("controller::summarize").with_session(self.session.id()),
        )
        .system(prompt.system)
        .temperature(self.config.temperature);

        match self.summarizer.generate(request).await {
            Ok(response) => Ok(response.text.trim().to_string()),
            Err(err) => Err(provider_error_record(&err)),
        }
    }

    fn assemble_generation_prompt(&self, user_query: &str) -> crate::prompts::PromptInstance {
        let examples = match self.store.load() {
            Ok(examples) => examples,
            Err(err) => {
                // Degraded mode: generation works without examples,
                // execution is unaffected.
                tracing::warn!(error = %err, "example store unreadable, generating without examples");
                Vec::new()
            }
        };
        let block = examples_block(&examples, self.config.max_prompt_examples);
        SQL_GENERATION_V1.render(&[
            ("dataset", self.prompt_context.dataset.as_str()),
            ("db_schema", self.prompt_context.schema.as_str()),
            ("few_shot_examples", &block),
            ("user_query", user_query),
        ])
    }
}

fn provider_error_record(err: &ProviderError) -> ErrorRecord {
    let kind = if err.is_auth() {
        ErrorKind::AuthenticationFailure
    } else {
        ErrorKind::GenerationFailure
    };
    ErrorRecord::new(kind, err.to_string())
}

fn warehouse_error_record(err: &WarehouseError) -> ErrorRecord {
    let kind = if err.is_auth() {
        ErrorKind::AuthenticationFailure
    } else {
        ErrorKind::ExecutionFailure
    };
    ErrorRecord::new(kind, err.to_string())
}
