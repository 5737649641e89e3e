//! Prompt templates for SQL generation and result summaries.
//!
//! Domain logic for rendering prompts. Provider-agnostic.

use crate::fewshot::Example;
use crate::session::TabularResult;

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the model.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

/// A prompt template with `{placeholder}` slots.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute `{name}` placeholders from `vars`.
    ///
    /// Substitution is a single pass over the template text: values are
    /// inserted verbatim and never rescanned, so braces inside injected data
    /// (e.g. the JSON-encoded example list) stay literal instead of being
    /// interpreted as further placeholders.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        PromptInstance {
            template_slug: self.slug.to_string(),
            system: substitute(self.system, vars),
            user: substitute(self.user, vars),
        }
    }
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                if let Some((_, value)) = vars.iter().find(|(n, _)| *n == name) {
                    out.push_str(value);
                } else {
                    // Unknown token: keep it literally.
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

// =============================================================================
// Prompt context helpers
// =============================================================================

/// JSON-encode up to `max` stored examples for inclusion in a prompt.
///
/// The output is data, not template text: it goes through [`PromptTemplate::render`]
/// as a substitution value, so its braces are never reinterpreted.
pub fn examples_block(examples: &[Example], max: usize) -> String {
    let capped: Vec<&Example> = examples.iter().take(max).collect();
    serde_json::to_string_pretty(&capped).unwrap_or_else(|_| "[]".to_string())
}

/// Render a result as a compact text table for the summary prompt.
pub fn result_block(result: &TabularResult, max_rows: usize) -> String {
    let mut out = result.columns().join("\t");
    for row in result.rows().iter().take(max_rows) {
        out.push('\n');
        out.push_str(&row.join("\t"));
    }
    if result.row_count() > max_rows {
        out.push_str(&format!(
            "\n... ({} more rows)",
            result.row_count() - max_rows
        ));
    }
    out
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const SQL_GENERATION_V1: PromptTemplate = PromptTemplate {
    slug: "sql_generation_v1",
    system: r#"You are a crypto data analyst. You have experience and knowledge in blockchain data analysis and you are expert in BigQuery SQL.
You are given a database schema and a user query. You need to generate a SQL query that will answer the user query.
The SQL query should be in BigQuery SQL syntax.
The SQL query should be efficient and will not take too long to execute.
The SQL query should be secure and will not expose any sensitive data.
The SQL query should be optimized for the database schema and for the user query.
If user query does not make sense, return a message "Please provide a more specific query".
If user query does not explicitly contain dates, assume the most recent date period that makes sense for the query.
Add an explicit alias for every selected expression. Never return unnamed columns. Alias cannot be named "hash".
Access tables or views with {dataset}.XXX where XXX is the table or view name.
TIMESTAMP_SUB function does not directly support subtracting MONTH intervals from a TIMESTAMP.

IMPORTANT: Return ONLY the SQL query text. Do NOT include markdown code blocks (```sql or ```).
Do NOT wrap the query in any formatting. Return the raw SQL query only."#,
    user: r#"Database schema:
{db_schema}

Prior accepted examples (JSON):
{few_shot_examples}

User query: {user_query}"#,
};

pub const ANSWER_SUMMARY_V1: PromptTemplate = PromptTemplate {
    slug: "answer_summary_v1",
    system: r#"You are a crypto data analyst. You have experience and knowledge in blockchain data analysis.
You are given a user query and the tabular results it produced. Summarize the results, taking into account both.
The answer should be in a natural language format.
No introduction sentence.
Be specific and to the point.
If a date was not specified in the user query, assume the most recent date period that makes sense for the query and say in the answer that the latest period was used because no date was specified."#,
    user: r#"User query: {user_query}

Results:
{results}"#,
};

pub const PROMPTS: &[PromptTemplate] = &[SQL_GENERATION_V1, ANSWER_SUMMARY_V1];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================
