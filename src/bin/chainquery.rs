#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use chainquery::config::{AppConfig, PromptContext};
use chainquery::controller::{ControllerConfig, QueryLifecycleController};
use chainquery::export;
use chainquery::fewshot::FewshotStore;
use chainquery::gateway::{
    GeminiClientFactory, GenerateGateway, NoopUsageSink, ProviderGateway, StderrUsageSink,
};
use chainquery::session::{SessionState, TabularResult};
use chainquery::warehouse::{
    log_job_stats, BigQueryExecutor, QueryExecutor, ServiceAccountKey, ServiceAccountTokens,
    WarehouseError,
};

#[derive(Parser)]
#[command(
    name = "chainquery",
    version,
    about = "Natural-language queries over the Ethereum mainnet public dataset"
)]
struct Cli {
    /// Emit provider usage records to stderr
    #[arg(long, global = true)]
    verbose_usage: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive ask → review → execute → feedback loop
    Repl,
    /// Generate SQL for one question and print it (no execution)
    Ask {
        /// The natural-language question
        question: String,
    },
    /// Execute SQL directly and print the result table
    Run {
        /// Inline SQL text
        #[arg(long, group = "input")]
        sql: Option<String>,

        /// Read SQL from a file
        #[arg(long, group = "input")]
        sql_file: Option<PathBuf>,

        /// Also export the result to a timestamped CSV file
        #[arg(long)]
        csv: bool,
    },
    /// List stored few-shot examples
    Examples,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Commands::Repl => repl(&config, cli.verbose_usage).await,
        Commands::Ask { question } => ask(&config, cli.verbose_usage, &question).await,
        Commands::Run { sql, sql_file, csv } => run_sql(&config, sql, sql_file, csv).await,
        Commands::Examples => list_examples(&config),
    }
}

// =============================================================================
// Composition
// =============================================================================

fn build_gateway(
    factory: &GeminiClientFactory,
    api_key: &str,
    verbose_usage: bool,
) -> Result<Arc<dyn GenerateGateway>, Box<dyn std::error::Error>> {
    let adapter = factory.client(api_key)?;
    let gateway: Arc<dyn GenerateGateway> = if verbose_usage {
        Arc::new(ProviderGateway::new(adapter, Arc::new(StderrUsageSink)))
    } else {
        Arc::new(ProviderGateway::new(adapter, Arc::new(NoopUsageSink)))
    };
    Ok(gateway)
}

/// Stands in for the warehouse when credentials are absent: every execution
/// reports the credential problem instead of crashing the session.
struct UnconfiguredExecutor;

#[async_trait::async_trait]
impl QueryExecutor for UnconfiguredExecutor {
    async fn execute(
        &self,
        _sql: &str,
    ) -> Result<chainquery::warehouse::QueryOutcome, WarehouseError> {
        Err(WarehouseError::config(CREDENTIALS_HELP))
    }
}

const CREDENTIALS_HELP: &str = "Could not connect to BigQuery. Please ensure that:\n\
    1. GOOGLE_BIGQUERY_CREDENTIALS contains the service-account JSON.\n\
    2. The service account has BigQuery access on its project.\n\
    3. The associated Google Cloud project has BigQuery enabled and billing configured.";

/// Build the warehouse executor from config. `Ok(None)` means credentials
/// are simply absent.
fn build_bigquery(config: &AppConfig) -> Result<Option<BigQueryExecutor>, WarehouseError> {
    let Some(raw) = config.warehouse_credentials.as_deref() else {
        return Ok(None);
    };
    let key = ServiceAccountKey::from_json(raw)?;
    let project = key.project_id.clone();
    let tokens = Arc::new(ServiceAccountTokens::new(key)?);
    BigQueryExecutor::with_config(
        "https://bigquery.googleapis.com/bigquery/v2",
        project,
        tokens,
        config.max_results,
        config.query_timeout,
    )
    .map(Some)
}

fn build_executor(config: &AppConfig) -> Arc<dyn QueryExecutor> {
    match build_bigquery(config) {
        Ok(Some(executor)) => Arc::new(executor),
        Ok(None) => {
            eprintln!("warning: {CREDENTIALS_HELP}");
            Arc::new(UnconfiguredExecutor)
        }
        Err(err) => {
            eprintln!("warning: {err}");
            eprintln!("{CREDENTIALS_HELP}");
            Arc::new(UnconfiguredExecutor)
        }
    }
}

fn build_controller(
    config: &AppConfig,
    verbose_usage: bool,
) -> Result<QueryLifecycleController, Box<dyn std::error::Error>> {
    let api_key = config
        .llm_api_key
        .clone()
        .ok_or("GOOGLE_LLM_API_KEY not set")?;

    let factory = GeminiClientFactory::new();
    let generator = build_gateway(&factory, &api_key, verbose_usage)?;
    let summarizer = build_gateway(&factory, &api_key, verbose_usage)?;
    let executor = build_executor(config);

    let prompt_context =
        PromptContext::load(&config.schema_path, config.dataset.clone()).map_err(|e| {
            format!(
                "failed to read schema file {}: {e}",
                config.schema_path.display()
            )
        })?;
    let store = FewshotStore::new(config.fewshot_path.clone());

    Ok(QueryLifecycleController::new(
        generator,
        summarizer,
        executor,
        store,
        prompt_context,
        ControllerConfig::from_app(config),
    ))
}

// =============================================================================
// Subcommands
// =============================================================================

async fn repl(
    config: &AppConfig,
    verbose_usage: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = build_controller(config, verbose_usage)?;
    println!("chainquery - ask about Ethereum Mainnet in plain English. Empty line quits.");

    loop {
        let Some(question) = prompt_line("\n? ")? else {
            break;
        };
        if question.trim().is_empty() {
            break;
        }

        match controller.submit_natural_language_query(&question).await {
            Ok(SessionState::AwaitingExecution) => {}
            Ok(_) => {
                if let Some(err) = controller.session().last_error() {
                    println!("generation failed: {}", err.message);
                }
                continue;
            }
            Err(err) => {
                println!("{}", err.message);
                continue;
            }
        }

        let generated = controller
            .session()
            .generated_sql()
            .unwrap_or_default()
            .to_string();
        println!("\nGenerated query:\n{generated}\n");

        let sql = match prompt_line("Execute this query? [y]es / [e]dit / [n]o: ")? {
            Some(answer) if answer.trim().eq_ignore_ascii_case("y") => generated,
            Some(answer) if answer.trim().eq_ignore_ascii_case("e") => {
                println!("Enter revised SQL, finish with an empty line:");
                read_block()?
            }
            _ => continue,
        };

        match controller.run_query(&sql).await {
            Ok(SessionState::Completed) => {}
            Ok(_) => {
                if let Some(err) = controller.session().last_error() {
                    println!("query failed: {}", err.message);
                }
                continue;
            }
            Err(err) => {
                println!("{}", err.message);
                continue;
            }
        }

        let Some(result) = controller.session().execution_result().cloned() else {
            continue;
        };
        println!("\n{}", render_table(&result));
        println!("({} rows)", result.row_count());

        let summary = match controller.summarize_result().await {
            Ok(summary) => {
                println!("\n{summary}");
                summary
            }
            Err(err) => {
                eprintln!("summary unavailable: {}", err.message);
                String::new()
            }
        };

        if let Some(answer) = prompt_line("\nExport to CSV? [y/N]: ")? {
            if answer.trim().eq_ignore_ascii_case("y") {
                match export::write_csv(&result, &config.export_dir) {
                    Ok(path) => println!("exported to {}", path.display()),
                    Err(err) => eprintln!("export failed: {err}"),
                }
            }
        }

        if let Some(answer) = prompt_line("Was this answer correct? [y/n/skip]: ")? {
            let answer = answer.trim().to_ascii_lowercase();
            if answer == "y" || answer == "n" {
                match controller.record_feedback(answer == "y", &summary) {
                    Ok(true) => println!("saved as a future example"),
                    Ok(false) => {}
                    Err(err) => eprintln!("feedback not recorded: {}", err.message),
                }
            }
        }
    }

    Ok(())
}

async fn ask(
    config: &AppConfig,
    verbose_usage: bool,
    question: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = build_controller(config, verbose_usage)?;
    match controller.submit_natural_language_query(question).await {
        Ok(SessionState::AwaitingExecution) => {
            println!(
                "{}",
                controller.session().generated_sql().unwrap_or_default()
            );
            Ok(())
        }
        Ok(_) => {
            let message = controller
                .session()
                .last_error()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "generation failed".into());
            Err(message.into())
        }
        Err(err) => Err(err.message.into()),
    }
}

async fn run_sql(
    config: &AppConfig,
    sql: Option<String>,
    sql_file: Option<PathBuf>,
    csv: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let sql = match (sql, sql_file) {
        (Some(sql), _) => sql,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err("provide --sql or --sql-file".into()),
    };
    if sql.trim().is_empty() {
        return Err("SQL text is empty".into());
    }

    let executor = build_bigquery(config)
        .map_err(|e| format!("{e}\n{CREDENTIALS_HELP}"))?
        .ok_or_else(|| format!("GOOGLE_BIGQUERY_CREDENTIALS not set\n{CREDENTIALS_HELP}"))?;
    let outcome = executor.execute(&sql).await?;
    log_job_stats(&outcome.stats);

    println!("{}", render_table(&outcome.result));
    println!("({} rows)", outcome.result.row_count());

    if csv {
        let path = export::write_csv(&outcome.result, &config.export_dir)?;
        println!("exported to {}", path.display());
    }
    Ok(())
}

fn list_examples(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = FewshotStore::new(config.fewshot_path.clone());
    let examples = store.load()?;
    if examples.is_empty() {
        println!("no stored examples");
        return Ok(());
    }
    for (i, example) in examples.iter().enumerate() {
        println!("{}. {}", i + 1, example.name);
        for line in example.sql.lines() {
            println!("   {line}");
        }
    }
    Ok(())
}

// =============================================================================
// Terminal helpers
// =============================================================================

fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None); // EOF
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn read_block() -> io::Result<String> {
    let mut block = String::new();
    loop {
        match prompt_line("")? {
            None => break,
            Some(line) if line.trim().is_empty() => break,
            Some(line) => {
                block.push_str(&line);
                block.push('\n');
            }
        }
    }
    Ok(block.trim_end().to_string())
}

fn render_table(result: &TabularResult) -> String {
    let columns = result.columns();
    if columns.is_empty() {
        return "(no columns)".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in result.rows() {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c:<width$}", width = widths[i]))
        .collect();
    out.push_str(&header.join("  "));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    for row in result.rows() {
        out.push('\n');
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c:<width$}", width = widths[i]))
            .collect();
        out.push_str(&cells.join("  "));
    }
    out
}
