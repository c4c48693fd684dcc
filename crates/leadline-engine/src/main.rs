//! Manual trigger surface for the Leadline workflow engine.
//!
//! Binary name: `leadline`
//!
//! Parses CLI arguments, initializes the database and engine services, then
//! runs one workflow against an input payload and prints the terminal
//! execution record as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use leadline_core::event::EventBus;
use leadline_core::store::WorkflowStore;
use leadline_core::workflow::breaker::BreakerRegistry;
use leadline_core::workflow::coordinator::{Coordinator, CoordinatorConfig};
use leadline_core::workflow::definition::parse_workflow_yaml;
use leadline_core::workflow::step::StepExecutor;
use leadline_infra::config::load_engine_config;
use leadline_infra::http::HttpTransport;
use leadline_infra::sqlite::{DatabasePool, SqliteWorkflowStore};
use leadline_types::execution::ExecutionStatus;

#[derive(Parser)]
#[command(
    name = "leadline",
    about = "Run a workflow definition against an input payload"
)]
struct Cli {
    /// Path to the workflow YAML definition.
    workflow: PathBuf,

    /// JSON input payload for the execution.
    #[arg(long, default_value = "{}")]
    input: String,

    /// Data directory holding config.toml and the SQLite database.
    /// Defaults to `$LEADLINE_DATA_DIR`, then `~/.leadline`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit OpenTelemetry spans to stdout.
    #[arg(long)]
    otel: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEADLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".leadline")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,leadline=debug",
        _ => "trace",
    };
    leadline_observe::tracing_setup::init_tracing(default_directive, cli.otel)
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))?;

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let config = load_engine_config(&data_dir).await;

    let yaml = tokio::fs::read_to_string(&cli.workflow)
        .await
        .with_context(|| format!("failed to read {}", cli.workflow.display()))?;
    let workflow = parse_workflow_yaml(&yaml)?;
    let input: serde_json::Value =
        serde_json::from_str(&cli.input).context("input is not valid JSON")?;

    let database_url = format!(
        "sqlite://{}?mode=rwc",
        data_dir.join("leadline.db").display()
    );
    let pool = DatabasePool::new(&database_url)
        .await
        .context("failed to open database")?;
    let store = Arc::new(SqliteWorkflowStore::new(pool));
    store.save_workflow(&workflow).await?;

    let events = EventBus::new(1024);
    let breakers = Arc::new(BreakerRegistry::new(config.breaker, events.clone()));
    let transport = Arc::new(HttpTransport::new(&config.http));
    let executor = Arc::new(
        StepExecutor::new(transport, breakers, events.clone())
            .with_default_timeout(config.http.request_timeout_ms),
    );
    let coordinator = Coordinator::new(store, executor, events).with_config(CoordinatorConfig {
        max_concurrency: config.engine.max_concurrency,
        default_step_timeout_ms: config.engine.default_step_timeout_ms,
    });

    tracing::info!(
        workflow = workflow.name.as_str(),
        "triggering workflow execution"
    );
    let execution = coordinator.run(workflow.id, input).await?;

    println!("{}", serde_json::to_string_pretty(&execution)?);

    leadline_observe::tracing_setup::shutdown_tracing();

    if execution.status != ExecutionStatus::Succeeded {
        std::process::exit(1);
    }
    Ok(())
}
