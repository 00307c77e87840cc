use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anomalo_gate::config::{
    ENV_API_KEY, ENV_BASE_URL, ENV_QUARANTINE_TABLE, ENV_RESULTS_PATH, ENV_TEST_ID,
    ENV_TIMEOUT_SECONDS,
};
use anomalo_gate::gate;
use anomalo_gate::prelude::*;
use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anomalo-gate")]
#[command(about = "Gate a data pipeline on a remote Anomalo validation test", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gate once and print a JSON report
    Run(RunArgs),

    /// Print the gate's stages in execution order
    Plan,
}

/// Flags override the environment; a config file replaces it.
#[derive(Args)]
struct RunArgs {
    /// JSON config file to use instead of the environment
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key for the remote service
    #[arg(long)]
    api_key: Option<String>,

    /// Remote test to run
    #[arg(long)]
    test_id: Option<u64>,

    /// Destination for records that fail validation
    #[arg(long)]
    quarantine_table: Option<String>,

    /// Base URL of the remote service
    #[arg(long)]
    base_url: Option<String>,

    /// Where to write the raw trigger response
    #[arg(long, value_name = "FILE")]
    results_path: Option<PathBuf>,

    /// Do not write the trigger response to disk
    #[arg(long, conflicts_with = "results_path")]
    no_results_file: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,
}

impl RunArgs {
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut overrides = HashMap::new();
        if let Some(key) = &self.api_key {
            overrides.insert(ENV_API_KEY, key.clone());
        }
        if let Some(id) = self.test_id {
            overrides.insert(ENV_TEST_ID, id.to_string());
        }
        if let Some(table) = &self.quarantine_table {
            overrides.insert(ENV_QUARANTINE_TABLE, table.clone());
        }
        if let Some(url) = &self.base_url {
            overrides.insert(ENV_BASE_URL, url.clone());
        }
        if let Some(path) = &self.results_path {
            overrides.insert(ENV_RESULTS_PATH, path.display().to_string());
        }
        if self.no_results_file {
            overrides.insert(ENV_RESULTS_PATH, String::new());
        }
        if let Some(seconds) = self.timeout {
            overrides.insert(ENV_TIMEOUT_SECONDS, seconds.to_string());
        }
        overrides
    }

    fn load_config(&self) -> anyhow::Result<GateConfig> {
        let overrides = self.overrides();

        let Some(path) = &self.config else {
            let config = GateConfig::from_lookup(|key| {
                overrides.get(key).cloned().or_else(|| std::env::var(key).ok())
            })?;
            return Ok(config);
        };

        let mut config = GateConfig::from_file(path)?;
        if let Some(key) = &self.api_key {
            config.api_key.clone_from(key);
        }
        if let Some(id) = self.test_id {
            config.test_id = id;
        }
        if let Some(table) = &self.quarantine_table {
            config.quarantine_table = Some(table.clone());
        }
        if let Some(url) = &self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(path) = &self.results_path {
            config.results_path = Some(path.clone());
        }
        if self.no_results_file {
            config.results_path = None;
        }
        if let Some(seconds) = self.timeout {
            config.timeout_seconds = Some(seconds);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "anomalo_gate=debug"
    } else {
        "anomalo_gate=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) if matches!(e.downcast_ref::<GateError>(), Some(GateError::Interrupted)) => {
            tracing::error!("Gate aborted");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Gate failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run(args) => run_gate(&args, cli.verbose).await,
        Commands::Plan => print_plan(),
    }
}

async fn run_gate(args: &RunArgs, verbose: bool) -> anyhow::Result<bool> {
    let config = args.load_config().context("Invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let pipeline = GatePipeline::from_config(config)?;
    let sink: Arc<dyn EventSink> = if verbose {
        Arc::new(LoggingEventSink::debug())
    } else {
        Arc::new(LoggingEventSink::default())
    };
    let ctx = Arc::new(pipeline.context().with_event_sink(sink));

    let result = pipeline
        .run_until_interrupted(ctx, || async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

fn print_plan() -> anyhow::Result<bool> {
    let graph = gate::plan()?;

    for name in graph.execution_order() {
        let Some(spec) = graph.stage(name) else {
            continue;
        };
        let deps = spec.sorted_dependencies();
        if deps.is_empty() {
            println!("{name} [{}]", spec.kind);
        } else {
            println!("{name} [{}] <- {}", spec.kind, deps.join(", "));
        }
    }
    Ok(true)
}
