use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use thesis_engine::{
    ActionGraph, AssertionPerformer, CancelCause, CancelScope, FlowStore, HttpPerformer, InMemoryCancelBus,
    InMemoryFlowStore, InMemoryPerformanceGuard, Maintainer, Performance, Performers, Reducer, SaveEveryStepPolicy, State,
    load_config, load_config_from_path, parse_duration, parse_specification_file,
};
use thesis_types::Slug;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "thesis", version, about = "Run Given/When/Then API specifications")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every scenario of a specification file
    Run(RunArgs),
    /// Check a specification file without running it
    Validate {
        /// Path to the specification YAML/JSON
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the specification YAML/JSON
    file: PathBuf,
    /// Engine configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Flow timeout such as `30s` or `2m`
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,
    /// Template variable exposed as `env.NAME`
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    variables: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate { file } => validate(file),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .try_init();
}

fn log_filter(directives: Option<String>) -> EnvFilter {
    EnvFilter::new(directives.unwrap_or_else(|| "info".into()))
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config()?,
    };
    if let Some(timeout) = args.timeout {
        config.flow_timeout = timeout;
    }
    config.variables.extend(args.variables);
    config.validate()?;

    let specification = Arc::new(parse_specification_file(&args.file)?);
    let performance_id = specification.id().to_string();
    let flow_id = format!("{performance_id}-flow");

    let http = HttpPerformer::new(config.http_timeout, config.variables.clone()).context("Failed to build HTTP client")?;
    let performers = Performers::new()
        .with_http(Arc::new(http))
        .with_assertion(Arc::new(AssertionPerformer::new()));
    let performance = Performance::new(performance_id.as_str(), specification.clone(), performers)?.with_step_buffer(config.step_buffer);

    let store = Arc::new(InMemoryFlowStore::new());
    let maintainer = Maintainer::new(
        Arc::new(InMemoryPerformanceGuard::new()),
        Arc::new(InMemoryCancelBus::new()),
        &config,
    );
    let policy = SaveEveryStepPolicy::new(
        Reducer::new(flow_id.as_str(), performance_id.as_str(), &specification),
        store.clone(),
        config.save_timeout,
    );

    let scope = CancelScope::new();
    let interrupt = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, canceling performance");
            interrupt.cancel(CancelCause::Requested);
        }
    });

    info!(performance = %performance_id, file = %args.file.display(), "running specification");
    let mut messages = maintainer.maintain(&scope, Arc::new(performance), Box::new(policy)).await?;
    while let Some(message) = messages.recv().await {
        println!("{message}");
    }

    let flow = store.get_flow(&flow_id).await?;
    println!();
    for status in &flow.statuses {
        println!("{:<14} {}", status.state.as_str(), status.slug);
        for occurred in &status.occurred_errors {
            println!("{:<14}   {occurred}", "");
        }
    }
    let every_scenario = Slug::new_scenario("", "");
    let all_passed = flow.matching(&every_scenario).all(|status| status.state == State::Passed);

    Ok(if all_passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn validate(file: PathBuf) -> Result<ExitCode> {
    let specification = parse_specification_file(&file)?;
    let mut scenarios = 0usize;
    for scenario in specification.scenarios() {
        ActionGraph::build(scenario).with_context(|| format!("Invalid scenario {}", scenario.slug()))?;
        scenarios += 1;
    }
    println!(
        "{}: {} stories, {scenarios} scenarios, {} theses",
        file.display(),
        specification.stories().len(),
        specification.theses().count()
    );
    Ok(ExitCode::SUCCESS)
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    parse_duration(raw)
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| anyhow!("invalid duration `{raw}`, expected e.g. 500ms, 30s, 2m"))
}

fn parse_variable(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("variable name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.to_string()))
}
