mod build;
mod compare;
mod config;
mod error;
mod events;
mod host;
mod intake;
mod models;
mod orchestrator;
mod runner;
mod structure;
mod suite;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use config::{Config, Layout};
use orchestrator::Orchestrator;
use runner::SystemRunner;

/// Build a compiler submission and check it against the expected outputs.
#[derive(Debug, Parser)]
#[command(name = "selfcheck", version)]
struct Cli {
    /// Directory holding the submission archive, tests and expected outputs.
    /// Defaults to the current directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file to use instead of `<root>/selfcheck.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the test summary as JSON after the verdict.
    #[arg(long)]
    json: bool,

    /// Log commands and their output to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init();

    let (config, layout) = match setup(&cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            let message = format!("{:#}", e);
            let mut out = std::io::stdout().lock();
            if let Err(write_err) = events::render_setup_failure(&message, &mut out) {
                tracing::warn!(error = %write_err, "failed to write progress");
            }
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &config, &layout).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config and resolve every path once, before any stage runs.
fn setup(cli: &Cli) -> Result<(Config, Layout)> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let config = Config::load(&root, cli.config.as_deref()).context("failed to load config")?;
    let layout = Layout::resolve(&root, &config).context("failed to resolve paths")?;
    tracing::debug!(?layout, "resolved layout");
    Ok((config, layout))
}

/// Returns whether the submission is OK to submit.
async fn run(cli: &Cli, config: &Config, layout: &Layout) -> Result<bool> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(events::print_events(event_rx));

    let outcome = Orchestrator::new(
        &SystemRunner,
        config,
        layout,
        host::current_hostname(),
        event_tx,
    )
    .run()
    .await;

    // The orchestrator dropped its sender; wait for the last lines to be printed.
    printer.await.context("progress printer panicked")?;

    if cli.json {
        let json = serde_json::json!({
            "ok_to_submit": outcome.ok_to_submit(),
            "failed_stage": outcome.result.as_ref().err().map(|f| f.stage),
            "summary": outcome.summary,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    Ok(outcome.ok_to_submit())
}
