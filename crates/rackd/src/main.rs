//! rackd: the rackgrid daemon.
//!
//! Loads a cluster configuration, builds the scheduler and its
//! notification dispatcher, and drives it from a recorded job trace.
//! Allocation notifications go to stdout as JSON lines; logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! rackd replay --config cluster.toml --trace jobs.jsonl
//! rackd check-config --config cluster.toml
//! ```

mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rackgrid_core::ClusterConfig;
use rackgrid_scheduler::{Dispatcher, Scheduler, SchedulerHandle};

const DEFAULT_FILTER: &str = "info,rackd=debug,rackgrid=debug";

#[derive(Parser)]
#[command(name = "rackd", about = "rackgrid cluster scheduler daemon")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines job trace through the scheduler.
    Replay {
        /// Cluster configuration file.
        #[arg(long, default_value = "cluster.toml")]
        config: PathBuf,

        /// Trace of add_job / free_resources / complete_job events.
        #[arg(long)]
        trace: PathBuf,

        /// Enable partial allocation regardless of the config file.
        #[arg(long)]
        partial: bool,
    },
    /// Validate a cluster configuration and print it normalized.
    CheckConfig {
        #[arg(long, default_value = "cluster.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Replay {
            config,
            trace,
            partial,
        } => run_replay(config, trace, partial).await,
        Command::CheckConfig { config } => check_config(config),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_replay(config_path: PathBuf, trace_path: PathBuf, partial: bool) -> anyhow::Result<()> {
    let mut config = ClusterConfig::from_file(&config_path)?;
    if partial {
        config.scheduling.partial_allocation = true;
    }
    info!(path = ?config_path, machines = config.machine_count(), "cluster config loaded");

    let trace = replay::load_trace(&trace_path)?;
    info!(
        path = ?trace_path,
        events = trace.events.len(),
        malformed = trace.malformed.len(),
        "trace loaded"
    );

    // ── Assemble ───────────────────────────────────────────────

    let dispatcher = Dispatcher::new(replay::stdout_notifier(), &config.notify);
    let handle = SchedulerHandle::new(Scheduler::new(&config), dispatcher);

    // ── Run ────────────────────────────────────────────────────

    let summary = replay::replay(&handle, trace).await;
    let delivery = handle.flush_notifications().await;
    info!(
        delivered = delivery.delivered,
        failed = delivery.failed,
        "notifications flushed"
    );

    let violations = handle.check_invariants().await;
    if !violations.is_empty() {
        anyhow::bail!("scheduler state inconsistent: {}", violations.join("; "));
    }

    let snapshot = handle.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    info!(
        rejected = summary.rejected,
        malformed = summary.malformed,
        "rackd replay finished"
    );
    Ok(())
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = ClusterConfig::from_file(&path)?;
    info!(
        path = ?path,
        machines = config.machine_count(),
        racks = config.cluster.racks.len(),
        "config is valid"
    );
    print!("{}", config.to_toml_string()?);
    Ok(())
}
