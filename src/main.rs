//! strength-sync - Reconciles Peloton strength workouts with Whoop activities
//!
//! This is the command-line entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use strength_sync::analyzer::{analyze, load_capture, render_text};
use strength_sync::config::{Config, LoggingConfig};
use strength_sync::logging::init_tracing;
use strength_sync::models::SyncSummary;
use strength_sync::sync::{
    ConfiguredSyncJob, SchedulerConfig, SyncOptions, SyncOrchestrator, SyncScheduler,
};

/// strength-sync - Reconciles Peloton strength workouts with Whoop activities
#[derive(Parser, Debug)]
#[command(name = "strength-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "STRENGTH_SYNC_CONFIG",
        default_value = "config.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one reconciliation pass
    Sync {
        /// Lookback window in days (overrides settings.lookback_days)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        days: Option<u32>,

        /// Log intended changes without writing to the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Run reconciliation passes on a fixed interval until interrupted
    Schedule {
        /// Hours between runs (overrides scheduler.interval_hours)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_hours: Option<u64>,

        /// Lookback window in days (overrides settings.lookback_days)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        days: Option<u32>,

        /// Log intended changes without writing to the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Analyze a captured traffic session and suggest endpoint candidates
    Analyze {
        /// Capture file (JSON array of requests)
        capture: PathBuf,

        /// Host substring to keep; repeatable (default: whoop, api-7, app.whoop)
        #[arg(long = "host")]
        hosts: Vec<String>,

        /// Print suggested candidates as target.endpoints YAML
        #[arg(long)]
        yaml: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "strength-sync failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Sync { days, dry_run } => {
            let config = load_config(&args.config)?;
            init_tracing(&config.logging)?;
            info!(version = env!("CARGO_PKG_VERSION"), "Starting strength-sync");

            let options = SyncOptions::from_config(&config, days, dry_run);
            let orchestrator = SyncOrchestrator::from_config(&config, options)?;
            let summary = orchestrator.run().await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Schedule {
            interval_hours,
            days,
            dry_run,
        } => {
            let mut config = load_config(&args.config)?;
            if let Some(hours) = interval_hours {
                config.scheduler.interval_hours = hours;
            }
            init_tracing(&config.logging)?;
            info!(
                version = env!("CARGO_PKG_VERSION"),
                interval_hours = config.scheduler.interval_hours,
                "Starting strength-sync scheduler"
            );

            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(());
            });

            let scheduler = SyncScheduler::new(
                SchedulerConfig::from(&config.scheduler),
                Arc::new(ConfiguredSyncJob::new(config, days, dry_run)),
                shutdown_rx,
            );
            scheduler.run().await;

            info!("strength-sync shutdown complete");
            Ok(())
        }
        Command::Analyze {
            capture,
            hosts,
            yaml,
        } => {
            init_tracing(&LoggingConfig {
                level: "warn".to_string(),
                ..Default::default()
            })?;

            let requests = load_capture(&capture)?;
            let report = analyze(&requests, &hosts);

            if yaml {
                print!("{}", report.suggestions.to_yaml()?);
            } else {
                println!("File: {}", capture.display());
                print!("{}", render_text(&report));
            }
            Ok(())
        }
    }
}

/// Load and validate configuration
fn load_config(path: &Path) -> anyhow::Result<Config> {
    // Use eprintln! since tracing is not yet initialized
    eprintln!("Loading configuration from file: {}", path.display());
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn print_summary(summary: &SyncSummary) {
    println!("Sync {}{}", summary.status(), if summary.dry_run { " (dry run)" } else { "" });
    println!("  events seen:            {}", summary.events_seen);
    println!("  skipped (no exercises): {}", summary.skipped_no_exercises);
    println!("  workouts created:       {}", summary.created_count);
    println!("  workouts linked:        {}", summary.linked_count);
    println!("  skipped (no activity):  {}", summary.skipped_no_activity);
    println!("  skipped (linked):       {}", summary.skipped_already_linked);
    for failure in &summary.fetch_failures {
        println!("  fetch failed: {}", failure);
    }
    for failure in &summary.errors {
        println!("  error: {}", failure);
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
