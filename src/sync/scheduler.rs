//! Periodic sync runs
//!
//! The scheduler runs a job once (after an optional initial delay) and then at a
//! fixed interval until a shutdown signal arrives. Failed runs are logged and
//! recorded in the status; they never stop the schedule.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SchedulerSettings};
use crate::error::AppError;
use crate::models::SyncSummary;
use crate::sync::orchestrator::{SyncOptions, SyncOrchestrator};

/// Recorded as the last result of a run cut short by shutdown
pub const INTERRUPTED_MESSAGE: &str = "interrupted by shutdown";

/// Timing of scheduled runs
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Time between run starts
    pub interval: Duration,
    /// Delay before the first run
    pub initial_delay: Duration,
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_hours.saturating_mul(3600)),
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
        }
    }
}

/// State of the scheduled job
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// When the last run finished
    pub last_run: Option<SystemTime>,
    /// Summary of the last run, or its error message
    pub last_result: Option<Result<SyncSummary, String>>,
    /// When the next run is due
    pub next_run: Option<SystemTime>,
    /// Whether a run is in progress
    pub in_progress: bool,
    /// Completed runs, successful or not
    pub runs: u64,
}

/// A unit of work the scheduler repeats
#[async_trait]
pub trait SyncJob: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Perform one run
    async fn run(&self) -> Result<SyncSummary, AppError>;
}

/// Reconciliation run built from configuration
///
/// Every run constructs fresh adapters, so endpoint memoization and sessions
/// start clean each time.
pub struct ConfiguredSyncJob {
    config: Config,
    days_back: Option<u32>,
    dry_run: bool,
}

impl ConfiguredSyncJob {
    /// Create a job
    pub fn new(config: Config, days_back: Option<u32>, dry_run: bool) -> Self {
        Self {
            config,
            days_back,
            dry_run,
        }
    }
}

#[async_trait]
impl SyncJob for ConfiguredSyncJob {
    fn name(&self) -> &str {
        "strength_sync"
    }

    async fn run(&self) -> Result<SyncSummary, AppError> {
        let options = SyncOptions::from_config(&self.config, self.days_back, self.dry_run);
        let orchestrator = SyncOrchestrator::from_config(&self.config, options)?;
        Ok(orchestrator.run().await?)
    }
}

/// Runs a [`SyncJob`] on a fixed interval
pub struct SyncScheduler {
    config: SchedulerConfig,
    job: Arc<dyn SyncJob>,
    status: Arc<RwLock<SyncStatus>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl SyncScheduler {
    /// Create a scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Run timing
    /// * `job` - Work performed on each tick
    /// * `shutdown_rx` - Broadcast receiver for the shutdown signal
    pub fn new(
        config: SchedulerConfig,
        job: Arc<dyn SyncJob>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            job,
            status: Arc::new(RwLock::new(SyncStatus::default())),
            shutdown_rx,
        }
    }

    /// Shared handle to the job status
    pub fn status_handle(&self) -> Arc<RwLock<SyncStatus>> {
        self.status.clone()
    }

    /// Snapshot of the job status
    pub async fn get_status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Run until shutdown
    pub async fn run(mut self) {
        info!(
            job = self.job.name(),
            interval_secs = self.config.interval.as_secs(),
            "Starting sync scheduler"
        );

        if !self.config.initial_delay.is_zero() {
            debug!(
                delay_secs = self.config.initial_delay.as_secs(),
                "Waiting for initial delay"
            );
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received before the first run");
                    return;
                }
                _ = tokio::time::sleep(self.config.initial_delay) => {}
            }
        }

        let mut timer = interval_at(Instant::now(), self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync scheduler");
                    break;
                }
                _ = timer.tick() => {
                    let name = self.job.name().to_string();
                    self.status.write().await.in_progress = true;
                    info!(job = name, "Performing scheduled sync");

                    let outcome = tokio::select! {
                        _ = self.shutdown_rx.recv() => None,
                        result = self.job.run() => Some(result),
                    };

                    match outcome {
                        Some(result) => {
                            Self::record_run(&self.status, &name, self.config.interval, result).await;
                        }
                        None => {
                            warn!(job = name, "Shutdown signal received during a run, abandoning it");
                            let mut s = self.status.write().await;
                            s.in_progress = false;
                            s.last_run = Some(SystemTime::now());
                            s.next_run = None;
                            s.last_result = Some(Err(INTERRUPTED_MESSAGE.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn record_run(
        status: &Arc<RwLock<SyncStatus>>,
        name: &str,
        interval: Duration,
        result: Result<SyncSummary, AppError>,
    ) {
        let mut s = status.write().await;
        s.in_progress = false;
        s.runs += 1;
        s.last_run = Some(SystemTime::now());
        s.next_run = Some(SystemTime::now() + interval);

        match result {
            Ok(summary) => {
                info!(
                    job = name,
                    status = %summary.status(),
                    created = summary.created_count,
                    linked = summary.linked_count,
                    errors = summary.errors.len(),
                    "Scheduled sync completed"
                );
                s.last_result = Some(Ok(summary));
            }
            Err(err) => {
                error!(job = name, error = %err, "Scheduled sync failed");
                s.last_result = Some(Err(err.to_string()));
            }
        }
    }
}
