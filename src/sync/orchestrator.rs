//! One reconciliation pass
//!
//! The orchestrator walks `FETCH_SOURCE -> FETCH_TARGET -> MATCH -> ACT ->
//! SUMMARIZE`. Only authentication failures abort a run; failed fetches are
//! treated as an empty side and failed actions are recorded in the summary.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AdapterError, AppError, AuthError};
use crate::models::{ActionFailure, ActionStep, MatchDecision, SourceEvent, SyncSummary};
use crate::platforms::{PelotonAdapter, SourceAdapter, TargetAdapter, WhoopAdapter};
use crate::sync::matcher::Matcher;

const DEADLINE_MESSAGE: &str = "run deadline exceeded";

/// Per-run settings
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Lookback window in days
    pub days_back: u32,
    /// Maximum distance between an event and its activity
    pub time_threshold_minutes: u32,
    /// Log intended side effects instead of performing them
    pub dry_run: bool,
    /// Sport id used when creating workouts
    pub strength_sport_id: u32,
    /// Wall-clock budget for the whole run
    pub run_deadline: Duration,
}

impl SyncOptions {
    /// Options from configuration, with an optional lookback override
    pub fn from_config(config: &Config, days_back: Option<u32>, dry_run: bool) -> Self {
        Self {
            days_back: days_back.unwrap_or(config.settings.lookback_days),
            time_threshold_minutes: config.settings.time_threshold_minutes,
            dry_run,
            strength_sport_id: config.target.strength_sport_id,
            run_deadline: Duration::from_secs(config.settings.run_deadline_secs),
        }
    }
}

/// Drives a source and a target adapter through one pass
pub struct SyncOrchestrator {
    source: Arc<dyn SourceAdapter>,
    target: Arc<dyn TargetAdapter>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    /// Create an orchestrator over existing adapters
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        target: Arc<dyn TargetAdapter>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            target,
            options,
        }
    }

    /// Build fresh Peloton and Whoop adapters from configuration
    pub fn from_config(config: &Config, options: SyncOptions) -> Result<Self, AppError> {
        let source = PelotonAdapter::new(config.source.clone())
            .map_err(|e| AppError::Internal(format!("Failed to build source client: {}", e)))?;
        let target = WhoopAdapter::new(config.target.clone(), &config.source.platform_name)
            .map_err(|e| AppError::Internal(format!("Failed to build target client: {}", e)))?;

        Ok(Self::new(Arc::new(source), Arc::new(target), options))
    }

    /// Options in effect
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one pass
    ///
    /// Returns an error only when either platform rejects authentication.
    pub async fn run(&self) -> Result<SyncSummary, AuthError> {
        let deadline = Instant::now() + self.options.run_deadline;
        let mut summary = SyncSummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        info!(
            source = self.source.platform_name(),
            target = self.target.platform_name(),
            days_back = self.options.days_back,
            dry_run = self.options.dry_run,
            "Starting sync run"
        );

        self.source.authenticate().await?;
        self.target.authenticate().await?;

        // FETCH_SOURCE
        let events = fetch_or_empty(
            "source_events",
            self.source.fetch_recent_events(self.options.days_back),
            deadline,
            &mut summary,
        )
        .await;
        summary.events_seen = events.len();

        let (events, without_exercises): (Vec<SourceEvent>, Vec<SourceEvent>) =
            events.into_iter().partition(|e| !e.exercises.is_empty());
        for event in &without_exercises {
            warn!(event_id = %event.id, "Skipping source event without exercises");
        }
        summary.skipped_no_exercises = without_exercises.len();

        if events.is_empty() {
            info!("No source events to reconcile");
            log_summary(&summary);
            return Ok(summary);
        }

        // FETCH_TARGET
        let activities = fetch_or_empty(
            "target_activities",
            self.target.fetch_recent_activities(self.options.days_back),
            deadline,
            &mut summary,
        )
        .await;
        let workouts = fetch_or_empty(
            "target_workouts",
            self.target.fetch_recent_workouts(self.options.days_back),
            deadline,
            &mut summary,
        )
        .await;

        debug!(
            events = events.len(),
            activities = activities.len(),
            workouts = workouts.len(),
            "Fetched both sides"
        );

        // MATCH
        let matcher = Matcher::new(
            self.source.platform_name(),
            self.options.time_threshold_minutes,
        );
        let decisions = matcher.match_events(&events, &activities, &workouts);

        // ACT
        for decision in decisions {
            self.act(decision, deadline, &mut summary).await;
        }

        log_summary(&summary);
        Ok(summary)
    }

    async fn act(&self, decision: MatchDecision, deadline: Instant, summary: &mut SyncSummary) {
        debug!(
            event_id = %decision.event().id,
            decision = decision.kind(),
            "Acting on decision"
        );

        match decision {
            MatchDecision::SkipNoActivity { event } => {
                info!(event_id = %event.id, "No target activity in range, skipping");
                summary.skipped_no_activity += 1;
            }
            MatchDecision::SkipAlreadyLinked { event, workout_id } => {
                info!(event_id = %event.id, workout_id = %workout_id, "Workout already linked, skipping");
                summary.skipped_already_linked += 1;
            }
            MatchDecision::CreateAndLink { event, activity_id } => {
                if expired(deadline, &event, summary) {
                    return;
                }
                let workout_id = match self.create(&event, deadline).await {
                    Ok(id) => {
                        summary.created_count += 1;
                        id
                    }
                    Err(failure) => {
                        record(summary, failure);
                        return;
                    }
                };
                self.link(&event, &activity_id, &workout_id, deadline, summary)
                    .await;
            }
            MatchDecision::LinkExisting {
                event,
                workout_id,
                activity_id,
            } => {
                if expired(deadline, &event, summary) {
                    return;
                }
                self.link(&event, &activity_id, &workout_id, deadline, summary)
                    .await;
            }
        }
    }

    async fn create(&self, event: &SourceEvent, deadline: Instant) -> Result<String, ActionFailure> {
        if self.options.dry_run {
            let workout_id = format!("dry-run-workout-{}", event.id);
            info!(
                event_id = %event.id,
                start = %event.start_time,
                end = %event.end_time(),
                workout_id = %workout_id,
                "Dry run: would create workout"
            );
            return Ok(workout_id);
        }

        let created = timeout_at(
            deadline,
            self.target.create_workout(
                event.start_time,
                event.end_time(),
                self.options.strength_sport_id,
            ),
        )
        .await;

        match created {
            Ok(Ok(workout)) => {
                info!(event_id = %event.id, workout_id = %workout.id, "Created workout");
                Ok(workout.id)
            }
            Ok(Err(e)) => {
                warn!(event_id = %event.id, error = %e, "Failed to create workout");
                Err(failure(event, ActionStep::Create, e.to_string()))
            }
            Err(_) => Err(failure(event, ActionStep::Deadline, DEADLINE_MESSAGE)),
        }
    }

    async fn link(
        &self,
        event: &SourceEvent,
        activity_id: &str,
        workout_id: &str,
        deadline: Instant,
        summary: &mut SyncSummary,
    ) {
        if self.options.dry_run {
            info!(
                event_id = %event.id,
                activity_id = %activity_id,
                workout_id = %workout_id,
                exercises = event.exercises.len(),
                "Dry run: would link workout to activity"
            );
            summary.linked_count += 1;
            return;
        }

        let linked = timeout_at(
            deadline,
            self.target
                .link_workout_to_activity(activity_id, workout_id, &event.exercises),
        )
        .await;

        match linked {
            Ok(Ok(())) => {
                info!(
                    event_id = %event.id,
                    activity_id = %activity_id,
                    workout_id = %workout_id,
                    "Linked workout to activity"
                );
                summary.linked_count += 1;
            }
            Ok(Err(e)) => {
                warn!(event_id = %event.id, error = %e, "Failed to link workout");
                record(summary, failure(event, ActionStep::Link, e.to_string()));
            }
            Err(_) => record(
                summary,
                failure(event, ActionStep::Deadline, DEADLINE_MESSAGE),
            ),
        }
    }
}

async fn fetch_or_empty<T, F>(
    label: &str,
    fetch: F,
    deadline: Instant,
    summary: &mut SyncSummary,
) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>, AdapterError>>,
{
    match timeout_at(deadline, fetch).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            warn!(fetch = label, error = %e, "Fetch failed, continuing with no records");
            summary.fetch_failures.push(format!("{}: {}", label, e));
            Vec::new()
        }
        Err(_) => {
            warn!(fetch = label, "Fetch hit the run deadline, continuing with no records");
            summary
                .fetch_failures
                .push(format!("{}: {}", label, DEADLINE_MESSAGE));
            Vec::new()
        }
    }
}

fn expired(deadline: Instant, event: &SourceEvent, summary: &mut SyncSummary) -> bool {
    if Instant::now() < deadline {
        return false;
    }
    record(
        summary,
        failure(event, ActionStep::Deadline, DEADLINE_MESSAGE),
    );
    true
}

fn failure(event: &SourceEvent, step: ActionStep, message: impl Into<String>) -> ActionFailure {
    ActionFailure {
        event_id: event.id.clone(),
        step,
        message: message.into(),
    }
}

fn record(summary: &mut SyncSummary, failure: ActionFailure) {
    warn!(failure = %failure, "Action failed");
    summary.errors.push(failure);
}

fn log_summary(summary: &SyncSummary) {
    info!(
        status = %summary.status(),
        events = summary.events_seen,
        created = summary.created_count,
        linked = summary.linked_count,
        skipped_no_activity = summary.skipped_no_activity,
        skipped_already_linked = summary.skipped_already_linked,
        skipped_no_exercises = summary.skipped_no_exercises,
        errors = summary.errors.len(),
        fetch_failures = summary.fetch_failures.len(),
        dry_run = summary.dry_run,
        "Sync run finished"
    );
}
