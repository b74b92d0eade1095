//! Match decisions and run summaries

use serde::{Deserialize, Serialize};

use crate::models::SourceEvent;

/// What to do with one source event
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Create a target workout and link it to `activity_id`
    CreateAndLink {
        /// The source event
        event: SourceEvent,
        /// Activity the new workout is linked to
        activity_id: String,
    },

    /// Link an existing target workout to an activity
    LinkExisting {
        /// The source event
        event: SourceEvent,
        /// Existing workout
        workout_id: String,
        /// Activity to link it to
        activity_id: String,
    },

    /// No target activity within the time threshold
    SkipNoActivity {
        /// The source event
        event: SourceEvent,
    },

    /// The matching workout is already linked to an activity in range
    SkipAlreadyLinked {
        /// The source event
        event: SourceEvent,
        /// Workout that is already linked
        workout_id: String,
    },
}

impl MatchDecision {
    /// Source event this decision is about
    pub fn event(&self) -> &SourceEvent {
        match self {
            MatchDecision::CreateAndLink { event, .. }
            | MatchDecision::LinkExisting { event, .. }
            | MatchDecision::SkipNoActivity { event }
            | MatchDecision::SkipAlreadyLinked { event, .. } => event,
        }
    }

    /// Short kind name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            MatchDecision::CreateAndLink { .. } => "create_and_link",
            MatchDecision::LinkExisting { .. } => "link_existing",
            MatchDecision::SkipNoActivity { .. } => "skip_no_activity",
            MatchDecision::SkipAlreadyLinked { .. } => "skip_already_linked",
        }
    }

    /// Activity this decision claims, if any
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            MatchDecision::CreateAndLink { activity_id, .. }
            | MatchDecision::LinkExisting { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }
}

/// Which step of acting on a decision failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStep {
    /// Creating the target workout
    Create,
    /// Linking the workout to the activity
    Link,
    /// The run deadline passed before the decision was acted on
    Deadline,
}

impl std::fmt::Display for ActionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStep::Create => write!(f, "create"),
            ActionStep::Link => write!(f, "link"),
            ActionStep::Deadline => write!(f, "deadline"),
        }
    }
}

/// A decision that could not be carried out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// Source event id
    pub event_id: String,
    /// Failed step
    pub step: ActionStep,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.event_id, self.step, self.message)
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing went wrong
    Success,
    /// The run completed with recorded failures
    PartialSuccess,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::PartialSuccess => write!(f, "partial_success"),
        }
    }
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Source events fetched
    pub events_seen: usize,
    /// Source events dropped for having no exercises
    pub skipped_no_exercises: usize,
    /// Workouts created (or found via conflict)
    pub created_count: usize,
    /// Links established
    pub linked_count: usize,
    /// Events without a target activity in range
    pub skipped_no_activity: usize,
    /// Events whose workout was already linked
    pub skipped_already_linked: usize,
    /// Per-decision failures
    pub errors: Vec<ActionFailure>,
    /// Fetches that failed and were treated as empty
    pub fetch_failures: Vec<String>,
    /// Whether side effects were suppressed
    pub dry_run: bool,
}

impl SyncSummary {
    /// Derived overall status
    ///
    /// Fetch failures leave the run successful; they are reported alongside.
    pub fn status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        }
    }
}
