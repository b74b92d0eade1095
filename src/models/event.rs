//! Normalized records shared by both platforms
//!
//! Adapters turn heterogeneous platform payloads into these shapes; the
//! matcher and orchestrator only ever see them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One exercise of a strength session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    /// Exercise name, e.g. "Squat"
    pub name: String,

    /// Repetitions
    pub reps: u32,

    /// Weight per repetition
    pub weight: f64,

    /// Unit of `weight`
    pub weight_unit: String,

    /// Number of sets
    pub sets: u32,
}

impl Exercise {
    /// Create an exercise with one set, weight in pounds
    pub fn new(name: impl Into<String>, reps: u32, weight: f64) -> Self {
        Self {
            name: name.into(),
            reps,
            weight,
            weight_unit: "lbs".to_string(),
            sets: 1,
        }
    }
}

impl std::fmt::Display for Exercise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}x{}", self.name, self.reps, self.weight)
    }
}

/// A strength session recorded on the source platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    /// Source-platform id
    pub id: String,

    /// Session start
    pub start_time: DateTime<Utc>,

    /// Session length in seconds
    pub duration_seconds: u64,

    /// Class title, possibly empty
    pub title: String,

    /// Exercises in performance order
    pub exercises: Vec<Exercise>,
}

impl SourceEvent {
    /// Session end, `start_time + duration_seconds`
    pub fn end_time(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.duration_seconds).unwrap_or(i64::MAX);
        self.start_time + Duration::try_seconds(secs).unwrap_or(Duration::zero())
    }

    /// Distinct non-empty exercise names
    pub fn exercise_names(&self) -> BTreeSet<String> {
        self.exercises
            .iter()
            .filter(|e| !e.name.is_empty())
            .map(|e| e.name.clone())
            .collect()
    }
}

/// A strength activity recorded on the target platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetActivity {
    /// Target-platform id
    pub id: String,

    /// Activity time, from whichever field the platform exposes
    pub observed_time: DateTime<Utc>,

    /// Id of the workout already linked to this activity
    pub linked_workout_id: Option<String>,
}

impl TargetActivity {
    /// Whether a workout is already linked
    pub fn is_linked(&self) -> bool {
        self.linked_workout_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }

    /// Whether the linked workout is `workout_id`
    pub fn is_linked_to(&self, workout_id: &str) -> bool {
        self.linked_workout_id.as_deref() == Some(workout_id)
    }
}

/// A workout record on the target platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWorkout {
    /// Target-platform id
    pub id: String,

    /// Workout title
    pub title: String,

    /// Names of the exercises in the workout
    pub exercise_names: BTreeSet<String>,
}

impl TargetWorkout {
    /// Workout known only by id, as returned by create
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            exercise_names: BTreeSet::new(),
        }
    }
}
