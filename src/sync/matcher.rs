//! Matching of source events against target activities and workouts
//!
//! The matcher is pure: identical inputs always produce identical decisions.

use chrono::Duration;
use std::collections::{BTreeSet, HashSet};

use crate::models::{MatchDecision, SourceEvent, TargetActivity, TargetWorkout};

/// Minimum exercise-name similarity for a workout to count as a duplicate
pub const SIMILARITY_THRESHOLD: f64 = 0.70;

/// Decides what to do with each source event
#[derive(Debug, Clone)]
pub struct Matcher {
    source_platform: String,
    time_threshold: Duration,
}

impl Matcher {
    /// Create a matcher
    ///
    /// `source_platform` is searched for (case-insensitively) in workout titles.
    pub fn new(source_platform: &str, time_threshold_minutes: u32) -> Self {
        Self {
            source_platform: source_platform.to_lowercase(),
            time_threshold: Duration::minutes(i64::from(time_threshold_minutes)),
        }
    }

    /// One decision per event, in event order
    ///
    /// An activity claimed by an earlier event is not offered to later ones.
    pub fn match_events(
        &self,
        events: &[SourceEvent],
        activities: &[TargetActivity],
        workouts: &[TargetWorkout],
    ) -> Vec<MatchDecision> {
        let mut claimed: HashSet<&str> = HashSet::new();

        events
            .iter()
            .map(|event| {
                let decision = self.decide(event, activities, workouts, &claimed);
                if let Some(activity_id) = decision.activity_id() {
                    if let Some(activity) = activities.iter().find(|a| a.id == activity_id) {
                        claimed.insert(activity.id.as_str());
                    }
                }
                decision
            })
            .collect()
    }

    fn decide(
        &self,
        event: &SourceEvent,
        activities: &[TargetActivity],
        workouts: &[TargetWorkout],
        claimed: &HashSet<&str>,
    ) -> MatchDecision {
        let existing = self.find_duplicate_workout(event, workouts);
        let activity = self.closest_activity(event, activities, claimed);

        match (existing, activity) {
            (Some(workout), _) if self.linked_in_range(event, activities, &workout.id) => {
                MatchDecision::SkipAlreadyLinked {
                    event: event.clone(),
                    workout_id: workout.id.clone(),
                }
            }
            (Some(workout), Some(activity)) => MatchDecision::LinkExisting {
                event: event.clone(),
                workout_id: workout.id.clone(),
                activity_id: activity.id.clone(),
            },
            (None, Some(activity)) => MatchDecision::CreateAndLink {
                event: event.clone(),
                activity_id: activity.id.clone(),
            },
            (_, None) => MatchDecision::SkipNoActivity {
                event: event.clone(),
            },
        }
    }

    /// First workout titled after the source platform with similar exercises
    pub fn find_duplicate_workout<'a>(
        &self,
        event: &SourceEvent,
        workouts: &'a [TargetWorkout],
    ) -> Option<&'a TargetWorkout> {
        let names = event.exercise_names();
        if names.is_empty() {
            return None;
        }

        workouts.iter().find(|workout| {
            workout.title.to_lowercase().contains(&self.source_platform)
                && similarity(&names, &workout.exercise_names) >= SIMILARITY_THRESHOLD
        })
    }

    /// Unlinked, unclaimed activity closest to the event start within the threshold
    ///
    /// Ties go to the first activity encountered.
    pub fn closest_activity<'a>(
        &self,
        event: &SourceEvent,
        activities: &'a [TargetActivity],
        claimed: &HashSet<&str>,
    ) -> Option<&'a TargetActivity> {
        let mut best: Option<(&TargetActivity, Duration)> = None;

        for activity in activities {
            if activity.is_linked() || claimed.contains(activity.id.as_str()) {
                continue;
            }
            let diff = (activity.observed_time - event.start_time).abs();
            if diff > self.time_threshold {
                continue;
            }
            if best.map_or(true, |(_, best_diff)| diff < best_diff) {
                best = Some((activity, diff));
            }
        }

        best.map(|(activity, _)| activity)
    }

    fn linked_in_range(
        &self,
        event: &SourceEvent,
        activities: &[TargetActivity],
        workout_id: &str,
    ) -> bool {
        activities.iter().any(|activity| {
            activity.is_linked_to(workout_id)
                && (activity.observed_time - event.start_time).abs() <= self.time_threshold
        })
    }
}

/// `|A ∩ B| / max(|A|, |B|)`; zero when either side is empty
pub fn similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let larger = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    a.intersection(b).count() as f64 / larger as f64
}
