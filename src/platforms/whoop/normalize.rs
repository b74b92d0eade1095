//! Whoop payload normalization and request bodies

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::error::MalformedRecord;
use crate::models::{Exercise, TargetActivity, TargetWorkout};
use crate::platforms::{first_str, format_api_time, parse_instant, value_to_id};

const STRENGTH_TERMS: [&str; 3] = ["strength", "weight", "resistance"];

const ACTIVITY_TIME_FIELDS: [&str; 4] = ["time_created", "created_at", "start", "startTime"];

const LINK_FIELDS: [&str; 3] = ["workout_id", "linked_workout_id", "workoutId"];

/// Whether an activity record is strength training
pub fn is_strength_activity(record: &Value, strength_sport_id: u32) -> bool {
    let matches_id = |value: Option<&Value>| {
        value_to_id(value).is_some_and(|id| id == strength_sport_id.to_string())
    };

    if matches_id(record.get("sport_id")) {
        return true;
    }

    if let Some(sport) = record.get("sport").filter(|s| s.is_object()) {
        if matches_id(sport.get("id")) {
            return true;
        }
        if first_str(sport, &["name"]).is_some_and(mentions_strength) {
            return true;
        }
    }

    ["type", "workout_type", "name"]
        .iter()
        .any(|key| first_str(record, &[*key]).is_some_and(mentions_strength))
}

fn mentions_strength(text: &str) -> bool {
    let lower = text.to_lowercase();
    STRENGTH_TERMS.iter().any(|term| lower.contains(term))
}

/// First time field that is present but unparseable, else a missing field
fn unusable_time(record: &Value) -> MalformedRecord {
    ACTIVITY_TIME_FIELDS
        .iter()
        .find_map(|key| {
            let value = record.get(*key).filter(|v| !v.is_null())?;
            Some(MalformedRecord::InvalidField {
                field: *key,
                value: value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            })
        })
        .unwrap_or(MalformedRecord::MissingField("time_created"))
}

/// Normalize an activity record
pub fn normalize_activity(record: &Value) -> Result<TargetActivity, MalformedRecord> {
    if !record.is_object() {
        return Err(MalformedRecord::NotAnObject);
    }

    let id = value_to_id(record.get("id")).ok_or(MalformedRecord::MissingField("id"))?;

    let observed_time = ACTIVITY_TIME_FIELDS
        .iter()
        .find_map(|key| parse_instant(record.get(*key)))
        .or_else(|| parse_instant(record.get("during").and_then(|d| d.get("lower"))))
        .ok_or_else(|| unusable_time(record))?;

    let linked_workout_id = LINK_FIELDS
        .iter()
        .find_map(|key| value_to_id(record.get(*key)));

    Ok(TargetActivity {
        id,
        observed_time,
        linked_workout_id,
    })
}

/// Normalize a workout record
pub fn normalize_workout(record: &Value) -> Result<TargetWorkout, MalformedRecord> {
    if !record.is_object() {
        return Err(MalformedRecord::NotAnObject);
    }

    let id = value_to_id(record.get("id")).ok_or(MalformedRecord::MissingField("id"))?;
    let title = first_str(record, &["title", "name"])
        .unwrap_or_default()
        .to_string();

    let exercise_names: BTreeSet<String> = record
        .get("exercises")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|e| first_str(e, &["name"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(TargetWorkout {
        id,
        title,
        exercise_names,
    })
}

/// Id of the pre-existing workout in a 409 conflict body
pub fn conflict_workout_id(record: &Value) -> Option<String> {
    let first = record.get("overlaps")?.as_array()?.first()?;
    value_to_id(Some(first)).or_else(|| value_to_id(first.get("id")))
}

/// `+HHMM` / `-HHMM` form of a UTC offset
pub fn format_utc_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
}

/// Body of a create-workout request
pub fn create_workout_body(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sport_id: u32,
    utc_offset_minutes: i32,
) -> Value {
    json!({
        "gpsEnabled": false,
        "timezoneOffset": format_utc_offset(utc_offset_minutes),
        "sportId": sport_id,
        "source": "user",
        "during": {
            "lower": format_api_time(start),
            "upper": format_api_time(end),
            "bounds": "[)"
        }
    })
}

/// Body of a link request
///
/// Exercises without a name or without reps are left out.
pub fn link_body(
    activity_id: &str,
    workout_id: &str,
    source_platform: &str,
    exercises: &[Exercise],
) -> Value {
    let exercises: Vec<Value> = exercises
        .iter()
        .filter(|e| !e.name.is_empty() && e.reps > 0)
        .map(|e| {
            json!({
                "name": e.name,
                "reps": e.reps,
                "sets": e.sets,
                "weight": e.weight,
                "weight_unit": e.weight_unit,
            })
        })
        .collect();

    json!({
        "activity_id": activity_id,
        "workout_id": workout_id,
        "source": source_platform.to_lowercase(),
        "exercises": exercises,
    })
}
