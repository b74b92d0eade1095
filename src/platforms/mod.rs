//! Platform adapters
//!
//! This module defines the traits the orchestrator drives and the concrete
//! adapters for the source (Peloton) and target (Whoop) platforms.
//!
//! Adapters fetch through a [`RateLimitedExecutor`](crate::client::RateLimitedExecutor)
//! and an [`EndpointResolver`](crate::client::EndpointResolver), then normalize
//! platform payloads into [`crate::models`] records. Records missing mandatory
//! fields are skipped with a warning.

pub mod peloton;
pub mod whoop;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{AdapterError, AuthError};
use crate::models::{Exercise, SourceEvent, TargetActivity, TargetWorkout};

pub use peloton::PelotonAdapter;
pub use whoop::WhoopAdapter;

/// Platform the strength sessions are read from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform name, also searched for in target workout titles
    fn platform_name(&self) -> &str;

    /// Establish a session
    async fn authenticate(&self) -> Result<(), AuthError>;

    /// Strength sessions started within the last `days_back` days
    async fn fetch_recent_events(&self, days_back: u32) -> Result<Vec<SourceEvent>, AdapterError>;
}

/// Platform the workouts are created and linked on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// Platform name used in logs
    fn platform_name(&self) -> &str;

    /// Obtain an access token
    async fn authenticate(&self) -> Result<(), AuthError>;

    /// Strength activities from the last `days_back` days
    async fn fetch_recent_activities(
        &self,
        days_back: u32,
    ) -> Result<Vec<TargetActivity>, AdapterError>;

    /// Workouts from the last `days_back` days
    async fn fetch_recent_workouts(&self, days_back: u32)
        -> Result<Vec<TargetWorkout>, AdapterError>;

    /// Create a workout spanning `start..end`
    ///
    /// A conflict with an existing workout returns that workout.
    async fn create_workout(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sport_id: u32,
    ) -> Result<TargetWorkout, AdapterError>;

    /// Attach a workout and its exercises to an activity
    async fn link_workout_to_activity(
        &self,
        activity_id: &str,
        workout_id: &str,
        exercises: &[Exercise],
    ) -> Result<(), AdapterError>;
}

/// Id from a string or numeric JSON value
pub fn value_to_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Instant from epoch seconds, epoch milliseconds, or an ISO 8601 string
///
/// Strings without an offset are read as UTC.
pub fn parse_instant(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_instant_str(s.trim()),
        _ => None,
    }
}

fn parse_instant_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    // Values this large are milliseconds
    let millis = if value.abs() >= 1e12 {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis as i64)
}

/// Timestamp in the `2025-04-20T07:00:00.000Z` form the platforms expect
pub fn format_api_time(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// First string value among `keys`
pub fn first_str<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Test 1: Ids from strings and numbers
    #[test]
    fn test_value_to_id() {
        assert_eq!(value_to_id(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(value_to_id(Some(&json!(12345))), Some("12345".to_string()));
        assert_eq!(value_to_id(Some(&json!(""))), None);
        assert_eq!(value_to_id(Some(&json!(null))), None);
        assert_eq!(value_to_id(None), None);
    }

    // Test 2: Epoch seconds and milliseconds
    #[test]
    fn test_parse_epoch() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 20, 10, 0, 0).unwrap();

        assert_eq!(parse_instant(Some(&json!(1745143200))), Some(expected));
        assert_eq!(parse_instant(Some(&json!(1745143200000i64))), Some(expected));
        assert_eq!(parse_instant(Some(&json!("1745143200"))), Some(expected));
    }

    // Test 3: ISO 8601 variants
    #[test]
    fn test_parse_iso_strings() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 20, 10, 5, 0).unwrap();

        assert_eq!(
            parse_instant(Some(&json!("2025-04-20T10:05:00.000Z"))),
            Some(expected)
        );
        assert_eq!(
            parse_instant(Some(&json!("2025-04-20T03:05:00-07:00"))),
            Some(expected)
        );
        assert_eq!(
            parse_instant(Some(&json!("2025-04-20T03:05:00.000-0700"))),
            Some(expected)
        );
        assert_eq!(
            parse_instant(Some(&json!("2025-04-20T10:05:00"))),
            Some(expected)
        );
        assert_eq!(parse_instant(Some(&json!("yesterday"))), None);
        assert_eq!(parse_instant(Some(&json!(""))), None);
    }

    // Test 4: API time format has milliseconds and a Z suffix
    #[test]
    fn test_format_api_time() {
        let instant = Utc.with_ymd_and_hms(2025, 4, 20, 7, 0, 0).unwrap();
        assert_eq!(format_api_time(instant), "2025-04-20T07:00:00.000Z");
    }

    // Test 5: First non-empty string field
    #[test]
    fn test_first_str() {
        let record = json!({"title": "", "name": "Upper Body", "kind": 3});
        assert_eq!(first_str(&record, &["title", "name"]), Some("Upper Body"));
        assert_eq!(first_str(&record, &["kind"]), None);
    }
}
