//! Traffic analyzer integration tests
//!
//! Tests reading a capture file from disk and turning it into endpoint
//! candidates that the configuration accepts.

use std::io::Write;

use serde_json::json;
use strength_sync::analyzer::{analyze, load_capture, render_text, AnalyzerError};
use strength_sync::client::ResponseShape;
use strength_sync::platforms::whoop::WhoopEndpoints;
use tempfile::NamedTempFile;

fn write_capture(value: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(value.to_string().as_bytes())
        .expect("Failed to write capture");
    file
}

/// Test 1: Suggested YAML deserializes as Whoop endpoint tables
#[test]
fn test_suggestions_round_into_config() {
    let file = write_capture(&json!([
        {
            "host": "api.prod.whoop.com",
            "path": "/activities-service/v1/sports/history",
            "method": "GET",
            "status_code": 200,
            "query": "startTime=2025-04-01T00:00:00.000Z&endTime=2025-04-08T00:00:00.000Z",
            "response": {"body": "[{\"id\": 1}]"}
        },
        {
            "host": "api.prod.whoop.com",
            "path": "/activities-service/v0/workouts",
            "method": "GET",
            "status_code": 200,
            "response": {"body": "{\"data\": []}"}
        }
    ]));

    let requests = load_capture(file.path()).expect("Capture should load");
    let report = analyze(&requests, &[]);
    let yaml = report.suggestions.to_yaml().expect("Suggestions should render");

    let endpoints: WhoopEndpoints = serde_yaml::from_str(&yaml).expect("YAML should parse");

    assert_eq!(endpoints.find_strength_activities.len(), 1);
    assert_eq!(
        endpoints.find_strength_activities[0].shape,
        ResponseShape::BareList
    );
    assert_eq!(endpoints.list_workouts[0].shape, ResponseShape::Data);
    // Operations absent from the capture keep their defaults
    assert!(!endpoints.create_workout.is_empty());

    let text = render_text(&report);
    assert!(text.contains("=== WORKOUT ENDPOINTS ==="));
    assert!(text.contains("GET https://api.prod.whoop.com/activities-service/v0/workouts"));
}

/// Test 2: Unreadable capture path is a read error
#[test]
fn test_missing_capture() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let result = load_capture(dir.path().join("missing.chlsj"));

    assert!(matches!(result, Err(AnalyzerError::Read { .. })));
}
