//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strength_sync::config::Config;
use strength_sync::platforms::peloton::PelotonEndpoints;
use strength_sync::platforms::whoop::WhoopEndpoints;
use strength_sync::sync::{SyncOptions, SyncOrchestrator};

/// Lookback wide enough to include the fixed 2025 fixtures
pub const WIDE_LOOKBACK_DAYS: u32 = 3650;

/// Configuration pointing both platforms at mock servers
///
/// Retries and pacing are disabled and Whoop uses a static token.
pub fn create_test_config(peloton: &MockServer, whoop: &MockServer) -> Config {
    let yaml = r#"
source:
  username: "rider@example.com"
  password: "pedal"
  retry:
    max_retries: 0
    requests_per_minute: 0
target:
  access_token: "test-token"
  retry:
    max_retries: 0
    requests_per_minute: 0
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#;
    let mut config = Config::from_yaml(yaml).expect("Failed to parse test config");
    config.source.endpoints = PelotonEndpoints::for_base_url(&peloton.uri());
    config.target.endpoints = WhoopEndpoints::for_base_url(&whoop.uri());
    config.target.auth_url = format!("{}/oauth/token", whoop.uri());
    config
        .validate()
        .expect("Test config should pass validation");
    config
}

/// Orchestrator over real adapters built from `config`
pub fn create_test_orchestrator(config: &Config, dry_run: bool) -> SyncOrchestrator {
    let options = SyncOptions {
        days_back: WIDE_LOOKBACK_DAYS,
        ..SyncOptions::from_config(config, None, dry_run)
    };
    SyncOrchestrator::from_config(config, options).expect("Failed to build orchestrator")
}

/// Mount Peloton login, one strength workout `E1` at 2025-04-20T10:00:00Z
/// lasting 1800 s, and its performance graph with `Squat:5x135`
pub async fn mount_peloton_e1(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "user_id": "u-1",
                "session_id": "s-1"
            })),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/user/u-1/workouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "E1",
                    "fitness_discipline": "strength",
                    "created_at": "2025-04-20T10:00:00Z",
                    "start_time": "2025-04-20T10:00:00Z",
                    "end_time": "2025-04-20T10:30:00Z",
                    "ride": {"title": "30 min Full Body Strength", "duration": 1800}
                },
                {
                    "id": "C1",
                    "fitness_discipline": "cycling",
                    "created_at": "2025-04-20T08:00:00Z",
                    "start_time": "2025-04-20T08:00:00Z"
                }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/workout/E1/performance_graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "segment_list": [
                {
                    "name": "Squat",
                    "metrics": [
                        {"slug": "count", "display_name": "Reps", "value": 5},
                        {"slug": "total_weight", "display_name": "Weight", "value": 135}
                    ]
                }
            ]
        })))
        .mount(server)
        .await;
}

/// Whoop strength activity record
pub fn whoop_activity(id: u64, time_created: &str, workout_id: Option<&str>) -> Value {
    let mut record = json!({
        "id": id,
        "sport_id": 1,
        "time_created": time_created
    });
    if let Some(workout_id) = workout_id {
        record["workout_id"] = json!(workout_id);
    }
    record
}

/// Mount the Whoop activity listing with `records`
pub async fn mount_whoop_activities(server: &MockServer, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/activities-service/v1/sports/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": records })))
        .mount(server)
        .await;
}

/// Mount the Whoop workout listing with `records`
pub async fn mount_whoop_workouts(server: &MockServer, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/activities-service/v0/workouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": records })))
        .mount(server)
        .await;
}

/// Write requests received by a mock server
pub async fn write_requests(server: &MockServer) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() != "GET")
        .collect()
}
