//! Configuration loading integration tests
//!
//! Tests loading configuration files from disk:
//! - Complete file with defaults filled in
//! - Missing file guidance
//! - Validation errors naming the field
//! - The shipped example configuration
//! - Unset environment references

use std::io::Write;
use std::path::Path;

use strength_sync::config::{Config, ConfigError};
use strength_sync::sync::{SchedulerConfig, SyncOptions};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp config");
    file
}

/// Test 1: A complete file loads, validates, and feeds run options
#[test]
fn test_load_config_file() {
    let file = write_config(
        r#"
source:
  username: "rider@example.com"
  password: "pedal"
target:
  client_id: "client"
  client_secret: "secret"
  refresh_token: "refresh"
  strength_sport_id: 45
settings:
  lookback_days: 14
  time_threshold_minutes: 20
  run_deadline_secs: 900
scheduler:
  interval_hours: 6
logging:
  level: "debug"
  format: "json"
"#,
    );

    let config = Config::load(file.path()).expect("Config should load");

    assert_eq!(config.source.platform_name, "peloton");
    assert_eq!(config.target.platform_name, "whoop");
    assert_eq!(config.logging.format, "json");

    let options = SyncOptions::from_config(&config, None, false);
    assert_eq!(options.days_back, 14);
    assert_eq!(options.time_threshold_minutes, 20);
    assert_eq!(options.strength_sport_id, 45);
    assert_eq!(options.run_deadline.as_secs(), 900);

    let options = SyncOptions::from_config(&config, Some(3), true);
    assert_eq!(options.days_back, 3);
    assert!(options.dry_run);

    let scheduler = SchedulerConfig::from(&config.scheduler);
    assert_eq!(scheduler.interval.as_secs(), 6 * 3600);
}

/// Test 2: A missing file points at the example configuration
#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.yaml");

    match Config::load(&path) {
        Err(ConfigError::FileRead(message)) => {
            assert!(message.contains("config.example.yaml"));
        }
        other => panic!("Expected FileRead error, got {:?}", other),
    }
}

/// Test 3: Validation failures name the offending field
#[test]
fn test_validation_names_field() {
    let file = write_config(
        r#"
source:
  username: "rider@example.com"
  password: ""
target:
  access_token: "token"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#,
    );

    let err = Config::load(file.path()).unwrap_err();

    assert_eq!(
        err,
        ConfigError::MissingRequired("source.password".to_string())
    );
}

/// Test 4: The shipped example configuration validates once its variables are set
#[test]
fn test_example_config_loads() {
    for (name, value) in [
        ("PELOTON_USERNAME", "rider@example.com"),
        ("PELOTON_PASSWORD", "pedal"),
        ("WHOOP_CLIENT_ID", "client"),
        ("WHOOP_CLIENT_SECRET", "secret"),
        ("WHOOP_REFRESH_TOKEN", "refresh"),
    ] {
        std::env::set_var(name, value);
    }
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.yaml");

    let config = Config::load(&path).expect("Example config should load");

    assert_eq!(config.source.username, "rider@example.com");
    assert_eq!(config.target.refresh_token.as_deref(), Some("refresh"));
    assert!(config.target.has_credentials());
    assert!(!config.target.endpoints.find_strength_activities.is_empty());
    assert!(!config.source.endpoints.login.is_empty());
}

/// Test 5: An unset variable fails at load time naming the field
#[test]
fn test_unset_variable_fails_load() {
    std::env::remove_var("STRENGTH_SYNC_IT_UNSET_USERNAME");
    let file = write_config(
        r#"
source:
  username: "${STRENGTH_SYNC_IT_UNSET_USERNAME}"
  password: "pedal"
target:
  access_token: "token"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#,
    );

    let err = Config::load(file.path()).unwrap_err();

    assert_eq!(
        err,
        ConfigError::MissingRequired("source.username".to_string())
    );
}
