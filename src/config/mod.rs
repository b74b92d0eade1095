//! Configuration management for strength-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files. String values may reference environment variables with the
//! `${VAR_NAME}` syntax so credentials can stay out of the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::platforms::peloton::PelotonEndpoints;
use crate::platforms::whoop::WhoopEndpoints;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Source platform (Peloton) configuration
    pub source: SourceConfig,

    /// Target platform (Whoop) configuration
    pub target: TargetConfig,

    /// Reconciliation settings
    pub settings: SettingsConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file without validating it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileRead(format!(
                "Config file not found: {}. Copy config.example.yaml and fill in your credentials.",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Validate values that the YAML schema alone cannot enforce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_value(&self.source.username) {
            return Err(ConfigError::MissingRequired("source.username".to_string()));
        }
        if !has_value(&self.source.password) {
            return Err(ConfigError::MissingRequired("source.password".to_string()));
        }

        if !self.target.has_credentials() {
            return Err(ConfigError::MissingRequired(
                "target credentials: provide access_token, refresh_token with client_id and \
                 client_secret, or email and password"
                    .to_string(),
            ));
        }

        if self.settings.lookback_days == 0 {
            return Err(ConfigError::InvalidValue(
                "settings.lookback_days must be greater than zero".to_string(),
            ));
        }
        if self.settings.time_threshold_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "settings.time_threshold_minutes must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.interval_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.interval_hours must be greater than zero".to_string(),
            ));
        }

        self.source.retry.validate("source.retry")?;
        self.target.retry.validate("target.retry")?;

        Ok(())
    }
}

/// Source platform configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Platform name, also matched against target workout titles
    #[serde(default = "default_source_platform_name")]
    pub platform_name: String,

    /// Account username or email
    pub username: String,

    /// Account password
    pub password: String,

    /// Maximum number of workouts requested per fetch
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Retry and pacing policy
    #[serde(default = "default_source_retry")]
    pub retry: RetryPolicy,

    /// Endpoint candidate tables
    #[serde(default)]
    pub endpoints: PelotonEndpoints,
}

fn default_source_platform_name() -> String {
    "peloton".to_string()
}

fn default_page_limit() -> u32 {
    50
}

fn default_source_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay_secs: 1.0,
        max_delay_secs: 60.0,
        jitter_fraction: 0.3,
        requests_per_minute: 60,
    }
}

/// Target platform configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Platform name used in logs and errors
    #[serde(default = "default_target_platform_name")]
    pub platform_name: String,

    /// OAuth client id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// OAuth refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Pre-issued access token
    #[serde(default, alias = "api_key")]
    pub access_token: Option<String>,

    /// Account email for the password grant
    #[serde(default)]
    pub email: Option<String>,

    /// Account password for the password grant
    #[serde(default)]
    pub password: Option<String>,

    /// Token endpoint for the refresh-token grant
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Token endpoint for the password grant
    #[serde(default = "default_legacy_auth_url")]
    pub legacy_auth_url: String,

    /// Client id sent with the password grant
    #[serde(default = "default_legacy_client_id")]
    pub legacy_client_id: String,

    /// IANA timezone name sent with created workouts
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// UTC offset of `timezone`, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Sport id of strength training
    #[serde(default = "default_strength_sport_id")]
    pub strength_sport_id: u32,

    /// Maximum number of records requested per fetch
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Retry and pacing policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Endpoint candidate tables
    #[serde(default)]
    pub endpoints: WhoopEndpoints,
}

impl TargetConfig {
    /// Whether at least one authentication path is configured
    pub fn has_credentials(&self) -> bool {
        let token = is_present(&self.access_token);
        let refresh = is_present(&self.refresh_token)
            && is_present(&self.client_id)
            && is_present(&self.client_secret);
        let password = is_present(&self.email) && is_present(&self.password);
        token || refresh || password
    }
}

fn default_target_platform_name() -> String {
    "whoop".to_string()
}

fn default_auth_url() -> String {
    "https://api.prod.whoop.com/oauth/token".to_string()
}

fn default_legacy_auth_url() -> String {
    "https://api-7.whoop.com/oauth/token".to_string()
}

fn default_legacy_client_id() -> String {
    "whoop-recruiting-prod".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_strength_sport_id() -> u32 {
    1
}

/// Upper bound for configured retry delays, one day
pub const MAX_RETRY_DELAY_SECS: f64 = 86_400.0;

/// Retry and pacing policy for one platform client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, in seconds
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,

    /// Upper bound for any single backoff, in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    /// Uniform jitter applied as `1 ± jitter_fraction`
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Long-run request rate ceiling; 0 disables pacing
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter_fraction: default_jitter_fraction(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl RetryPolicy {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(ConfigError::InvalidValue(format!(
                "{}.jitter_fraction must be in [0, 1)",
                section
            )));
        }
        for (name, value) in [
            ("base_delay_secs", self.base_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
        ] {
            if !value.is_finite() || !(0.0..=MAX_RETRY_DELAY_SECS).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.{} must be between 0 and {} seconds",
                    section, name, MAX_RETRY_DELAY_SECS
                )));
            }
        }
        Ok(())
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    3.0
}

fn default_max_delay() -> f64 {
    180.0
}

fn default_jitter_fraction() -> f64 {
    0.3
}

fn default_requests_per_minute() -> u32 {
    10
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsConfig {
    /// How many days back to look on both platforms
    pub lookback_days: u32,

    /// Maximum distance between a source event and a target activity
    pub time_threshold_minutes: u32,

    /// Overall deadline for one run, in seconds
    #[serde(default = "default_run_deadline")]
    pub run_deadline_secs: u64,
}

fn default_run_deadline() -> u64 {
    3600
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    /// Hours between runs
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Delay before the first run, in seconds
    #[serde(default)]
    pub initial_delay_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            initial_delay_secs: 0,
        }
    }
}

fn default_interval_hours() -> u64 {
    12
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(has_value)
}

/// Non-blank and free of unresolved `${VAR}` references
fn has_value(value: &str) -> bool {
    !value.trim().is_empty() && !env_var_pattern().is_match(value)
}

fn env_var_pattern() -> regex_lite::Regex {
    regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion")
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unknown variables are left untouched and
/// count as missing during validation.
fn expand_env_vars(input: &str) -> String {
    env_var_pattern().replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
source:
  username: "rider@example.com"
  password: "pedal"
target:
  refresh_token: "refresh"
  client_id: "client"
  client_secret: "secret"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#;

    // Test 1: Parse complete configuration from YAML
    #[test]
    fn test_parse_complete_yaml_config() {
        let yaml = r#"
source:
  platform_name: "Peloton"
  username: "rider@example.com"
  password: "pedal"
  page_limit: 20
  retry:
    max_retries: 5
    base_delay_secs: 0.5
    max_delay_secs: 10
    jitter_fraction: 0.1
    requests_per_minute: 120

target:
  client_id: "client"
  client_secret: "secret"
  refresh_token: "refresh"
  timezone: "America/Los_Angeles"
  utc_offset_minutes: -420
  strength_sport_id: 45
  retry:
    requests_per_minute: 6

settings:
  lookback_days: 14
  time_threshold_minutes: 45
  run_deadline_secs: 900

scheduler:
  interval_hours: 6
  initial_delay_secs: 30

logging:
  level: "debug"
  format: "json"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.source.platform_name, "Peloton");
        assert_eq!(config.source.page_limit, 20);
        assert_eq!(config.source.retry.max_retries, 5);
        assert!((config.source.retry.base_delay_secs - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.source.retry.requests_per_minute, 120);

        assert_eq!(config.target.client_id.as_deref(), Some("client"));
        assert_eq!(config.target.timezone, "America/Los_Angeles");
        assert_eq!(config.target.utc_offset_minutes, -420);
        assert_eq!(config.target.strength_sport_id, 45);
        assert_eq!(config.target.retry.requests_per_minute, 6);
        // Unspecified retry fields fall back to defaults
        assert_eq!(config.target.retry.max_retries, 3);

        assert_eq!(config.settings.lookback_days, 14);
        assert_eq!(config.settings.time_threshold_minutes, 45);
        assert_eq!(config.settings.run_deadline_secs, 900);

        assert_eq!(config.scheduler.interval_hours, 6);
        assert_eq!(config.scheduler.initial_delay_secs, 30);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    // Test 2: Default values are applied for missing optional fields
    #[test]
    fn test_default_values_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.source.platform_name, "peloton");
        assert_eq!(config.source.page_limit, 50);
        assert_eq!(config.source.retry, default_source_retry());
        assert!(!config.source.endpoints.workouts.is_empty());

        assert_eq!(config.target.platform_name, "whoop");
        assert_eq!(config.target.auth_url, "https://api.prod.whoop.com/oauth/token");
        assert_eq!(config.target.legacy_client_id, "whoop-recruiting-prod");
        assert_eq!(config.target.strength_sport_id, 1);
        assert_eq!(config.target.retry, RetryPolicy::default());
        assert!(!config.target.endpoints.find_strength_activities.is_empty());

        assert_eq!(config.settings.run_deadline_secs, 3600);
        assert_eq!(config.scheduler.interval_hours, 12);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("STRENGTH_SYNC_TEST_PASSWORD", "from_env");

        let yaml = MINIMAL.replace("\"pedal\"", "\"${STRENGTH_SYNC_TEST_PASSWORD}\"");
        let config = Config::from_yaml(&yaml).unwrap();

        assert_eq!(config.source.password, "from_env");

        std::env::remove_var("STRENGTH_SYNC_TEST_PASSWORD");
    }

    // Test 4: A missing section is named in the error
    #[test]
    fn test_missing_section_is_named() {
        let yaml = r#"
source:
  username: "rider"
  password: "pedal"
target:
  access_token: "token"
"#;

        match Config::from_yaml(yaml) {
            Err(ConfigError::Parse(msg)) => assert!(msg.contains("settings"), "{}", msg),
            other => panic!("Expected ConfigError::Parse, got {:?}", other),
        }
    }

    // Test 5: A missing required setting is named in the error
    #[test]
    fn test_missing_setting_is_named() {
        let yaml = MINIMAL.replace("  time_threshold_minutes: 30\n", "");

        match Config::from_yaml(&yaml) {
            Err(ConfigError::Parse(msg)) => {
                assert!(msg.contains("time_threshold_minutes"), "{}", msg)
            }
            other => panic!("Expected ConfigError::Parse, got {:?}", other),
        }
    }

    // Test 6: Non-numeric settings are rejected
    #[test]
    fn test_non_numeric_setting() {
        let yaml = MINIMAL.replace("lookback_days: 7", "lookback_days: not_a_number");

        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    // Test 7: Empty source password fails validation
    #[test]
    fn test_empty_source_password() {
        let yaml = MINIMAL.replace("password: \"pedal\"", "password: \"\"");
        let config = Config::from_yaml(&yaml).unwrap();

        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired("source.password".to_string()))
        );
    }

    // Test 8: Target needs at least one credential path
    #[test]
    fn test_incomplete_target_credentials() {
        let yaml = r#"
source:
  username: "rider"
  password: "pedal"
target:
  refresh_token: "refresh"
  client_id: "client"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();

        match config.validate() {
            Err(ConfigError::MissingRequired(msg)) => {
                assert!(msg.starts_with("target credentials"))
            }
            other => panic!("Expected MissingRequired, got {:?}", other),
        }
    }

    // Test 9: api_key is accepted as an access token
    #[test]
    fn test_api_key_alias() {
        let yaml = r#"
source:
  username: "rider"
  password: "pedal"
target:
  api_key: "legacy-key"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.target.access_token.as_deref(), Some("legacy-key"));
        assert!(config.validate().is_ok());
    }

    // Test 10: Email and password are a complete credential path
    #[test]
    fn test_email_password_credentials() {
        let yaml = MINIMAL.replace(
            "  refresh_token: \"refresh\"\n  client_id: \"client\"\n  client_secret: \"secret\"\n",
            "  email: \"me@example.com\"\n  password: \"secret\"\n",
        );
        let config = Config::from_yaml(&yaml).unwrap();

        assert!(config.target.has_credentials());
        assert!(config.validate().is_ok());
    }

    // Test 11: Zero threshold and bad jitter are rejected
    #[test]
    fn test_invalid_values() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.settings.time_threshold_minutes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("time_threshold_minutes")
        ));

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.target.retry.jitter_fraction = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("target.retry")
        ));
    }

    // Test 12: load reads and validates a file
    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.settings.lookback_days, 7);
    }

    // Test 13: Missing file produces a helpful error
    #[test]
    fn test_missing_file() {
        match Config::load("/nonexistent/strength-sync.yaml") {
            Err(ConfigError::FileRead(msg)) => assert!(msg.contains("config.example.yaml")),
            other => panic!("Expected FileRead, got {:?}", other),
        }
    }

    // Test 14: Config serialization round-trip
    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(config, parsed);
    }

    // Test 15: Unresolved environment references count as missing
    #[test]
    fn test_unset_env_var_is_missing() {
        std::env::remove_var("STRENGTH_SYNC_TEST_UNSET_USERNAME");
        std::env::remove_var("STRENGTH_SYNC_TEST_UNSET_TOKEN");

        let yaml = MINIMAL.replace(
            "\"rider@example.com\"",
            "\"${STRENGTH_SYNC_TEST_UNSET_USERNAME}\"",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired("source.username".to_string()))
        );

        let yaml = r#"
source:
  username: "rider"
  password: "pedal"
target:
  access_token: "${STRENGTH_SYNC_TEST_UNSET_TOKEN}"
settings:
  lookback_days: 7
  time_threshold_minutes: 30
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(!config.target.has_credentials());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(msg)) if msg.starts_with("target credentials")
        ));
    }

    // Test 16: Retry delays must be finite and bounded
    #[test]
    fn test_retry_delay_bounds() {
        let yaml = MINIMAL.replace(
            "target:\n",
            "target:\n  retry:\n    max_delay_secs: .inf\n",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("target.retry.max_delay_secs")
        ));

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.source.retry.base_delay_secs = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("source.retry.base_delay_secs")
        ));

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.source.retry.max_delay_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.source.retry.max_delay_secs = MAX_RETRY_DELAY_SECS;
        assert!(config.validate().is_ok());
    }
}
