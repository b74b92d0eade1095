//! Peloton source adapter
//!
//! Logs in with username and password, keeps the session cookie, and turns
//! strength workouts plus their performance graphs into [`SourceEvent`]s.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::COOKIE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{
    EndpointCandidate, EndpointResolver, HttpMethod, HttpResponse, Operation,
    RateLimitedExecutor, ResponseShape, TemplateVars,
};
use crate::config::SourceConfig;
use crate::error::{AdapterError, AuthError, MalformedRecord, SyncError};
use crate::models::{Exercise, SourceEvent};
use crate::platforms::{first_str, parse_instant, value_to_id, SourceAdapter};

/// Default API host
pub const PELOTON_BASE_URL: &str = "https://api.onepeloton.com";

/// Endpoint candidate tables for Peloton operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PelotonEndpoints {
    /// Session login
    pub login: Vec<EndpointCandidate>,
    /// Workout listing
    pub workouts: Vec<EndpointCandidate>,
    /// Performance graph of one workout
    pub performance: Vec<EndpointCandidate>,
}

impl Default for PelotonEndpoints {
    fn default() -> Self {
        Self::for_base_url(PELOTON_BASE_URL)
    }
}

impl PelotonEndpoints {
    /// Default tables against `base_url`
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            login: vec![EndpointCandidate::new(
                base_url,
                "/auth/login",
                HttpMethod::Post,
                ResponseShape::SingleObject,
            )],
            workouts: vec![EndpointCandidate::new(
                base_url,
                "/api/user/{user_id}/workouts",
                HttpMethod::Get,
                ResponseShape::Data,
            )
            .with_query("joins", "ride,ride.instructor")
            .with_query("limit", "{limit}")
            .with_query("page", "0")
            .with_query("sort_by", "-created")],
            performance: vec![EndpointCandidate::new(
                base_url,
                "/api/workout/{workout_id}/performance_graph",
                HttpMethod::Get,
                ResponseShape::SingleObject,
            )],
        }
    }
}

#[derive(Debug, Clone)]
struct PelotonSession {
    user_id: String,
    session_id: String,
}

/// Source adapter for Peloton
pub struct PelotonAdapter {
    config: SourceConfig,
    executor: RateLimitedExecutor,
    resolver: EndpointResolver,
    session: RwLock<Option<PelotonSession>>,
}

impl PelotonAdapter {
    /// Create an adapter with its own executor and an empty resolver memo
    pub fn new(config: SourceConfig) -> Result<Self, SyncError> {
        let executor = RateLimitedExecutor::new(config.retry.clone())?;
        Ok(Self::with_executor(config, executor))
    }

    /// Create an adapter around an existing executor
    pub fn with_executor(config: SourceConfig, executor: RateLimitedExecutor) -> Self {
        Self {
            config,
            executor,
            resolver: EndpointResolver::new(),
            session: RwLock::new(None),
        }
    }

    async fn login(&self) -> Result<PelotonSession, AuthError> {
        let platform = self.config.platform_name.clone();
        let body = json!({
            "username_or_email": self.config.username,
            "password": self.config.password,
        });
        let vars = TemplateVars::new();

        let resolved = self
            .resolver
            .resolve(Operation::SourceLogin, &self.config.endpoints.login, |candidate| {
                self.send_candidate(candidate, &vars, None, Some(&body))
            })
            .await?;

        let record = resolved
            .records
            .first()
            .ok_or_else(|| AuthError::MalformedResponse {
                platform: platform.clone(),
                reason: "empty login response".to_string(),
            })?;

        let user_id =
            value_to_id(record.get("user_id")).ok_or_else(|| AuthError::MalformedResponse {
                platform: platform.clone(),
                reason: "missing user_id".to_string(),
            })?;
        let session_id =
            value_to_id(record.get("session_id")).ok_or_else(|| AuthError::MalformedResponse {
                platform: platform.clone(),
                reason: "missing session_id".to_string(),
            })?;

        info!(platform = %platform, user_id = %user_id, "Authenticated");
        let session = PelotonSession {
            user_id,
            session_id,
        };
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn current_session(&self) -> Result<PelotonSession, AuthError> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }
        self.login().await
    }

    async fn send_candidate(
        &self,
        candidate: EndpointCandidate,
        vars: &TemplateVars,
        session_id: Option<&str>,
        body: Option<&Value>,
    ) -> Result<HttpResponse, SyncError> {
        let url = candidate.url(vars).map_err(SyncError::InvalidData)?;
        let query = candidate
            .query_pairs(vars)
            .map_err(SyncError::InvalidData)?;

        self.executor
            .send(|client| {
                let mut request = client
                    .request(candidate.method.into(), url.as_str())
                    .query(&query);
                if let Some(id) = session_id {
                    request = request.header(COOKIE, format!("peloton_session_id={}", id));
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                request
            })
            .await
    }

    /// Send with the session cookie, logging in again once on 401
    async fn send_with_session(
        &self,
        candidate: EndpointCandidate,
        vars: &TemplateVars,
    ) -> Result<HttpResponse, SyncError> {
        let session = self.current_session().await.map_err(|e| {
            warn!(error = %e, "No Peloton session");
            SyncError::Unauthorized
        })?;

        let response = self
            .send_candidate(candidate.clone(), vars, Some(&session.session_id), None)
            .await?;
        if response.status != 401 {
            return Ok(response);
        }

        warn!("Peloton session rejected, logging in again");
        *self.session.write().await = None;
        match self.login().await {
            Ok(session) => {
                self.send_candidate(candidate, vars, Some(&session.session_id), None)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Peloton login retry failed");
                Ok(response)
            }
        }
    }

    async fn fetch_exercises(&self, workout_id: &str) -> Result<Vec<Exercise>, AdapterError> {
        let mut vars = TemplateVars::new();
        vars.insert("workout_id".to_string(), workout_id.to_string());

        let resolved = self
            .resolver
            .resolve(
                Operation::SourcePerformance,
                &self.config.endpoints.performance,
                |candidate| self.send_with_session(candidate, &vars),
            )
            .await?;

        Ok(resolved
            .records
            .first()
            .map(parse_exercises)
            .unwrap_or_default())
    }
}

#[async_trait]
impl SourceAdapter for PelotonAdapter {
    fn platform_name(&self) -> &str {
        &self.config.platform_name
    }

    async fn authenticate(&self) -> Result<(), AuthError> {
        self.login().await.map(|_| ())
    }

    async fn fetch_recent_events(&self, days_back: u32) -> Result<Vec<SourceEvent>, AdapterError> {
        let session = self.current_session().await?;
        let cutoff = Utc::now() - Duration::days(i64::from(days_back));

        let mut vars = TemplateVars::new();
        vars.insert("user_id".to_string(), session.user_id.clone());
        vars.insert("limit".to_string(), self.config.page_limit.to_string());

        let resolved = self
            .resolver
            .resolve(
                Operation::SourceWorkouts,
                &self.config.endpoints.workouts,
                |candidate| self.send_with_session(candidate, &vars),
            )
            .await?;

        let mut events = Vec::new();
        for record in &resolved.records {
            if !is_strength(record) {
                continue;
            }

            let mut event = match normalize_event(record) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Peloton workout");
                    continue;
                }
            };

            let recorded_at = parse_instant(record.get("created_at")).unwrap_or(event.start_time);
            if recorded_at < cutoff {
                debug!(event_id = %event.id, "Workout outside lookback window");
                continue;
            }

            match self.fetch_exercises(&event.id).await {
                Ok(exercises) => event.exercises = exercises,
                Err(e) => warn!(
                    event_id = %event.id,
                    error = %e,
                    "Performance data unavailable"
                ),
            }
            events.push(event);
        }

        info!(
            fetched = resolved.records.len(),
            strength = events.len(),
            "Fetched Peloton strength workouts"
        );
        Ok(events)
    }
}

fn is_strength(record: &Value) -> bool {
    record.get("fitness_discipline").and_then(Value::as_str) == Some("strength")
}

/// Normalize a workout record; exercises are filled in separately
pub fn normalize_event(record: &Value) -> Result<SourceEvent, MalformedRecord> {
    if !record.is_object() {
        return Err(MalformedRecord::NotAnObject);
    }

    let id = value_to_id(record.get("id")).ok_or(MalformedRecord::MissingField("id"))?;
    let start_time = parse_instant(record.get("start_time"))
        .or_else(|| parse_instant(record.get("created_at")))
        .ok_or(MalformedRecord::MissingField("start_time"))?;

    let ride = record.get("ride");
    let duration_seconds = match parse_instant(record.get("end_time")) {
        Some(end) if end > start_time => (end - start_time).num_seconds().max(0) as u64,
        _ => ride
            .and_then(|r| r.get("duration"))
            .and_then(Value::as_f64)
            .map(|d| d.max(0.0) as u64)
            .unwrap_or(0),
    };

    let title = ride
        .and_then(|r| first_str(r, &["title"]))
        .or_else(|| first_str(record, &["title"]))
        .unwrap_or_default()
        .to_string();

    Ok(SourceEvent {
        id,
        start_time,
        duration_seconds,
        title,
        exercises: Vec::new(),
    })
}

/// Extract exercises from a performance graph
///
/// Segments without a name are skipped. Metrics may be an object keyed by
/// metric name or a list.
pub fn parse_exercises(performance: &Value) -> Vec<Exercise> {
    let Some(segments) = performance.get("segment_list").and_then(Value::as_array) else {
        return Vec::new();
    };

    segments
        .iter()
        .filter_map(|segment| {
            let name = first_str(segment, &["name"])?;
            let mut exercise = Exercise::new(name, 0, 0.0);

            let metrics: Vec<&Value> = match segment.get("metrics") {
                Some(Value::Object(map)) => map.values().collect(),
                Some(Value::Array(list)) => list.iter().collect(),
                _ => Vec::new(),
            };

            for metric in metrics {
                let slug = metric.get("slug").and_then(Value::as_str).unwrap_or("");
                let display = metric
                    .get("display_name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_lowercase();
                let value = metric.get("value").and_then(Value::as_f64).unwrap_or(0.0);

                if slug == "count" || display == "reps" {
                    exercise.reps = value.max(0.0) as u32;
                } else if slug == "total_weight" || display.contains("weight") {
                    exercise.weight = value.max(0.0);
                }
            }

            Some(exercise)
        })
        .collect()
}
