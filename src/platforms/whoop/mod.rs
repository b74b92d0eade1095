//! Whoop target adapter
//!
//! Whoop's workout endpoints are undocumented and have changed shape over
//! time, so every operation is resolved against a candidate table covering
//! the observed unofficial endpoints and the official developer API.

pub mod auth;
pub mod normalize;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{
    EndpointCandidate, EndpointResolver, HttpMethod, HttpResponse, Operation,
    RateLimitedExecutor, ResponseShape, TemplateVars,
};
use crate::config::TargetConfig;
use crate::error::{AdapterError, AuthError, SyncError};
use crate::models::{Exercise, TargetActivity, TargetWorkout};
use crate::platforms::{format_api_time, TargetAdapter};

pub use auth::TokenManager;

/// Default API host
pub const WHOOP_BASE_URL: &str = "https://api.prod.whoop.com";

/// Endpoint candidate tables for Whoop operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoopEndpoints {
    /// Strength activity listing
    pub find_strength_activities: Vec<EndpointCandidate>,
    /// Workout listing
    pub list_workouts: Vec<EndpointCandidate>,
    /// Workout creation
    pub create_workout: Vec<EndpointCandidate>,
    /// Workout-to-activity link
    pub link_workout: Vec<EndpointCandidate>,
}

impl Default for WhoopEndpoints {
    fn default() -> Self {
        Self::for_base_url(WHOOP_BASE_URL)
    }
}

impl WhoopEndpoints {
    /// Default tables against `base_url`
    pub fn for_base_url(base_url: &str) -> Self {
        let sports_history = |shape| {
            EndpointCandidate::new(
                base_url,
                "/activities-service/v1/sports/history",
                HttpMethod::Get,
                shape,
            )
            .with_query("startTime", "{start}")
            .with_query("endTime", "{end}")
            .with_query("limit", "{limit}")
        };
        let official_workouts = EndpointCandidate::new(
            base_url,
            "/developer/v1/activity/workout",
            HttpMethod::Get,
            ResponseShape::Records,
        )
        .with_query("start", "{start}")
        .with_query("end", "{end}")
        .with_query("limit", "25");

        Self {
            find_strength_activities: vec![
                sports_history(ResponseShape::Records),
                sports_history(ResponseShape::Data),
                sports_history(ResponseShape::BareList),
                official_workouts.clone(),
            ],
            list_workouts: vec![
                EndpointCandidate::new(
                    base_url,
                    "/activities-service/v0/workouts",
                    HttpMethod::Get,
                    ResponseShape::Records,
                )
                .with_query("start", "{start}")
                .with_query("sport_id", "{sport_id}")
                .with_query("limit", "{limit}"),
                official_workouts,
            ],
            create_workout: vec![EndpointCandidate::new(
                base_url,
                "/activities-service/v0/workouts",
                HttpMethod::Post,
                ResponseShape::SingleObject,
            )
            .accepting(&[200, 201, 409])],
            link_workout: vec![
                EndpointCandidate::new(
                    base_url,
                    "/weightlifting-service/v2/weightlifting-workout/link-cardio-workout",
                    HttpMethod::Post,
                    ResponseShape::Empty,
                )
                .accepting(&[200, 201, 204]),
                EndpointCandidate::new(
                    base_url,
                    "/activities-service/v1/activities/{activity_id}/workout",
                    HttpMethod::Post,
                    ResponseShape::Empty,
                )
                .accepting(&[200, 201, 204]),
            ],
        }
    }
}

/// Target adapter for Whoop
pub struct WhoopAdapter {
    config: TargetConfig,
    source_platform: String,
    executor: RateLimitedExecutor,
    resolver: EndpointResolver,
    tokens: TokenManager,
}

impl WhoopAdapter {
    /// Create an adapter with its own executor and an empty resolver memo
    ///
    /// `source_platform` is recorded on linked workouts.
    pub fn new(config: TargetConfig, source_platform: &str) -> Result<Self, SyncError> {
        let executor = RateLimitedExecutor::new(config.retry.clone())?;
        Ok(Self::with_executor(config, source_platform, executor))
    }

    /// Create an adapter around an existing executor
    pub fn with_executor(
        config: TargetConfig,
        source_platform: &str,
        executor: RateLimitedExecutor,
    ) -> Self {
        let tokens = TokenManager::new(config.clone(), executor.clone());
        Self {
            config,
            source_platform: source_platform.to_string(),
            executor,
            resolver: EndpointResolver::new(),
            tokens,
        }
    }

    async fn send_candidate(
        &self,
        candidate: &EndpointCandidate,
        vars: &TemplateVars,
        token: &str,
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
                    .query(&query)
                    .header(AUTHORIZATION, format!("Bearer {}", token))
                    .header(ACCEPT, "application/json")
                    .header("x-whoop-device-platform", "API")
                    .header("locale", "en_US")
                    .header("x-whoop-time-zone", self.config.timezone.as_str());
                if let Some(body) = body {
                    request = request.json(body);
                }
                request
            })
            .await
    }

    /// Send with the bearer token, refreshing once on 401
    async fn send_authorized(
        &self,
        candidate: EndpointCandidate,
        vars: &TemplateVars,
        body: Option<&Value>,
    ) -> Result<HttpResponse, SyncError> {
        let token = self.tokens.access_token().await.map_err(|e| {
            warn!(error = %e, "No Whoop access token");
            SyncError::Unauthorized
        })?;

        let response = self.send_candidate(&candidate, vars, &token, body).await?;
        if response.status != 401 {
            return Ok(response);
        }

        warn!(endpoint = %candidate.label(), "Access token rejected, refreshing");
        match self.tokens.refresh().await {
            Ok(token) => self.send_candidate(&candidate, vars, &token, body).await,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Ok(response)
            }
        }
    }

    fn window_vars(&self, days_back: u32) -> TemplateVars {
        let end = Utc::now();
        let start = end - Duration::days(i64::from(days_back));

        let mut vars = TemplateVars::new();
        vars.insert("start".to_string(), format_api_time(start));
        vars.insert("end".to_string(), format_api_time(end));
        vars.insert("limit".to_string(), self.config.page_limit.to_string());
        vars.insert(
            "sport_id".to_string(),
            self.config.strength_sport_id.to_string(),
        );
        vars
    }
}

#[async_trait]
impl TargetAdapter for WhoopAdapter {
    fn platform_name(&self) -> &str {
        &self.config.platform_name
    }

    async fn authenticate(&self) -> Result<(), AuthError> {
        self.tokens.access_token().await.map(|_| ())
    }

    async fn fetch_recent_activities(
        &self,
        days_back: u32,
    ) -> Result<Vec<TargetActivity>, AdapterError> {
        let vars = self.window_vars(days_back);
        let resolved = self
            .resolver
            .resolve(
                Operation::FindStrengthActivities,
                &self.config.endpoints.find_strength_activities,
                |candidate| self.send_authorized(candidate, &vars, None),
            )
            .await?;

        let activities: Vec<TargetActivity> = resolved
            .records
            .iter()
            .filter(|record| normalize::is_strength_activity(record, self.config.strength_sport_id))
            .filter_map(|record| match normalize::normalize_activity(record) {
                Ok(activity) => Some(activity),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Whoop activity");
                    None
                }
            })
            .collect();

        info!(
            fetched = resolved.records.len(),
            strength = activities.len(),
            "Fetched Whoop strength activities"
        );
        Ok(activities)
    }

    async fn fetch_recent_workouts(
        &self,
        days_back: u32,
    ) -> Result<Vec<TargetWorkout>, AdapterError> {
        let vars = self.window_vars(days_back);
        let resolved = self
            .resolver
            .resolve(
                Operation::ListWorkouts,
                &self.config.endpoints.list_workouts,
                |candidate| self.send_authorized(candidate, &vars, None),
            )
            .await?;

        let workouts: Vec<TargetWorkout> = resolved
            .records
            .iter()
            .filter_map(|record| match normalize::normalize_workout(record) {
                Ok(workout) => Some(workout),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Whoop workout");
                    None
                }
            })
            .collect();

        info!(count = workouts.len(), "Fetched Whoop workouts");
        Ok(workouts)
    }

    async fn create_workout(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sport_id: u32,
    ) -> Result<TargetWorkout, AdapterError> {
        let body =
            normalize::create_workout_body(start, end, sport_id, self.config.utc_offset_minutes);
        let vars = TemplateVars::new();

        let resolved = self
            .resolver
            .resolve(
                Operation::CreateWorkout,
                &self.config.endpoints.create_workout,
                |candidate| self.send_authorized(candidate, &vars, Some(&body)),
            )
            .await?;

        let record = resolved.records.first();
        if resolved.response.status == 409 {
            let existing = record
                .and_then(normalize::conflict_workout_id)
                .ok_or_else(|| AdapterError::Rejected {
                    operation: Operation::CreateWorkout,
                    reason: "conflict without overlapping workout ids".to_string(),
                })?;
            info!(workout_id = %existing, "Workout already exists for this time range");
            return Ok(TargetWorkout::with_id(existing));
        }

        let workout = record
            .and_then(|r| normalize::normalize_workout(r).ok())
            .ok_or_else(|| AdapterError::Rejected {
                operation: Operation::CreateWorkout,
                reason: format!(
                    "no workout id in response: {}",
                    resolved.response.body_snippet()
                ),
            })?;

        info!(workout_id = %workout.id, "Created Whoop workout");
        Ok(workout)
    }

    async fn link_workout_to_activity(
        &self,
        activity_id: &str,
        workout_id: &str,
        exercises: &[Exercise],
    ) -> Result<(), AdapterError> {
        let body = normalize::link_body(activity_id, workout_id, &self.source_platform, exercises);
        let mut vars = TemplateVars::new();
        vars.insert("activity_id".to_string(), activity_id.to_string());
        vars.insert("workout_id".to_string(), workout_id.to_string());

        self.resolver
            .resolve(
                Operation::LinkWorkout,
                &self.config.endpoints.link_workout,
                |candidate| self.send_authorized(candidate, &vars, Some(&body)),
            )
            .await?;

        info!(
            activity_id = %activity_id,
            workout_id = %workout_id,
            "Linked workout to activity"
        );
        Ok(())
    }
}
