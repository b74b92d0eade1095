//! Whoop access token management
//!
//! Tokens are obtained in this order:
//!
//! 1. A pre-issued access token from configuration
//! 2. The refresh-token grant (client id, client secret and refresh token)
//! 3. The password grant against the legacy token endpoint
//!
//! Token requests go through the platform's executor so they share its pacing.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::RateLimitedExecutor;
use crate::config::TargetConfig;
use crate::error::AuthError;

/// Seconds shaved off `expires_in` so a token is renewed before it lapses
const EXPIRY_MARGIN_SECS: i64 = 60;

const SETUP_GUIDANCE: &str = "register an application at https://developer.whoop.com and set \
     target.client_id, target.client_secret and target.refresh_token, or set target.email and \
     target.password, or set target.access_token";

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn valid_token(&self) -> Option<String> {
        let token = self.access_token.clone()?;
        match self.expires_at {
            Some(at) if at <= Utc::now() => None,
            _ => Some(token),
        }
    }
}

/// Holds and renews the Whoop access token
#[derive(Debug)]
pub struct TokenManager {
    config: TargetConfig,
    executor: RateLimitedExecutor,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Create a manager seeded with configured tokens
    pub fn new(config: TargetConfig, executor: RateLimitedExecutor) -> Self {
        let state = TokenState {
            access_token: present(&config.access_token),
            refresh_token: present(&config.refresh_token),
            expires_at: None,
        };
        Self {
            config,
            executor,
            state: Mutex::new(state),
        }
    }

    /// Current access token, authenticating when there is none or it expired
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.valid_token() {
            return Ok(token);
        }
        self.renew(&mut state).await
    }

    /// Discard the current token and obtain a new one
    ///
    /// Used after the platform rejects a token with 401. A configured static
    /// token cannot be renewed, so without a grant path this fails.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.expires_at = None;
        self.renew(&mut state).await
    }

    async fn renew(&self, state: &mut TokenState) -> Result<String, AuthError> {
        let client_id = present(&self.config.client_id);
        let client_secret = present(&self.config.client_secret);
        let email = present(&self.config.email);
        let password = present(&self.config.password);

        let mut last_error = None;

        if let (Some(refresh_token), Some(client_id), Some(client_secret)) =
            (state.refresh_token.clone(), client_id, client_secret)
        {
            let body = json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "client_id": client_id,
                "client_secret": client_secret,
            });
            match self.request_token(&self.config.auth_url, &body).await {
                Ok(token) => {
                    info!(platform = %self.config.platform_name, "Refreshed access token");
                    return Ok(self.store(state, token));
                }
                Err(e) => {
                    warn!(error = %e, "Refresh-token grant failed");
                    last_error = Some(e);
                }
            }
        }

        if let (Some(email), Some(password)) = (email, password) {
            let body = json!({
                "grant_type": "password",
                "client_id": self.config.legacy_client_id,
                "username": email,
                "password": password,
            });
            match self.request_token(&self.config.legacy_auth_url, &body).await {
                Ok(token) => {
                    info!(platform = %self.config.platform_name, "Authenticated with password grant");
                    return Ok(self.store(state, token));
                }
                Err(e) => {
                    warn!(error = %e, "Password grant failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            if present(&self.config.access_token).is_some() {
                AuthError::Rejected {
                    platform: self.config.platform_name.clone(),
                    status: 401,
                }
            } else {
                AuthError::MissingCredentials {
                    platform: self.config.platform_name.clone(),
                    guidance: SETUP_GUIDANCE.to_string(),
                }
            }
        }))
    }

    async fn request_token(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .executor
            .send(|client| {
                client
                    .post(url)
                    .header("Accept", "application/json")
                    .json(body)
            })
            .await?;

        if !response.is_success() {
            return Err(AuthError::Rejected {
                platform: self.config.platform_name.clone(),
                status: response.status,
            });
        }

        serde_json::from_slice::<TokenResponse>(&response.body).map_err(|e| {
            AuthError::MalformedResponse {
                platform: self.config.platform_name.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn store(&self, state: &mut TokenState, token: TokenResponse) -> String {
        let expires_in = token.expires_in.unwrap_or(3600);
        state.expires_at =
            Some(Utc::now() + Duration::seconds((expires_in - EXPIRY_MARGIN_SECS).max(0)));
        if let Some(refresh_token) = token.refresh_token.filter(|t| !t.is_empty()) {
            state.refresh_token = Some(refresh_token);
        }
        state.access_token = Some(token.access_token.clone());
        token.access_token
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
