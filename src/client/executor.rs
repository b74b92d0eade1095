//! Rate-limited, retrying request executor
//!
//! Every outbound call to a platform goes through a [`RateLimitedExecutor`].
//! It enforces a minimum spacing between requests derived from
//! `requests_per_minute` and retries transient failures (HTTP 429 and
//! transport errors) with exponential backoff and jitter.

use crate::client::HttpResponse;
use crate::config::RetryPolicy;
use crate::error::{RetryableError, SyncError};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// HTTP 429
const TOO_MANY_REQUESTS: u16 = 429;

/// Executor owning one platform's HTTP client and pacing clock
#[derive(Debug, Clone)]
pub struct RateLimitedExecutor {
    client: Client,
    policy: RetryPolicy,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitedExecutor {
    /// Create an executor with a 30 second request timeout
    pub fn new(policy: RetryPolicy) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, policy))
    }

    /// Create an executor around an existing reqwest client
    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Run a request thunk with pacing and retries
    ///
    /// The thunk is invoked up to `max_retries + 1` times. A 429 response or a
    /// retryable [`SyncError`] triggers a backoff and another attempt; any other
    /// response, including non-2xx statuses, is returned immediately. When
    /// retries run out the last outcome is returned as is, so a persistent 429
    /// comes back as `Ok` with status 429.
    pub async fn execute<F, Fut>(&self, request: F) -> Result<HttpResponse, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<HttpResponse, SyncError>>,
    {
        let mut attempt = 0u32;

        loop {
            self.wait_for_rate_limit().await;

            let outcome = request().await;
            let retry_after = match &outcome {
                Ok(response) if response.status == TOO_MANY_REQUESTS => response.retry_after,
                Ok(_) => return outcome,
                Err(err) if err.is_retryable() => None,
                Err(_) => return outcome,
            };

            if attempt >= self.policy.max_retries {
                warn!(
                    attempts = attempt + 1,
                    max_retries = self.policy.max_retries,
                    "Max retries exhausted"
                );
                return outcome;
            }

            let backoff = self.backoff_with_hint(attempt, retry_after);
            match &outcome {
                Ok(_) => warn!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited by upstream, backing off"
                ),
                Err(err) => debug!(
                    attempt = attempt + 1,
                    max_retries = self.policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                ),
            }

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Build and send a request through [`execute`](Self::execute)
    ///
    /// `build` is called once per attempt so every retry sends a fresh request.
    pub async fn send<B>(&self, build: B) -> Result<HttpResponse, SyncError>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        self.execute(|| {
            let request = build(&self.client);
            async move { dispatch(request).await }
        })
        .await
    }

    /// Calculate the backoff before retry number `attempt + 1`
    ///
    /// `min(max_delay, base_delay * 2^attempt)` scaled by a uniform factor in
    /// `[1 - jitter, 1 + jitter]`, never above `max_delay`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponential = self.policy.base_delay_secs * 2f64.powi(attempt.min(30) as i32);
        let capped = exponential.min(self.policy.max_delay_secs);

        let jitter = self.policy.jitter_fraction;
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };

        let delay = (capped * factor).clamp(0.0, self.policy.max_delay_secs.max(0.0));
        Duration::from_secs_f64(delay)
    }

    fn backoff_with_hint(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let backoff = self.calculate_backoff(attempt);
        match retry_after {
            Some(secs) => {
                let cap = Duration::from_secs_f64(self.policy.max_delay_secs.max(0.0));
                backoff.max(Duration::from_secs(secs)).min(cap)
            }
            None => backoff,
        }
    }

    /// Minimum spacing between requests, if pacing is enabled
    pub fn min_interval(&self) -> Option<Duration> {
        match self.policy.requests_per_minute {
            0 => None,
            rpm => Some(Duration::from_secs_f64(60.0 / rpm as f64)),
        }
    }

    /// Wait until the minimum interval since the previous request has passed
    async fn wait_for_rate_limit(&self) {
        let Some(min_interval) = self.min_interval() else {
            return;
        };

        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!(wait_ms = wait_time.as_millis() as u64, "Waiting for rate limit");
                tokio::time::sleep(wait_time).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// Send one request and read the whole response
async fn dispatch(request: RequestBuilder) -> Result<HttpResponse, SyncError> {
    let response = request.send().await.map_err(map_transport_error)?;

    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let body = response.bytes().await.map_err(map_transport_error)?;

    debug!(status = status, body_size = body.len(), "Received response");

    Ok(HttpResponse {
        status,
        retry_after,
        body,
    })
}

fn map_transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::NetworkTimeout
    } else if e.is_connect() {
        SyncError::ConnectionRefused
    } else {
        SyncError::Network(e.to_string())
    }
}
