//! HTTP plumbing shared by the platform adapters
//!
//! # Components
//!
//! - [`executor`]: Rate-limited executor with exponential backoff for transient failures
//! - [`endpoint`]: Endpoint candidates, response shapes and logical operations
//! - [`resolver`]: Candidate cascade with per-operation memoization of the winner
//!
//! # Example
//!
//! ```ignore
//! use strength_sync::client::{EndpointResolver, Operation, RateLimitedExecutor};
//! use strength_sync::config::RetryPolicy;
//!
//! let executor = RateLimitedExecutor::new(RetryPolicy::default())?;
//! let resolver = EndpointResolver::new();
//!
//! let resolved = resolver
//!     .resolve(Operation::ListWorkouts, &candidates, |candidate| async move {
//!         let url = candidate.url(&vars).map_err(SyncError::InvalidData)?;
//!         executor.send(|client| client.get(url.as_str())).await
//!     })
//!     .await?;
//! ```

pub mod endpoint;
pub mod executor;
pub mod resolver;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::SyncError;

pub use endpoint::{
    fill_template, EndpointCandidate, HttpMethod, Operation, ResponseShape, TemplateVars,
};
pub use executor::RateLimitedExecutor;
pub use resolver::{EndpointResolver, Resolved};

/// A fully read HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// `Retry-After` header in seconds, when present and numeric
    pub retry_after: Option<u64>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a response without a Retry-After hint
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| SyncError::InvalidData(format!("invalid JSON body: {}", e)))
    }

    /// Body as lossy UTF-8, truncated for log and error messages
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(200).collect()
    }
}
