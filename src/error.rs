//! Error types for strength-sync
//!
//! This module defines the error taxonomy shared by the executor, resolver,
//! platform adapters and the sync orchestrator.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::client::Operation;
use crate::config::ConfigError;

/// Transport-level errors raised while talking to an upstream API
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Invalid data received or produced
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Authentication errors. Fatal for a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// No usable credential path is configured
    #[error("No usable credentials for {platform}: {guidance}")]
    MissingCredentials {
        /// Platform name
        platform: String,
        /// What the user should configure
        guidance: String,
    },

    /// The platform rejected the credentials
    #[error("{platform} rejected credentials (HTTP {status})")]
    Rejected {
        /// Platform name
        platform: String,
        /// HTTP status returned by the token endpoint
        status: u16,
    },

    /// The token response could not be understood
    #[error("Malformed token response from {platform}: {reason}")]
    MalformedResponse {
        /// Platform name
        platform: String,
        /// Parse failure detail
        reason: String,
    },

    /// The token request never got an answer
    #[error("Authentication request failed: {0}")]
    Transport(#[from] SyncError),

    /// No login endpoint candidate accepted the credentials
    #[error("Login failed: {0}")]
    Endpoint(#[from] ResolveError),
}

/// A single candidate that was tried and rejected by the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFailure {
    /// `METHOD url` of the candidate
    pub candidate: String,
    /// Why it was rejected
    pub reason: String,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.candidate, self.reason)
    }
}

/// Endpoint resolution errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// Every candidate for the operation failed
    #[error("All endpoints exhausted for {operation}: {}", format_failures(.failures))]
    EndpointExhausted {
        /// Operation being resolved
        operation: Operation,
        /// Per-candidate failures in the order they were tried
        failures: Vec<CandidateFailure>,
    },

    /// No candidates are configured for the operation
    #[error("No endpoint candidates configured for {0}")]
    NoCandidates(Operation),
}

fn format_failures(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A fetched record that lacks mandatory fields. Skipped, never fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedRecord {
    /// Required field absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Field present but unusable
    #[error("invalid field `{field}`: {value}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Record is not a JSON object
    #[error("record is not an object")]
    NotAnObject,
}

/// Errors surfaced by platform adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Endpoint resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Transport failure outside the resolver
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// The platform answered but refused the request
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// Operation being performed
        operation: Operation,
        /// Detail
        reason: String,
    },
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::Network(_) => true,

            // Non-retryable errors
            SyncError::InvalidData(_) => false,
            SyncError::Unauthorized => false,
        }
    }
}

/// Application-level error type
///
/// Only configuration and authentication failures stop a run before it
/// produces a summary; everything else is folded into the summary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: SyncError messages with parameters
    #[test]
    fn test_sync_error_messages() {
        assert_eq!(SyncError::NetworkTimeout.to_string(), "Network timeout");
        assert_eq!(
            SyncError::InvalidData("bad json".to_string()).to_string(),
            "Invalid data: bad json"
        );
    }

    // Test 2: RetryableError trait for SyncError
    #[test]
    fn test_sync_error_retryable() {
        assert!(SyncError::NetworkTimeout.is_retryable());
        assert!(SyncError::ConnectionRefused.is_retryable());
        assert!(SyncError::Network("connection reset".to_string()).is_retryable());

        assert!(!SyncError::InvalidData("bad format".to_string()).is_retryable());
        assert!(!SyncError::Unauthorized.is_retryable());
    }

    // Test 3: EndpointExhausted lists every failed candidate
    #[test]
    fn test_endpoint_exhausted_message() {
        let err = ResolveError::EndpointExhausted {
            operation: Operation::ListWorkouts,
            failures: vec![
                CandidateFailure {
                    candidate: "GET https://a/x".to_string(),
                    reason: "HTTP 500".to_string(),
                },
                CandidateFailure {
                    candidate: "GET https://b/x".to_string(),
                    reason: "missing `records` envelope".to_string(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("All endpoints exhausted for list_workouts"));
        assert!(message.contains("GET https://a/x (HTTP 500)"));
        assert!(message.contains("GET https://b/x (missing `records` envelope)"));
    }

    // Test 4: AuthError guidance is part of the message
    #[test]
    fn test_auth_error_messages() {
        let err = AuthError::MissingCredentials {
            platform: "whoop".to_string(),
            guidance: "set target.refresh_token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No usable credentials for whoop: set target.refresh_token"
        );

        let err = AuthError::Rejected {
            platform: "peloton".to_string(),
            status: 401,
        };
        assert_eq!(err.to_string(), "peloton rejected credentials (HTTP 401)");
    }

    // Test 5: From conversions into AdapterError and AppError
    #[test]
    fn test_error_conversions() {
        let adapter_err: AdapterError = SyncError::NetworkTimeout.into();
        assert!(matches!(
            adapter_err,
            AdapterError::Sync(SyncError::NetworkTimeout)
        ));

        let app_err: AppError = AuthError::Transport(SyncError::ConnectionRefused).into();
        assert_eq!(
            app_err.to_string(),
            "Authentication failed: Authentication request failed: Connection refused"
        );
    }

    // Test 6: MalformedRecord messages
    #[test]
    fn test_malformed_record_messages() {
        assert_eq!(
            MalformedRecord::MissingField("id").to_string(),
            "missing field `id`"
        );
        assert_eq!(
            MalformedRecord::InvalidField {
                field: "start_time",
                value: "yesterday".to_string()
            }
            .to_string(),
            "invalid field `start_time`: yesterday"
        );
    }
}
