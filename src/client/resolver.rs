//! Endpoint resolver
//!
//! Walks an ordered list of [`EndpointCandidate`]s for an operation until one
//! answers with an accepted status and a body its response shape can parse.
//! The winning candidate is remembered per operation for the lifetime of the
//! resolver, which is one run.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{EndpointCandidate, HttpResponse, Operation};
use crate::error::{CandidateFailure, ResolveError, SyncError};

/// A successful resolution
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Raw response of the winning candidate
    pub response: HttpResponse,
    /// Records extracted by the winner's response shape
    pub records: Vec<Value>,
    /// The candidate that answered
    pub candidate: EndpointCandidate,
}

/// Resolver with per-operation memoization of the winning candidate
#[derive(Debug, Default)]
pub struct EndpointResolver {
    winners: RwLock<HashMap<Operation, EndpointCandidate>>,
}

impl EndpointResolver {
    /// Create a resolver with an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an operation by dispatching candidates in priority order
    ///
    /// A memoized winner that is still in `candidates` is tried first. If it
    /// fails, the remaining candidates are tried in their listed order and the
    /// memo is replaced by the new winner, or cleared when none succeeds.
    pub async fn resolve<F, Fut>(
        &self,
        operation: Operation,
        candidates: &[EndpointCandidate],
        dispatch: F,
    ) -> Result<Resolved, ResolveError>
    where
        F: Fn(EndpointCandidate) -> Fut,
        Fut: Future<Output = Result<HttpResponse, SyncError>>,
    {
        if candidates.is_empty() {
            return Err(ResolveError::NoCandidates(operation));
        }

        let memoized = self.winners.read().await.get(&operation).cloned();
        let memoized = memoized.filter(|winner| candidates.contains(winner));

        let ordered: Vec<&EndpointCandidate> = match &memoized {
            Some(winner) => std::iter::once(winner)
                .chain(candidates.iter().filter(|c| *c != winner))
                .collect(),
            None => candidates.iter().collect(),
        };

        let mut failures = Vec::new();
        for candidate in ordered {
            match self.try_candidate(candidate, &dispatch).await {
                Ok((response, records)) => {
                    if memoized.as_ref() != Some(candidate) {
                        info!(
                            operation = %operation,
                            endpoint = %candidate.label(),
                            "Endpoint resolved"
                        );
                        self.winners
                            .write()
                            .await
                            .insert(operation, candidate.clone());
                    }
                    return Ok(Resolved {
                        response,
                        records,
                        candidate: candidate.clone(),
                    });
                }
                Err(reason) => {
                    debug!(
                        operation = %operation,
                        endpoint = %candidate.label(),
                        reason = %reason,
                        "Endpoint candidate rejected"
                    );
                    failures.push(CandidateFailure {
                        candidate: candidate.label(),
                        reason,
                    });
                }
            }
        }

        self.winners.write().await.remove(&operation);
        warn!(
            operation = %operation,
            tried = failures.len(),
            "All endpoint candidates failed"
        );
        Err(ResolveError::EndpointExhausted {
            operation,
            failures,
        })
    }

    async fn try_candidate<F, Fut>(
        &self,
        candidate: &EndpointCandidate,
        dispatch: &F,
    ) -> Result<(HttpResponse, Vec<Value>), String>
    where
        F: Fn(EndpointCandidate) -> Fut,
        Fut: Future<Output = Result<HttpResponse, SyncError>>,
    {
        let response = dispatch(candidate.clone())
            .await
            .map_err(|e| e.to_string())?;

        if !candidate.accepts(response.status) {
            return Err(format!("HTTP {}", response.status));
        }

        let records = candidate.shape.extract(&response.body)?;
        Ok((response, records))
    }

    /// Memoized winner for an operation
    pub async fn winner(&self, operation: Operation) -> Option<EndpointCandidate> {
        self.winners.read().await.get(&operation).cloned()
    }
}
