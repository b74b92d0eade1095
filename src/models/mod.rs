//! Domain models for strength-sync
//!
//! This module contains the normalized records and decision types used throughout the application.

pub mod decision;
pub mod event;

// Re-export commonly used types
pub use decision::{ActionFailure, ActionStep, MatchDecision, RunStatus, SyncSummary};
pub use event::{Exercise, SourceEvent, TargetActivity, TargetWorkout};
