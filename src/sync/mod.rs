//! Reconciliation of source events with target activities
//!
//! # Components
//!
//! - [`matcher`]: Pure decision logic pairing events with activities and workouts
//! - [`orchestrator`]: One fetch, match and act pass over both platforms
//! - [`scheduler`]: Repeats a pass on a fixed interval
//!
//! # Example
//!
//! ```ignore
//! use strength_sync::config::Config;
//! use strength_sync::sync::{SyncOptions, SyncOrchestrator};
//!
//! let config = Config::load("config.yaml")?;
//! let options = SyncOptions::from_config(&config, None, true);
//! let summary = SyncOrchestrator::from_config(&config, options)?.run().await?;
//! println!("created {} linked {}", summary.created_count, summary.linked_count);
//! ```

pub mod matcher;
pub mod orchestrator;
pub mod scheduler;

pub use matcher::{similarity, Matcher, SIMILARITY_THRESHOLD};
pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use scheduler::{ConfiguredSyncJob, SchedulerConfig, SyncJob, SyncScheduler, SyncStatus};
