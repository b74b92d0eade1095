//! strength-sync - Reconciles Peloton strength workouts with Whoop activities
//!
//! This crate fetches strength sessions from the source platform, matches them
//! against strength activities and workouts on the target platform, and creates
//! or links target workouts so each session carries its exercise detail.

pub mod analyzer;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod platforms;
pub mod sync;
