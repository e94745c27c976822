//! Scheduling, detection rules and issue reconciliation.
//!
//! This crate provides:
//! - The cadence table deciding which jobs fire each minute
//! - The dispatcher that runs those jobs through a `JobRunner`
//! - Threshold rules and the store-backed detectors built on them
//! - The reconciler that deduplicates candidates into issues
//! - E2E report failure extraction

pub mod cadence;
pub mod detect;
pub mod dispatch;
pub mod e2e;
pub mod error;
pub mod reconcile;
pub mod thresholds;

pub use cadence::{CadenceTable, STANDARD_CADENCE};
pub use dispatch::{
    Dispatcher, JobResult, JobRunner, JobStatus, RunnerError, RunnerResponse, TickSummary,
};
pub use error::RulesError;
pub use reconcile::{Lookback, ReconcileSummary, Reconciler};
pub use thresholds::Thresholds;
