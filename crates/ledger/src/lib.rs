//! Validation ledger for the bid-reconciliation system.
//!
//! This crate handles:
//! - Append-only validation snapshots of project metrics
//! - Tolerance-based comparison of recorded and live metrics
//! - Per-project validation state and drift reports

pub mod drift;
pub mod snapshot;

pub use drift::{drift, is_current, Drift};
pub use snapshot::{
    create_snapshot, delete_snapshot, history, is_project_current, latest_snapshot,
    validation_report, ValidationReport, ValidationState,
};
