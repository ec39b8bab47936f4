//! Validation snapshots.
//!
//! Snapshots are append-only. Creating one never touches earlier ones, and
//! deleting one removes exactly that record.

use bidrec_analytics::project_metrics;
use bidrec_core::{
    Error, ProjectId, ProjectMetrics, Result, SnapshotId, Store, ValidationSnapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drift::{drift, Drift};

/// Freeze the project's live metrics into a new snapshot.
pub fn create_snapshot(
    store: &mut Store,
    project_id: ProjectId,
    validated_by: &str,
    notes: Option<String>,
    created_at: DateTime<Utc>,
) -> Result<SnapshotId> {
    let validated_by = validated_by.trim();
    if validated_by.is_empty() {
        return Err(Error::validation("validator identity must not be empty"));
    }
    let metrics = project_metrics(store, project_id)?;

    let id = store.allocate_id();
    store.snapshots.insert(
        id,
        ValidationSnapshot {
            id,
            project_id,
            validated_by: validated_by.to_string(),
            metrics,
            notes,
            created_at,
        },
    );
    info!(project_id, snapshot_id = id, validated_by, "created validation snapshot");
    Ok(id)
}

/// The project's snapshot with the greatest `(created_at, id)`.
pub fn latest_snapshot(store: &Store, project_id: ProjectId) -> Option<&ValidationSnapshot> {
    store
        .snapshots
        .values()
        .filter(|s| s.project_id == project_id)
        .max_by_key(|s| (s.created_at, s.id))
}

/// The project's snapshots, newest first.
pub fn history(store: &Store, project_id: ProjectId) -> Vec<&ValidationSnapshot> {
    let mut snapshots: Vec<&ValidationSnapshot> = store
        .snapshots
        .values()
        .filter(|s| s.project_id == project_id)
        .collect();
    snapshots.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    snapshots
}

/// Remove one snapshot.
pub fn delete_snapshot(store: &mut Store, id: SnapshotId) -> Result<ValidationSnapshot> {
    let snapshot = store
        .snapshots
        .remove(&id)
        .ok_or_else(|| Error::not_found(format!("validation snapshot {}", id)))?;
    info!(snapshot_id = id, project_id = snapshot.project_id, "deleted validation snapshot");
    Ok(snapshot)
}

/// Whether a project's numbers are still the ones last signed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Valid,
    NeedsReview,
}

/// Validation state of a project with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub project_id: ProjectId,
    pub state: ValidationState,
    pub latest: Option<ValidationSnapshot>,
    pub live: ProjectMetrics,
    /// Fields that moved since the latest snapshot; empty when there is none.
    pub drift: Vec<Drift>,
    pub snapshot_count: usize,
}

/// Compare the latest snapshot of a project with its live metrics.
pub fn validation_report(
    store: &Store,
    project_id: ProjectId,
    tolerance: f64,
) -> Result<ValidationReport> {
    let live = project_metrics(store, project_id)?;
    let latest = latest_snapshot(store, project_id).cloned();
    let drifted = latest
        .as_ref()
        .map(|s| drift(&s.metrics, &live, tolerance))
        .unwrap_or_default();
    let state = match &latest {
        Some(_) if drifted.is_empty() => ValidationState::Valid,
        _ => ValidationState::NeedsReview,
    };

    Ok(ValidationReport {
        project_id,
        state,
        latest,
        live,
        drift: drifted,
        snapshot_count: store
            .snapshots
            .values()
            .filter(|s| s.project_id == project_id)
            .count(),
    })
}

/// Valid iff a latest snapshot exists and matches the live metrics.
pub fn is_project_current(store: &Store, project_id: ProjectId, tolerance: f64) -> Result<bool> {
    Ok(validation_report(store, project_id, tolerance)?.state == ValidationState::Valid)
}
