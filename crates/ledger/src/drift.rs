//! Comparison of recorded metrics against live ones.
//!
//! Numeric fields match when both are absent or both present and within an
//! absolute tolerance. Date fields must match exactly.

use bidrec_core::ProjectMetrics;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One field whose live value no longer matches the recorded one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    Numeric {
        field: String,
        recorded: Option<f64>,
        live: Option<f64>,
    },
    Date {
        field: String,
        recorded: Option<NaiveDate>,
        live: Option<NaiveDate>,
    },
}

impl Drift {
    /// Name of the drifted field.
    pub fn field(&self) -> &str {
        match self {
            Drift::Numeric { field, .. } | Drift::Date { field, .. } => field,
        }
    }
}

fn within(recorded: Option<f64>, live: Option<f64>, tolerance: f64) -> bool {
    match (recorded, live) {
        (None, None) => true,
        (Some(r), Some(l)) => (r - l).abs() <= tolerance,
        _ => false,
    }
}

/// Every field that drifted, in a fixed order.
pub fn drift(recorded: &ProjectMetrics, live: &ProjectMetrics, tolerance: f64) -> Vec<Drift> {
    let mut out: Vec<Drift> = recorded
        .numeric_fields()
        .into_iter()
        .zip(live.numeric_fields())
        .filter(|((_, r), (_, l))| !within(*r, *l, tolerance))
        .map(|((field, r), (_, l))| Drift::Numeric {
            field: field.to_string(),
            recorded: r,
            live: l,
        })
        .collect();

    if recorded.project_date != live.project_date {
        out.push(Drift::Date {
            field: "project_date".to_string(),
            recorded: recorded.project_date,
            live: live.project_date,
        });
    }
    out
}

/// Whether recorded metrics still describe the live ones.
pub fn is_current(recorded: &ProjectMetrics, live: &ProjectMetrics, tolerance: f64) -> bool {
    drift(recorded, live, tolerance).is_empty()
}
