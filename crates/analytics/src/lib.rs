//! Bid statistics and aggregation for the bid-reconciliation system.
//!
//! This crate handles:
//! - Per-package statistics (low/median/high/average, cost per SF, GMP delta)
//! - CSI division normalization and titles
//! - Package filters
//! - Division and portfolio aggregates on a selectable basis
//! - Month-bucketed time series
//! - Per-project totals and validation metrics

pub mod aggregate;
pub mod divisions;
pub mod filter;
pub mod project;
pub mod statistics;
pub mod timeseries;

pub use aggregate::{
    compute_aggregates, Aggregates, CostSummary, DivisionAggregate, OverallAggregate,
};
pub use filter::PackageFilter;
pub use project::{
    portfolio, project_metrics, project_totals, Portfolio, PortfolioTotals, ProjectTotals,
};
pub use statistics::{
    compute, cost_per_sf, gmp_delta, refresh_package, refresh_project, BidStats, GmpDelta,
};
pub use timeseries::{compute_time_series, TimeSeries, YearMonth};
