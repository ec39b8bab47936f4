//! Core data types for the bid-reconciliation system.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a project.
pub type ProjectId = u64;
/// Identifier of a canonical bidder.
pub type BidderId = u64;
/// Identifier of a bid package.
pub type PackageId = u64;
/// Identifier of a single bid.
pub type BidId = u64;
/// Identifier of an upload batch.
pub type BidEventId = u64;
/// Identifier of a validation snapshot.
pub type SnapshotId = u64;

/// Uniqueness key for canonical names: trimmed, whitespace collapsed, lower-cased.
pub fn canonical_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A construction project that owns packages, bid events and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Date used for time bucketing and date-range filters.
    pub project_date: Option<NaiveDate>,
    pub county: Option<String>,
    /// Gross building square footage.
    pub building_sf: Option<f64>,
    pub notes: Option<String>,
}

/// A canonical vendor identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bidder {
    pub id: BidderId,
    /// Display name; unique under [`canonical_key`].
    pub canonical_name: String,
    /// Alternate spellings that resolve to this bidder.
    pub aliases: BTreeSet<String>,
}

impl Bidder {
    /// Case-normalized uniqueness key of the canonical name.
    pub fn key(&self) -> String {
        canonical_key(&self.canonical_name)
    }

    /// Canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// How a package's representative amount was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageStatus {
    /// Amounts derive from received bids.
    #[default]
    Bid,
    /// No bids; only an estimate or GMP line.
    Estimated,
    /// Selected amount was set by hand.
    BidOverride,
}

/// A scope of work put out for bid within a project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub project_id: ProjectId,
    /// Upload batch that last wrote this package's bids.
    pub bid_event_id: Option<BidEventId>,
    /// Unique within the project.
    pub code: String,
    pub name: String,
    pub csi_division: Option<String>,
    pub status: PackageStatus,
    pub selected_bidder_id: Option<BidderId>,
    pub selected_amount: Option<f64>,
    pub low_bid: Option<f64>,
    pub median_bid: Option<f64>,
    pub high_bid: Option<f64>,
    pub average_bid: Option<f64>,
    pub gmp_amount: Option<f64>,
    pub cost_per_sf: Option<f64>,
    /// Selected amount was entered by hand and survives statistics refreshes.
    pub is_override: bool,
    pub notes: Option<String>,
}

/// One bidder's offer on one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub package_id: PackageId,
    pub bidder_id: BidderId,
    /// Name exactly as it appeared in the upload.
    pub raw_bidder_name: String,
    pub amount: f64,
    pub was_selected: bool,
}

/// A ranked candidate for a flagged raw name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub bidder_id: BidderId,
    pub canonical_name: String,
    pub score: f64,
}

/// Review state of one distinct raw bidder name within a bid event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameResolution {
    pub raw_name: String,
    /// Comparison key the raw name normalized to.
    pub normalized: String,
    /// Bidder every bid with this raw name currently points at.
    pub bidder_id: BidderId,
    /// Best similarity score seen at import time.
    pub score: f64,
    pub needs_review: bool,
    pub decided_by_human: bool,
    /// Import created a provisional bidder for this name.
    pub created_bidder: bool,
    pub suggestions: Vec<Suggestion>,
}

/// One upload batch; the unit of bidder review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidEvent {
    pub id: BidEventId,
    pub project_id: ProjectId,
    /// Label of the source, usually the uploaded file name.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub resolutions: Vec<NameResolution>,
}

impl BidEvent {
    /// Resolution entry for a raw name, if present.
    pub fn resolution(&self, raw_name: &str) -> Option<&NameResolution> {
        self.resolutions.iter().find(|r| r.raw_name == raw_name)
    }
}

/// Package field treated as "the" cost during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    #[default]
    MedianBid,
    SelectedAmount,
}

impl Basis {
    /// The package amount on this basis. Absent values stay absent.
    pub fn amount(self, package: &Package) -> Option<f64> {
        match self {
            Basis::MedianBid => package.median_bid,
            Basis::SelectedAmount => package.selected_amount,
        }
    }
}

impl std::str::FromStr for Basis {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" | "median_bid" => Ok(Basis::MedianBid),
            "selected" | "selected_amount" => Ok(Basis::SelectedAmount),
            other => Err(crate::Error::validation(format!("unknown basis '{}'", other))),
        }
    }
}

/// Project-level figures frozen into a validation snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub package_count: usize,
    pub total_low: Option<f64>,
    pub total_median: Option<f64>,
    pub total_selected: Option<f64>,
    pub total_gmp: Option<f64>,
    pub low_per_sf: Option<f64>,
    pub median_per_sf: Option<f64>,
    pub selected_per_sf: Option<f64>,
    pub gmp_per_sf: Option<f64>,
    pub gmp_delta: Option<f64>,
    pub gmp_delta_pct: Option<f64>,
    pub building_sf: Option<f64>,
    pub project_date: Option<NaiveDate>,
}

impl ProjectMetrics {
    /// Every numeric field by name, in a fixed order.
    pub fn numeric_fields(&self) -> [(&'static str, Option<f64>); 12] {
        [
            ("package_count", Some(self.package_count as f64)),
            ("total_low", self.total_low),
            ("total_median", self.total_median),
            ("total_selected", self.total_selected),
            ("total_gmp", self.total_gmp),
            ("low_per_sf", self.low_per_sf),
            ("median_per_sf", self.median_per_sf),
            ("selected_per_sf", self.selected_per_sf),
            ("gmp_per_sf", self.gmp_per_sf),
            ("gmp_delta", self.gmp_delta),
            ("gmp_delta_pct", self.gmp_delta_pct),
            ("building_sf", self.building_sf),
        ]
    }
}

/// An immutable record of a project's metrics at validation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    pub id: SnapshotId,
    pub project_id: ProjectId,
    /// Who validated.
    pub validated_by: String,
    pub metrics: ProjectMetrics,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
