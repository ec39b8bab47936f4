//! Division and portfolio aggregates of cost per square foot.

use std::collections::BTreeMap;

use bidrec_core::{Basis, Package, Project, Store};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

use crate::divisions::{bucket_title, division_key};
use crate::filter::PackageFilter;
use crate::statistics::cost_per_sf;

/// Summary statistics of a sample of cost-per-SF values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub count: usize,
    pub median: Option<f64>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CostSummary {
    /// Summarize a sample. An empty sample has no statistics.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let data = Data::new(values.to_vec());
        Self {
            count: values.len(),
            median: Some(data.median()),
            average: Some(values.mean()),
            min: Some(Statistics::min(values)),
            max: Some(Statistics::max(values)),
        }
    }
}

/// Aggregate row for one CSI division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionAggregate {
    /// Two-digit code or `unclassified`.
    pub division: String,
    /// MasterFormat title.
    pub title: String,
    /// Packages that contributed a cost-per-SF value.
    pub package_count: usize,
    /// Packages skipped because the basis amount or square footage was missing.
    pub excluded_count: usize,
    pub cost_per_sf: CostSummary,
}

/// Portfolio-wide row on the same basis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverallAggregate {
    pub package_count: usize,
    pub excluded_count: usize,
    pub cost_per_sf: CostSummary,
}

/// Division rows plus the overall row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub basis: Basis,
    pub divisions: Vec<DivisionAggregate>,
    pub overall: OverallAggregate,
}

/// A package's cost per SF on the given basis.
pub fn package_cost_per_sf(project: &Project, package: &Package, basis: Basis) -> Option<f64> {
    cost_per_sf(basis.amount(package), project.building_sf)
}

#[derive(Default)]
struct Bucket {
    values: Vec<f64>,
    excluded: usize,
}

impl Bucket {
    fn push(&mut self, value: Option<f64>) {
        match value {
            Some(v) => self.values.push(v),
            None => self.excluded += 1,
        }
    }
}

/// Aggregate the filtered packages per CSI division and overall.
///
/// Divisions are listed in code order with `unclassified` last. The
/// unclassified bucket contributes to the overall row unless the filter
/// excludes it.
pub fn compute_aggregates(store: &Store, filter: &PackageFilter, basis: Basis) -> Aggregates {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut overall = Bucket::default();

    for (project, package) in filter.select(store) {
        let value = package_cost_per_sf(project, package, basis);
        buckets
            .entry(division_key(package.csi_division.as_deref()))
            .or_default()
            .push(value);
        overall.push(value);
    }

    // Digits sort before letters, so "unclassified" already lands last.
    let divisions = buckets
        .into_iter()
        .map(|(division, bucket)| DivisionAggregate {
            title: bucket_title(&division),
            division,
            package_count: bucket.values.len(),
            excluded_count: bucket.excluded,
            cost_per_sf: CostSummary::from_values(&bucket.values),
        })
        .collect();

    Aggregates {
        basis,
        divisions,
        overall: OverallAggregate {
            package_count: overall.values.len(),
            excluded_count: overall.excluded,
            cost_per_sf: CostSummary::from_values(&overall.values),
        },
    }
}
