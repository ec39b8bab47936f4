//! Per-package bid statistics.
//!
//! Missing inputs never turn into zeros: an empty bid set, a missing or zero
//! square footage, or a zero GMP all produce `None`.

use bidrec_core::{PackageId, PackageStatus, ProjectId, Result, Store};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Summary of one package's bid amounts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BidStats {
    /// Number of amounts that contributed.
    pub count: usize,
    pub low: Option<f64>,
    pub median: Option<f64>,
    pub high: Option<f64>,
    pub average: Option<f64>,
}

/// Compute low/median/high/average of a bid set.
///
/// Non-finite amounts are ignored. For an even count the median is the mean
/// of the two middle values.
pub fn compute(amounts: &[f64]) -> BidStats {
    let mut sorted: Vec<f64> = amounts.iter().copied().filter(|a| a.is_finite()).collect();
    if sorted.is_empty() {
        return BidStats::default();
    }
    sorted.sort_by_key(|a| OrderedFloat(*a));

    let n = sorted.len();
    let low = sorted[0];
    let high = sorted[n - 1];
    let median = median_of_sorted(&sorted).unwrap_or(low);
    // Summation error must not push the mean outside the observed range.
    let average = (sorted.iter().sum::<f64>() / n as f64).clamp(low, high);

    BidStats {
        count: n,
        low: Some(low),
        median: Some(median),
        high: Some(high),
        average: Some(average),
    }
}

/// Median of an ascending slice.
pub fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Amount divided by building square footage, when both are usable.
pub fn cost_per_sf(amount: Option<f64>, building_sf: Option<f64>) -> Option<f64> {
    let sf = building_sf.filter(|sf| sf.is_finite() && *sf > 0.0)?;
    let amount = amount.filter(|a| a.is_finite())?;
    Some(amount / sf)
}

/// Difference between an outcome and the GMP budget.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GmpDelta {
    /// comparison − gmp.
    pub delta: Option<f64>,
    /// delta / gmp, as a fraction.
    pub delta_pct: Option<f64>,
}

/// Compare a value against the GMP amount.
pub fn gmp_delta(comparison: Option<f64>, gmp: Option<f64>) -> GmpDelta {
    let gmp = gmp.filter(|g| g.is_finite());
    let comparison = comparison.filter(|c| c.is_finite());
    let delta = match (comparison, gmp) {
        (Some(c), Some(g)) => Some(c - g),
        _ => None,
    };
    let delta_pct = match (delta, gmp) {
        (Some(d), Some(g)) if g != 0.0 => Some(d / g),
        _ => None,
    };
    GmpDelta { delta, delta_pct }
}

/// Recompute a package's stored statistics from its bids.
///
/// The selected bidder and amount follow the `was_selected` bid unless the
/// package is overridden. Packages without bids become `estimated` and keep an
/// existing estimate amount.
pub fn refresh_package(store: &mut Store, package_id: PackageId) -> Result<()> {
    let project_id = store.package(package_id)?.project_id;
    let building_sf = store.project(project_id)?.building_sf;

    let amounts: Vec<f64> = store.bids_of(package_id).map(|b| b.amount).collect();
    let selected = store
        .bids_of(package_id)
        .find(|b| b.was_selected)
        .map(|b| (b.bidder_id, b.amount));
    let stats = compute(&amounts);

    let package = store.package_mut(package_id)?;
    package.low_bid = stats.low;
    package.median_bid = stats.median;
    package.high_bid = stats.high;
    package.average_bid = stats.average;

    if package.is_override {
        package.status = PackageStatus::BidOverride;
    } else if stats.count > 0 {
        package.selected_bidder_id = selected.map(|(bidder, _)| bidder);
        package.selected_amount = selected.map(|(_, amount)| amount);
        package.status = PackageStatus::Bid;
    } else {
        package.selected_bidder_id = None;
        if package.status != PackageStatus::Estimated {
            package.selected_amount = None;
        }
        package.status = PackageStatus::Estimated;
    }

    package.cost_per_sf = cost_per_sf(
        package.selected_amount.or(package.median_bid),
        building_sf,
    );
    Ok(())
}

/// Refresh every package of a project.
pub fn refresh_project(store: &mut Store, project_id: ProjectId) -> Result<()> {
    let ids: Vec<PackageId> = store.packages_of(project_id).map(|p| p.id).collect();
    for id in ids {
        refresh_package(store, id)?;
    }
    Ok(())
}
