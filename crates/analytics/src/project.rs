//! Per-project totals and the portfolio view.
//!
//! Totals are sum-then-divide. A package missing its low or median bid
//! contributes its selected amount instead, so partially bid projects are not
//! deflated; a package with neither contributes nothing to that total.

use bidrec_core::{Package, Project, ProjectId, ProjectMetrics, Result, Store};
use serde::{Deserialize, Serialize};

use crate::filter::PackageFilter;
use crate::statistics::{cost_per_sf, gmp_delta};

/// Rolled-up figures for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTotals {
    pub project_id: ProjectId,
    pub name: String,
    pub package_count: usize,
    pub total_low: Option<f64>,
    pub total_median: Option<f64>,
    pub total_selected: Option<f64>,
    pub total_gmp: Option<f64>,
    pub building_sf: Option<f64>,
    pub low_per_sf: Option<f64>,
    pub median_per_sf: Option<f64>,
    pub selected_per_sf: Option<f64>,
    pub gmp_per_sf: Option<f64>,
    /// total_selected − total_gmp.
    pub gmp_delta: Option<f64>,
    pub gmp_delta_pct: Option<f64>,
}

/// Sum of the present values; `None` when nothing is present.
fn sum_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values
        .flatten()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn totals_for(project: &Project, packages: &[&Package]) -> ProjectTotals {
    let total_low = sum_present(packages.iter().map(|p| p.low_bid.or(p.selected_amount)));
    let total_median = sum_present(packages.iter().map(|p| p.median_bid.or(p.selected_amount)));
    let total_selected = sum_present(packages.iter().map(|p| p.selected_amount));
    let total_gmp = sum_present(packages.iter().map(|p| p.gmp_amount));
    let delta = gmp_delta(total_selected, total_gmp);
    let sf = project.building_sf;

    ProjectTotals {
        project_id: project.id,
        name: project.name.clone(),
        package_count: packages.len(),
        total_low,
        total_median,
        total_selected,
        total_gmp,
        building_sf: sf,
        low_per_sf: cost_per_sf(total_low, sf),
        median_per_sf: cost_per_sf(total_median, sf),
        selected_per_sf: cost_per_sf(total_selected, sf),
        gmp_per_sf: cost_per_sf(total_gmp, sf),
        gmp_delta: delta.delta,
        gmp_delta_pct: delta.delta_pct,
    }
}

/// Totals over every package of a project.
pub fn project_totals(store: &Store, project_id: ProjectId) -> Result<ProjectTotals> {
    let project = store.project(project_id)?;
    let packages: Vec<&Package> = store.packages_of(project_id).collect();
    Ok(totals_for(project, &packages))
}

/// The live figures a validation snapshot freezes.
pub fn project_metrics(store: &Store, project_id: ProjectId) -> Result<ProjectMetrics> {
    let totals = project_totals(store, project_id)?;
    let project = store.project(project_id)?;
    Ok(ProjectMetrics {
        package_count: totals.package_count,
        total_low: totals.total_low,
        total_median: totals.total_median,
        total_selected: totals.total_selected,
        total_gmp: totals.total_gmp,
        low_per_sf: totals.low_per_sf,
        median_per_sf: totals.median_per_sf,
        selected_per_sf: totals.selected_per_sf,
        gmp_per_sf: totals.gmp_per_sf,
        gmp_delta: totals.gmp_delta,
        gmp_delta_pct: totals.gmp_delta_pct,
        building_sf: project.building_sf,
        project_date: project.project_date,
    })
}

/// Grand totals across the projects of a portfolio.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub project_count: usize,
    pub package_count: usize,
    pub total_median: Option<f64>,
    pub total_selected: Option<f64>,
    pub total_gmp: Option<f64>,
    /// Square footage of projects that have one.
    pub total_building_sf: Option<f64>,
    /// Σ median totals / Σ square footage, over projects with both.
    pub median_per_sf: Option<f64>,
    /// Σ selected totals / Σ square footage, over projects with both.
    pub selected_per_sf: Option<f64>,
}

/// Per-project totals for the filtered projects plus grand totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub projects: Vec<ProjectTotals>,
    pub totals: PortfolioTotals,
}

fn pooled_per_sf(projects: &[ProjectTotals], total: impl Fn(&ProjectTotals) -> Option<f64>) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = projects
        .iter()
        .filter_map(|p| Some((total(p)?, p.building_sf.filter(|sf| *sf > 0.0)?)))
        .collect();
    let amount = sum_present(pairs.iter().map(|(a, _)| Some(*a)));
    let sf = sum_present(pairs.iter().map(|(_, sf)| Some(*sf)));
    cost_per_sf(amount, sf)
}

/// Portfolio view over the filtered projects and packages.
pub fn portfolio(store: &Store, filter: &PackageFilter) -> Portfolio {
    let projects: Vec<ProjectTotals> = filter
        .projects(store)
        .map(|project| {
            let packages: Vec<&Package> = store
                .packages_of(project.id)
                .filter(|p| filter.matches_package(p))
                .collect();
            totals_for(project, &packages)
        })
        .collect();

    let totals = PortfolioTotals {
        project_count: projects.len(),
        package_count: projects.iter().map(|p| p.package_count).sum(),
        total_median: sum_present(projects.iter().map(|p| p.total_median)),
        total_selected: sum_present(projects.iter().map(|p| p.total_selected)),
        total_gmp: sum_present(projects.iter().map(|p| p.total_gmp)),
        total_building_sf: sum_present(projects.iter().map(|p| p.building_sf)),
        median_per_sf: pooled_per_sf(&projects, |p| p.total_median),
        selected_per_sf: pooled_per_sf(&projects, |p| p.total_selected),
    };

    Portfolio { projects, totals }
}
