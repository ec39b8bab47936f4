//! Package selection for aggregates.

use std::collections::BTreeSet;

use bidrec_core::{Package, Project, ProjectId, Store};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::divisions::{division_key, UNCLASSIFIED};

/// Restricts which projects and packages take part in an aggregate.
///
/// Every bound is optional; an empty filter selects everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageFilter {
    /// Only these projects.
    pub project_ids: Option<BTreeSet<ProjectId>>,
    /// Inclusive lower bound on the project date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the project date.
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive county match.
    pub county: Option<String>,
    /// Inclusive lower bound on building square footage.
    pub min_sf: Option<f64>,
    /// Inclusive upper bound on building square footage.
    pub max_sf: Option<f64>,
    /// Drop packages without a recognizable CSI division.
    pub exclude_unclassified: bool,
}

impl PackageFilter {
    /// Whether a project passes the project-level bounds.
    ///
    /// A project missing the attribute a bound tests is excluded by that bound.
    pub fn matches_project(&self, project: &Project) -> bool {
        if let Some(ids) = &self.project_ids {
            if !ids.contains(&project.id) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = project.project_date else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        if let Some(county) = &self.county {
            let wanted = county.trim().to_lowercase();
            let actual = project
                .county
                .as_deref()
                .map(|c| c.trim().to_lowercase());
            if actual.as_deref() != Some(wanted.as_str()) {
                return false;
            }
        }
        if self.min_sf.is_some() || self.max_sf.is_some() {
            let Some(sf) = project.building_sf else {
                return false;
            };
            if self.min_sf.is_some_and(|min| sf < min) {
                return false;
            }
            if self.max_sf.is_some_and(|max| sf > max) {
                return false;
            }
        }
        true
    }

    /// Whether a package passes the package-level bounds.
    pub fn matches_package(&self, package: &Package) -> bool {
        !(self.exclude_unclassified
            && division_key(package.csi_division.as_deref()) == UNCLASSIFIED)
    }

    /// Projects passing the filter, in id order.
    pub fn projects<'a>(&'a self, store: &'a Store) -> impl Iterator<Item = &'a Project> + 'a {
        store
            .projects
            .values()
            .filter(move |p| self.matches_project(p))
    }

    /// Every selected package together with its owning project.
    pub fn select<'a>(&self, store: &'a Store) -> Vec<(&'a Project, &'a Package)> {
        store
            .packages
            .values()
            .filter_map(|package| {
                let project = store.projects.get(&package.project_id)?;
                (self.matches_project(project) && self.matches_package(package))
                    .then_some((project, package))
            })
            .collect()
    }
}
