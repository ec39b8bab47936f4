//! Manual package entry and package-level edits.

use bidrec_analytics::{compute, gmp_delta, refresh_package, BidStats, GmpDelta};
use bidrec_core::{Bid, BidId, Error, Package, PackageId, PackageStatus, ProjectId, Result, Store};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A package entered by hand, without bids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPackage {
    pub code: String,
    pub name: String,
    pub csi_division: Option<String>,
    pub gmp_amount: Option<f64>,
    /// Estimated amount used as the selected amount.
    pub estimate: Option<f64>,
    pub notes: Option<String>,
}

fn check_amount(value: Option<f64>, what: &str) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::validation(format!(
            "{} {} must be a non-negative number",
            what, v
        ))),
        other => Ok(other),
    }
}

/// Add an estimated package to a project.
pub fn add_package(store: &mut Store, project_id: ProjectId, new: NewPackage) -> Result<PackageId> {
    store.project(project_id)?;
    let code = new.code.trim().to_string();
    if code.is_empty() {
        return Err(Error::validation("package code must not be empty"));
    }
    if store.package_by_code(project_id, &code).is_some() {
        return Err(Error::conflict(format!(
            "package '{}' already exists in project {}",
            code, project_id
        )));
    }
    let gmp_amount = check_amount(new.gmp_amount, "GMP amount")?;
    let estimate = check_amount(new.estimate, "estimate")?;

    let id = store.allocate_id();
    let name = if new.name.trim().is_empty() {
        code.clone()
    } else {
        new.name.trim().to_string()
    };
    store.packages.insert(
        id,
        Package {
            id,
            project_id,
            code,
            name,
            csi_division: new.csi_division,
            status: PackageStatus::Estimated,
            selected_amount: estimate,
            gmp_amount,
            notes: new.notes,
            ..Default::default()
        },
    );
    refresh_package(store, id)?;
    info!(project_id, package_id = id, "added package");
    Ok(id)
}

/// Make one of a package's bids the selected one.
pub fn select_bid(store: &mut Store, package_id: PackageId, bid_id: BidId) -> Result<()> {
    store.package(package_id)?;
    let owner = store
        .bids
        .get(&bid_id)
        .ok_or_else(|| Error::not_found(format!("bid {}", bid_id)))?
        .package_id;
    if owner != package_id {
        return Err(Error::validation(format!(
            "bid {} belongs to package {}, not {}",
            bid_id, owner, package_id
        )));
    }

    for bid in store.bids.values_mut().filter(|b| b.package_id == package_id) {
        bid.was_selected = bid.id == bid_id;
    }
    refresh_package(store, package_id)?;
    info!(package_id, bid_id, "selected bid");
    Ok(())
}

/// Set the selected amount by hand; it survives later refreshes.
pub fn override_package(
    store: &mut Store,
    package_id: PackageId,
    amount: f64,
    notes: Option<String>,
) -> Result<()> {
    let amount = check_amount(Some(amount), "override amount")?;
    let package = store.package_mut(package_id)?;
    package.is_override = true;
    package.selected_amount = amount;
    if notes.is_some() {
        package.notes = notes;
    }
    refresh_package(store, package_id)?;
    info!(package_id, amount = ?amount, "overrode package amount");
    Ok(())
}

/// Drop a manual override and derive the package from its bids again.
///
/// A package without bids has nothing to fall back on; clearing its override
/// is rejected and the amount stays.
pub fn clear_override(store: &mut Store, package_id: PackageId) -> Result<()> {
    if !store.package(package_id)?.is_override {
        return Ok(());
    }
    if store.bids_of(package_id).next().is_none() {
        return Err(Error::validation(format!(
            "package {} has no bids to fall back on; override it instead",
            package_id
        )));
    }
    let package = store.package_mut(package_id)?;
    package.is_override = false;
    refresh_package(store, package_id)?;
    info!(package_id, "cleared package override");
    Ok(())
}

/// Delete a package and its bids.
pub fn delete_package(store: &mut Store, package_id: PackageId) -> Result<Package> {
    let package = store.delete_package(package_id)?;
    info!(package_id, code = %package.code, "deleted package");
    Ok(package)
}

/// A bid with its bidder's current name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageBid {
    #[serde(flatten)]
    pub bid: Bid,
    pub bidder_name: Option<String>,
}

/// A package with its bids and derived figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageView {
    pub package: Package,
    pub bids: Vec<PackageBid>,
    pub stats: BidStats,
    /// Selected amount against the GMP line.
    pub gmp: GmpDelta,
}

/// Package detail with bid statistics and GMP delta.
pub fn package_view(store: &Store, package_id: PackageId) -> Result<PackageView> {
    let package = store.package(package_id)?.clone();
    let bids: Vec<PackageBid> = store
        .bids_of(package_id)
        .map(|b| PackageBid {
            bid: b.clone(),
            bidder_name: store.bidders.get(&b.bidder_id).map(|x| x.canonical_name.clone()),
        })
        .collect();
    let amounts: Vec<f64> = bids.iter().map(|b| b.bid.amount).collect();
    let stats = compute(&amounts);
    let gmp = gmp_delta(package.selected_amount, package.gmp_amount);

    Ok(PackageView {
        package,
        bids,
        stats,
        gmp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::{create_project, NewProject};
    use bidrec_core::BidderId;

    fn setup() -> (Store, ProjectId) {
        let mut store = Store::new();
        let project_id = create_project(
            &mut store,
            NewProject {
                name: "Library".to_string(),
                building_sf: Some(10_000.0),
                ..Default::default()
            },
        )
        .unwrap();
        (store, project_id)
    }

    fn add_bid(store: &mut Store, package_id: PackageId, bidder_id: BidderId, amount: f64) -> BidId {
        let id = store.allocate_id();
        store.bids.insert(
            id,
            Bid {
                id,
                package_id,
                bidder_id,
                raw_bidder_name: format!("B{}", bidder_id),
                amount,
                was_selected: false,
            },
        );
        id
    }

    #[test]
    fn test_add_package_is_estimated() {
        let (mut store, project_id) = setup();
        let id = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "01".to_string(),
                estimate: Some(250_000.0),
                gmp_amount: Some(200_000.0),
                ..Default::default()
            },
        )
        .unwrap();

        let package = store.package(id).unwrap();
        assert_eq!(package.status, PackageStatus::Estimated);
        assert_eq!(package.name, "01");
        assert_eq!(package.selected_amount, Some(250_000.0));
        assert_eq!(package.cost_per_sf, Some(25.0));

        let dup = NewPackage {
            code: "01".to_string(),
            ..Default::default()
        };
        assert!(add_package(&mut store, project_id, dup).unwrap_err().is_conflict());
    }

    #[test]
    fn test_select_bid_and_override() {
        let (mut store, project_id) = setup();
        let pkg = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "26".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        add_bid(&mut store, pkg, 100, 90_000.0);
        let chosen = add_bid(&mut store, pkg, 101, 110_000.0);

        select_bid(&mut store, pkg, chosen).unwrap();
        let package = store.package(pkg).unwrap();
        assert_eq!(package.status, PackageStatus::Bid);
        assert_eq!(package.selected_bidder_id, Some(101));
        assert_eq!(package.selected_amount, Some(110_000.0));

        override_package(&mut store, pkg, 95_000.0, Some("negotiated".to_string())).unwrap();
        let package = store.package(pkg).unwrap();
        assert_eq!(package.status, PackageStatus::BidOverride);
        assert_eq!(package.selected_amount, Some(95_000.0));
        assert_eq!(package.median_bid, Some(100_000.0));

        clear_override(&mut store, pkg).unwrap();
        let package = store.package(pkg).unwrap();
        assert_eq!(package.status, PackageStatus::Bid);
        assert_eq!(package.selected_amount, Some(110_000.0));
    }

    #[test]
    fn test_select_bid_of_other_package() {
        let (mut store, project_id) = setup();
        let a = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "A".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let b = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "B".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let bid = add_bid(&mut store, b, 7, 1.0);

        assert!(select_bid(&mut store, a, bid).unwrap_err().is_validation());
        assert!(select_bid(&mut store, a, 9_999).unwrap_err().is_not_found());
    }

    #[test]
    fn test_package_view_gmp_zero() {
        let (mut store, project_id) = setup();
        let pkg = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "09".to_string(),
                estimate: Some(1_000.0),
                gmp_amount: Some(0.0),
                ..Default::default()
            },
        )
        .unwrap();

        let view = package_view(&store, pkg).unwrap();
        assert_eq!(view.gmp.delta, Some(1_000.0));
        assert_eq!(view.gmp.delta_pct, None);
        assert_eq!(view.stats.count, 0);
        assert_eq!(view.stats.median, None);
    }

    #[test]
    fn test_clear_override_without_bids_keeps_amount() {
        let (mut store, project_id) = setup();
        let pkg = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "31".to_string(),
                estimate: Some(40_000.0),
                ..Default::default()
            },
        )
        .unwrap();
        override_package(&mut store, pkg, 42_000.0, None).unwrap();

        assert!(clear_override(&mut store, pkg).unwrap_err().is_validation());
        let package = store.package(pkg).unwrap();
        assert!(package.is_override);
        assert_eq!(package.selected_amount, Some(42_000.0));
    }

    #[test]
    fn test_override_rejects_negative() {
        let (mut store, project_id) = setup();
        let pkg = add_package(
            &mut store,
            project_id,
            NewPackage {
                code: "X".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(override_package(&mut store, pkg, -1.0, None).unwrap_err().is_validation());
        assert!(!store.package(pkg).unwrap().is_override);
    }
}
