//! In-memory store of all records.
//!
//! The store is the single source of truth while the process runs. It is
//! owned by the caller and passed by reference into every component; whole-store
//! durability is the job of a [`PersistenceGateway`](crate::PersistenceGateway).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::*;

/// All persisted records, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub projects: BTreeMap<ProjectId, Project>,
    pub bidders: BTreeMap<BidderId, Bidder>,
    pub packages: BTreeMap<PackageId, Package>,
    pub bids: BTreeMap<BidId, Bid>,
    pub bid_events: BTreeMap<BidEventId, BidEvent>,
    pub snapshots: BTreeMap<SnapshotId, ValidationSnapshot>,
    /// Last id handed out; shared by every table so ids are never reused.
    next_id: u64,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id.
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `op` against a draft copy and commit it only if `op` succeeds.
    ///
    /// On error the store is left exactly as it was before the call.
    pub fn transaction<T>(&mut self, op: impl FnOnce(&mut Store) -> Result<T>) -> Result<T> {
        let mut draft = self.clone();
        let value = op(&mut draft)?;
        *self = draft;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Project by id, or `NotFound`.
    pub fn project(&self, id: ProjectId) -> Result<&Project> {
        self.projects
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("project {}", id)))
    }

    /// Mutable project by id, or `NotFound`.
    pub fn project_mut(&mut self, id: ProjectId) -> Result<&mut Project> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("project {}", id)))
    }

    /// Bidder by id, or `NotFound`.
    pub fn bidder(&self, id: BidderId) -> Result<&Bidder> {
        self.bidders
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("bidder {}", id)))
    }

    /// Mutable bidder by id, or `NotFound`.
    pub fn bidder_mut(&mut self, id: BidderId) -> Result<&mut Bidder> {
        self.bidders
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("bidder {}", id)))
    }

    /// Package by id, or `NotFound`.
    pub fn package(&self, id: PackageId) -> Result<&Package> {
        self.packages
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("package {}", id)))
    }

    /// Mutable package by id, or `NotFound`.
    pub fn package_mut(&mut self, id: PackageId) -> Result<&mut Package> {
        self.packages
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("package {}", id)))
    }

    /// Bid event by id, or `NotFound`.
    pub fn bid_event(&self, id: BidEventId) -> Result<&BidEvent> {
        self.bid_events
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("bid event {}", id)))
    }

    /// Mutable bid event by id, with its name resolutions.
    pub fn bid_event_mut(&mut self, id: BidEventId) -> Result<&mut BidEvent> {
        self.bid_events
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("bid event {}", id)))
    }

    /// Validation snapshot by id, or `NotFound`.
    pub fn snapshot(&self, id: SnapshotId) -> Result<&ValidationSnapshot> {
        self.snapshots
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("validation snapshot {}", id)))
    }

    /// Bidder whose canonical name has the same [`canonical_key`] as `name`.
    pub fn bidder_by_name(&self, name: &str) -> Option<&Bidder> {
        let key = canonical_key(name);
        self.bidders.values().find(|b| b.key() == key)
    }

    /// Packages owned by a project, in id order.
    pub fn packages_of(&self, project_id: ProjectId) -> impl Iterator<Item = &Package> {
        self.packages
            .values()
            .filter(move |p| p.project_id == project_id)
    }

    /// Package of a project by its code.
    pub fn package_by_code(&self, project_id: ProjectId, code: &str) -> Option<&Package> {
        self.packages_of(project_id).find(|p| p.code == code)
    }

    /// Bids owned by a package, in id order.
    pub fn bids_of(&self, package_id: PackageId) -> impl Iterator<Item = &Bid> {
        self.bids.values().filter(move |b| b.package_id == package_id)
    }

    /// Number of bids and packages (as selected bidder) that reference a bidder.
    pub fn bidder_usage(&self, bidder_id: BidderId) -> (usize, usize) {
        let bids = self.bids.values().filter(|b| b.bidder_id == bidder_id).count();
        let selected = self
            .packages
            .values()
            .filter(|p| p.selected_bidder_id == Some(bidder_id))
            .count();
        (bids, selected)
    }

    // ------------------------------------------------------------------
    // Cascades
    // ------------------------------------------------------------------

    /// Delete every bid of a package, returning how many were removed.
    pub fn delete_bids_of(&mut self, package_id: PackageId) -> usize {
        let before = self.bids.len();
        self.bids.retain(|_, b| b.package_id != package_id);
        before - self.bids.len()
    }

    /// Delete a package and its bids.
    pub fn delete_package(&mut self, id: PackageId) -> Result<Package> {
        let package = self
            .packages
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("package {}", id)))?;
        let bids = self.delete_bids_of(id);
        debug!(package_id = id, bids, "deleted package");
        Ok(package)
    }

    /// Delete a project with its packages, bids, bid events and snapshots.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<Project> {
        let project = self
            .projects
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("project {}", id)))?;
        let package_ids: Vec<PackageId> = self.packages_of(id).map(|p| p.id).collect();
        for package_id in &package_ids {
            self.delete_package(*package_id)?;
        }
        self.bid_events.retain(|_, e| e.project_id != id);
        self.snapshots.retain(|_, s| s.project_id != id);
        debug!(project_id = id, packages = package_ids.len(), "deleted project");
        Ok(project)
    }
}
