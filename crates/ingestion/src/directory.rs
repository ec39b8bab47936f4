//! Canonical bidder directory.
//!
//! Bidders are referenced weakly by id from bids, packages and bid-event
//! resolutions. Every operation here either fully applies or leaves the
//! store untouched: checks run before the first write.

use bidrec_core::{canonical_key, Bidder, BidderId, Error, Result, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A bidder with how often it is referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderListing {
    #[serde(flatten)]
    pub bidder: Bidder,
    pub bid_count: usize,
    /// Packages naming this bidder as the selected one.
    pub selected_count: usize,
}

/// What a merge changed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeReport {
    pub keep_id: BidderId,
    pub merged_id: BidderId,
    pub bids_moved: usize,
    pub packages_repointed: usize,
    pub resolutions_repointed: usize,
    /// Names newly recorded as aliases of the kept bidder.
    pub aliases_added: Vec<String>,
}

fn clean_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

fn ensure_name_free(store: &Store, name: &str, except: Option<BidderId>) -> Result<()> {
    match store.bidder_by_name(name) {
        Some(existing) if Some(existing.id) != except => Err(Error::conflict(format!(
            "bidder '{}' already exists (id {})",
            existing.canonical_name, existing.id
        ))),
        _ => Ok(()),
    }
}

/// Create a bidder. Fails with a conflict if the canonical key is taken.
pub fn create_bidder(store: &mut Store, canonical_name: &str) -> Result<BidderId> {
    let name = clean_name(canonical_name, "bidder name")?;
    ensure_name_free(store, &name, None)?;

    let id = store.allocate_id();
    store.bidders.insert(
        id,
        Bidder {
            id,
            canonical_name: name.clone(),
            aliases: Default::default(),
        },
    );
    info!(bidder_id = id, name = %name, "created bidder");
    Ok(id)
}

/// Bidder with this canonical key, created if absent. Returns whether it was created.
pub(crate) fn find_or_create_bidder(store: &mut Store, name: &str) -> Result<(BidderId, bool)> {
    if let Some(existing) = store.bidder_by_name(name) {
        return Ok((existing.id, false));
    }
    create_bidder(store, name).map(|id| (id, true))
}

/// Rename a bidder; the previous name is kept as an alias.
pub fn rename_bidder(store: &mut Store, id: BidderId, new_name: &str) -> Result<()> {
    let name = clean_name(new_name, "bidder name")?;
    ensure_name_free(store, &name, Some(id))?;

    let bidder = store.bidder_mut(id)?;
    let previous = std::mem::replace(&mut bidder.canonical_name, name.clone());
    let new_key = canonical_key(&name);
    bidder.aliases.retain(|a| canonical_key(a) != new_key);
    if canonical_key(&previous) != new_key {
        bidder.aliases.insert(previous.clone());
    }
    info!(bidder_id = id, from = %previous, to = %name, "renamed bidder");
    Ok(())
}

/// Bidder whose canonical name or one of whose aliases has the key of `name`.
pub(crate) fn name_owner(store: &Store, name: &str) -> Option<BidderId> {
    let key = canonical_key(name);
    store
        .bidders
        .values()
        .find(|b| b.names().any(|n| canonical_key(n) == key))
        .map(|b| b.id)
}

/// Record an alternate spelling. Returns false when it is already known.
///
/// A spelling another bidder already answers to is a conflict.
pub fn add_alias(store: &mut Store, id: BidderId, alias: &str) -> Result<bool> {
    let alias = clean_name(alias, "alias")?;
    store.bidder(id)?;
    match name_owner(store, &alias) {
        Some(owner) if owner == id => return Ok(false),
        Some(owner) => {
            return Err(Error::conflict(format!(
                "'{}' already names bidder {}",
                alias, owner
            )))
        }
        None => {}
    }
    let bidder = store.bidder_mut(id)?;
    bidder.aliases.insert(alias.clone());
    debug!(bidder_id = id, alias = %alias, "added alias");
    Ok(true)
}

/// Delete a bidder nothing references.
pub fn delete_bidder(store: &mut Store, id: BidderId) -> Result<Bidder> {
    store.bidder(id)?;
    let (bids, selected) = store.bidder_usage(id);
    if bids > 0 || selected > 0 {
        return Err(Error::conflict(format!(
            "bidder {} is still referenced by {} bids and {} packages",
            id, bids, selected
        )));
    }
    let resolutions = store
        .bid_events
        .values()
        .flat_map(|e| e.resolutions.iter())
        .filter(|r| r.bidder_id == id)
        .count();
    if resolutions > 0 {
        return Err(Error::conflict(format!(
            "bidder {} is still assigned in {} bid event resolutions",
            id, resolutions
        )));
    }

    let bidder = store.bidder(id)?.clone();
    store.bidders.remove(&id);
    info!(bidder_id = id, name = %bidder.canonical_name, "deleted bidder");
    Ok(bidder)
}

/// Delete a bidder if no bid, package or resolution points at it.
///
/// Used to drop provisional bidders that a review decision left behind.
pub(crate) fn prune_if_orphan(store: &mut Store, id: BidderId) -> bool {
    let (bids, selected) = store.bidder_usage(id);
    let resolved = store
        .bid_events
        .values()
        .flat_map(|e| e.resolutions.iter())
        .any(|r| r.bidder_id == id);
    if bids > 0 || selected > 0 || resolved {
        return false;
    }
    let removed = store.bidders.remove(&id).is_some();
    if removed {
        debug!(bidder_id = id, "pruned orphaned provisional bidder");
    }
    removed
}

/// Fold `merge_id` into `keep_id`.
///
/// Bids, selected-bidder references and bid-event resolutions move to the kept
/// bidder, the merged bidder's names become aliases, and the merged record is
/// deleted. Merging an id that no longer exists is a not-found error.
pub fn merge_bidders(store: &mut Store, keep_id: BidderId, merge_id: BidderId) -> Result<MergeReport> {
    if keep_id == merge_id {
        return Err(Error::validation(format!(
            "cannot merge bidder {} into itself",
            keep_id
        )));
    }
    store.bidder(keep_id)?;
    let merged = store.bidder(merge_id)?.clone();

    let mut report = MergeReport {
        keep_id,
        merged_id: merge_id,
        ..Default::default()
    };

    for bid in store.bids.values_mut().filter(|b| b.bidder_id == merge_id) {
        bid.bidder_id = keep_id;
        report.bids_moved += 1;
    }
    for package in store
        .packages
        .values_mut()
        .filter(|p| p.selected_bidder_id == Some(merge_id))
    {
        package.selected_bidder_id = Some(keep_id);
        report.packages_repointed += 1;
    }
    for resolution in store
        .bid_events
        .values_mut()
        .flat_map(|e| e.resolutions.iter_mut())
        .filter(|r| r.bidder_id == merge_id)
    {
        resolution.bidder_id = keep_id;
        report.resolutions_repointed += 1;
    }

    let keep = store.bidder_mut(keep_id)?;
    for name in merged.names() {
        let key = canonical_key(name);
        if keep.names().all(|n| canonical_key(n) != key) {
            keep.aliases.insert(name.to_string());
            report.aliases_added.push(name.to_string());
        }
    }
    store.bidders.remove(&merge_id);

    info!(
        keep_id,
        merge_id,
        bids_moved = report.bids_moved,
        packages_repointed = report.packages_repointed,
        "merged bidders"
    );
    Ok(report)
}

/// Every bidder with usage counts, ordered by canonical name.
pub fn list_bidders(store: &Store) -> Vec<BidderListing> {
    let mut listing: Vec<BidderListing> = store
        .bidders
        .values()
        .map(|bidder| {
            let (bid_count, selected_count) = store.bidder_usage(bidder.id);
            BidderListing {
                bidder: bidder.clone(),
                bid_count,
                selected_count,
            }
        })
        .collect();
    listing.sort_by(|a, b| {
        a.bidder
            .key()
            .cmp(&b.bidder.key())
            .then(a.bidder.id.cmp(&b.bidder.id))
    });
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidrec_core::{Bid, Package, PackageId};

    fn package(store: &mut Store) -> PackageId {
        let id = store.allocate_id();
        store.packages.insert(
            id,
            Package {
                id,
                code: format!("P{}", id),
                ..Default::default()
            },
        );
        id
    }

    fn bid(store: &mut Store, package_id: PackageId, bidder_id: BidderId, selected: bool) {
        let id = store.allocate_id();
        store.bids.insert(
            id,
            Bid {
                id,
                package_id,
                bidder_id,
                raw_bidder_name: "raw".to_string(),
                amount: 100.0,
                was_selected: selected,
            },
        );
        if selected {
            store.packages.get_mut(&package_id).unwrap().selected_bidder_id = Some(bidder_id);
        }
    }

    #[test]
    fn test_create_rejects_duplicate_key() {
        let mut store = Store::new();
        create_bidder(&mut store, "ABC Electrical").unwrap();
        let err = create_bidder(&mut store, "  abc   ELECTRICAL ").unwrap_err();
        assert!(err.is_conflict());
        assert!(create_bidder(&mut store, "   ").unwrap_err().is_validation());
        assert_eq!(store.bidders.len(), 1);
    }

    #[test]
    fn test_rename_keeps_old_name_as_alias() {
        let mut store = Store::new();
        let id = create_bidder(&mut store, "ABC Elec").unwrap();
        let other = create_bidder(&mut store, "Zed Mechanical").unwrap();

        rename_bidder(&mut store, id, "ABC Electrical").unwrap();
        let bidder = store.bidder(id).unwrap();
        assert_eq!(bidder.canonical_name, "ABC Electrical");
        assert!(bidder.aliases.contains("ABC Elec"));

        assert!(rename_bidder(&mut store, other, "abc electrical")
            .unwrap_err()
            .is_conflict());
        // Case-only rename of the same bidder is allowed.
        rename_bidder(&mut store, id, "ABC ELECTRICAL").unwrap();
        assert_eq!(store.bidder(id).unwrap().aliases.len(), 1);
    }

    #[test]
    fn test_add_alias_dedupes_by_key() {
        let mut store = Store::new();
        let id = create_bidder(&mut store, "ABC Electrical").unwrap();
        assert!(add_alias(&mut store, id, "A.B.C. Elec").unwrap());
        assert!(!add_alias(&mut store, id, "a.b.c.  elec").unwrap());
        assert!(!add_alias(&mut store, id, "abc electrical").unwrap());
        assert!(add_alias(&mut store, 999, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_alias_taken_by_other_bidder() {
        let mut store = Store::new();
        let acme = create_bidder(&mut store, "Acme").unwrap();
        let beta = create_bidder(&mut store, "Beta Builders").unwrap();
        add_alias(&mut store, acme, "Acme Co").unwrap();

        assert!(add_alias(&mut store, beta, "ACME").unwrap_err().is_conflict());
        assert!(add_alias(&mut store, beta, "acme  co").unwrap_err().is_conflict());
        assert!(store.bidder(beta).unwrap().aliases.is_empty());
        assert_eq!(name_owner(&store, "ACME CO"), Some(acme));
        assert_eq!(name_owner(&store, "Gamma"), None);
    }

    #[test]
    fn test_delete_referenced_bidder_conflicts() {
        let mut store = Store::new();
        let id = create_bidder(&mut store, "Acme").unwrap();
        let pkg = package(&mut store);
        bid(&mut store, pkg, id, false);

        assert!(delete_bidder(&mut store, id).unwrap_err().is_conflict());

        store.bids.clear();
        delete_bidder(&mut store, id).unwrap();
        assert!(store.bidders.is_empty());
        assert!(delete_bidder(&mut store, id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_merge_moves_references_and_aliases() {
        let mut store = Store::new();
        let keep = create_bidder(&mut store, "ABC Electrical").unwrap();
        let merge = create_bidder(&mut store, "ABC Elec Inc").unwrap();
        add_alias(&mut store, merge, "A B C Electric").unwrap();
        // Overlaps the kept bidder's canonical name, so it is not re-added.
        store
            .bidder_mut(merge)
            .unwrap()
            .aliases
            .insert("abc electrical".to_string());
        let p1 = package(&mut store);
        let p2 = package(&mut store);
        bid(&mut store, p1, merge, true);
        bid(&mut store, p2, merge, false);
        bid(&mut store, p2, keep, true);

        let report = merge_bidders(&mut store, keep, merge).unwrap();

        assert_eq!(report.bids_moved, 2);
        assert_eq!(report.packages_repointed, 1);
        assert!(store.bids.values().all(|b| b.bidder_id == keep));
        assert_eq!(store.package(p1).unwrap().selected_bidder_id, Some(keep));
        assert!(store.bidder(merge).unwrap_err().is_not_found());

        let kept = store.bidder(keep).unwrap();
        assert!(kept.aliases.contains("ABC Elec Inc"));
        assert!(kept.aliases.contains("A B C Electric"));
        assert_eq!(kept.aliases.len(), 2);

        let again = merge_bidders(&mut store, keep, merge).unwrap_err();
        assert!(again.is_not_found());
    }

    #[test]
    fn test_merge_into_self_is_rejected() {
        let mut store = Store::new();
        let id = create_bidder(&mut store, "Acme").unwrap();
        let before = store.clone();
        assert!(merge_bidders(&mut store, id, id).unwrap_err().is_validation());
        assert!(merge_bidders(&mut store, id, 999).unwrap_err().is_not_found());
        assert_eq!(store, before);
    }

    #[test]
    fn test_prune_keeps_referenced_bidder() {
        let mut store = Store::new();
        let used = create_bidder(&mut store, "Used").unwrap();
        let unused = create_bidder(&mut store, "Unused").unwrap();
        let pkg = package(&mut store);
        bid(&mut store, pkg, used, false);

        assert!(!prune_if_orphan(&mut store, used));
        assert!(prune_if_orphan(&mut store, unused));
        assert_eq!(store.bidders.len(), 1);
    }

    #[test]
    fn test_list_bidders_sorted_with_usage() {
        let mut store = Store::new();
        let zed = create_bidder(&mut store, "Zed").unwrap();
        create_bidder(&mut store, "alpha").unwrap();
        let pkg = package(&mut store);
        bid(&mut store, pkg, zed, true);

        let listing = list_bidders(&store);
        assert_eq!(listing[0].bidder.canonical_name, "alpha");
        assert_eq!(listing[1].bid_count, 1);
        assert_eq!(listing[1].selected_count, 1);
    }
}
