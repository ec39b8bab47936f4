//! Human review of the bidder names in one bid event.
//!
//! A decision batch is applied all-or-nothing: the first failing row aborts
//! the batch, the error names the row, and the store is left as it was.
//! Applying the same batch twice ends in the same state as applying it once,
//! so a batch may decide each raw name only once.

use std::collections::BTreeSet;

use bidrec_analytics::refresh_package;
use bidrec_core::{
    canonical_key, BidEventId, Bidder, BidderId, Error, NameResolution, PackageId, ProjectId,
    Result, Store,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::{add_alias, create_bidder, name_owner, prune_if_orphan};

/// What to do with one raw name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Accept the current assignment.
    Keep,
    /// Point the name at an existing bidder.
    Assign { bidder_id: BidderId },
    /// Make a bidder from the raw name, or from `canonical_name` when given.
    Create {
        #[serde(default)]
        canonical_name: Option<String>,
    },
}

/// A decision for one raw name of a bid event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidderDecision {
    pub raw_name: String,
    #[serde(flatten)]
    pub decision: Decision,
}

/// Counts over a bid event's name resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub names: usize,
    pub needs_review: usize,
    pub auto_matched: usize,
    pub human_decided: usize,
    pub packages: usize,
    pub bids: usize,
}

/// A bid as the reviewer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewBid {
    pub bid_id: u64,
    pub raw_bidder_name: String,
    pub bidder_id: BidderId,
    /// `None` if the bidder record is gone.
    pub bidder_name: Option<String>,
    pub amount: f64,
    pub was_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPackage {
    pub package_id: PackageId,
    pub code: String,
    pub name: String,
    pub csi_division: Option<String>,
    pub bids: Vec<ReviewBid>,
}

/// Everything needed to review one bid event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderReview {
    pub bid_event_id: BidEventId,
    pub project_id: ProjectId,
    pub source: String,
    pub summary: ReviewSummary,
    pub resolutions: Vec<NameResolution>,
    pub packages: Vec<ReviewPackage>,
    /// The whole directory, ordered by canonical name.
    pub all_bidders: Vec<Bidder>,
}

/// Build the review view of a bid event.
pub fn bidder_review(store: &Store, event_id: BidEventId) -> Result<BidderReview> {
    let event = store.bid_event(event_id)?;

    let packages: Vec<ReviewPackage> = store
        .packages_of(event.project_id)
        .filter(|p| p.bid_event_id == Some(event_id))
        .map(|p| ReviewPackage {
            package_id: p.id,
            code: p.code.clone(),
            name: p.name.clone(),
            csi_division: p.csi_division.clone(),
            bids: store
                .bids_of(p.id)
                .map(|b| ReviewBid {
                    bid_id: b.id,
                    raw_bidder_name: b.raw_bidder_name.clone(),
                    bidder_id: b.bidder_id,
                    bidder_name: store.bidders.get(&b.bidder_id).map(|x| x.canonical_name.clone()),
                    amount: b.amount,
                    was_selected: b.was_selected,
                })
                .collect(),
        })
        .collect();

    let summary = ReviewSummary {
        names: event.resolutions.len(),
        needs_review: event.resolutions.iter().filter(|r| r.needs_review).count(),
        auto_matched: event
            .resolutions
            .iter()
            .filter(|r| !r.needs_review && !r.decided_by_human)
            .count(),
        human_decided: event.resolutions.iter().filter(|r| r.decided_by_human).count(),
        packages: packages.len(),
        bids: packages.iter().map(|p| p.bids.len()).sum(),
    };

    let mut all_bidders: Vec<Bidder> = store.bidders.values().cloned().collect();
    all_bidders.sort_by(|a, b| a.key().cmp(&b.key()).then(a.id.cmp(&b.id)));

    Ok(BidderReview {
        bid_event_id: event.id,
        project_id: event.project_id,
        source: event.source.clone(),
        summary,
        resolutions: event.resolutions.clone(),
        packages,
        all_bidders,
    })
}

/// Apply a decision batch to a bid event.
///
/// Returns the number of names whose bidder changed.
pub fn apply_decisions(
    store: &mut Store,
    event_id: BidEventId,
    decisions: &[BidderDecision],
) -> Result<usize> {
    store.bid_event(event_id)?;

    let result = store.transaction(|draft| {
        let mut seen = BTreeSet::new();
        for (row, decision) in decisions.iter().enumerate() {
            if !seen.insert(decision.raw_name.as_str()) {
                return Err(Error::at_row(
                    row,
                    Error::validation(format!(
                        "bidder name '{}' is decided more than once",
                        decision.raw_name
                    )),
                ));
            }
        }

        let mut changed = 0;
        for (row, decision) in decisions.iter().enumerate() {
            if apply_one(draft, event_id, decision).map_err(|e| Error::at_row(row, e))? {
                changed += 1;
            }
        }
        Ok(changed)
    });

    match &result {
        Ok(changed) => info!(
            bid_event_id = event_id,
            decisions = decisions.len(),
            changed,
            "applied bidder decisions"
        ),
        Err(e) => warn!(bid_event_id = event_id, error = %e, "rejected bidder decisions"),
    }
    result
}

fn apply_one(store: &mut Store, event_id: BidEventId, item: &BidderDecision) -> Result<bool> {
    let event = store.bid_event(event_id)?;
    let resolution = event.resolution(&item.raw_name).ok_or_else(|| {
        Error::not_found(format!(
            "bidder name '{}' in bid event {}",
            item.raw_name, event_id
        ))
    })?;
    let previous = resolution.bidder_id;
    let provisional = resolution.created_bidder;

    // The raw name becomes an alias of `alias_to` once the old owner is gone.
    let mut alias_to = None;
    let target = match &item.decision {
        Decision::Keep => {
            store.bidder(previous)?;
            previous
        }
        Decision::Assign { bidder_id } => {
            store.bidder(*bidder_id)?;
            alias_to = Some(*bidder_id);
            *bidder_id
        }
        Decision::Create { canonical_name } => {
            let name = canonical_name.as_deref().unwrap_or(&item.raw_name);
            if name.trim().is_empty() {
                return Err(Error::validation("bidder name must not be empty"));
            }
            match store.bidder_by_name(name) {
                Some(existing) if existing.id == previous => previous,
                Some(existing) => {
                    return Err(Error::conflict(format!(
                        "bidder '{}' already exists (id {})",
                        existing.canonical_name, existing.id
                    )))
                }
                None => {
                    let id = create_bidder(store, name)?;
                    if canonical_key(name) != canonical_key(&item.raw_name) {
                        alias_to = Some(id);
                    }
                    id
                }
            }
        }
    };

    if target != previous {
        reassign_name(store, event_id, &item.raw_name, target)?;
    }

    let event = store.bid_event_mut(event_id)?;
    if let Some(resolution) = event
        .resolutions
        .iter_mut()
        .find(|r| r.raw_name == item.raw_name)
    {
        resolution.bidder_id = target;
        resolution.needs_review = false;
        resolution.decided_by_human = true;
        if target != previous {
            resolution.created_bidder = false;
        }
    }

    if target != previous && provisional {
        prune_if_orphan(store, previous);
    }

    if let Some(owner_id) = alias_to {
        match name_owner(store, &item.raw_name) {
            Some(other) if other != owner_id => debug!(
                raw_name = %item.raw_name,
                bidder_id = other,
                "name still belongs to another bidder; alias not added"
            ),
            _ => {
                add_alias(store, owner_id, &item.raw_name)?;
            }
        }
    }
    Ok(target != previous)
}

/// Point every bid carrying `raw_name` in the event's packages at `target`.
fn reassign_name(
    store: &mut Store,
    event_id: BidEventId,
    raw_name: &str,
    target: BidderId,
) -> Result<()> {
    let package_ids: BTreeSet<PackageId> = store
        .packages
        .values()
        .filter(|p| p.bid_event_id == Some(event_id))
        .map(|p| p.id)
        .collect();

    let mut selected_in = BTreeSet::new();
    for bid in store
        .bids
        .values_mut()
        .filter(|b| package_ids.contains(&b.package_id) && b.raw_bidder_name == raw_name)
    {
        bid.bidder_id = target;
        if bid.was_selected {
            selected_in.insert(bid.package_id);
        }
    }

    for package_id in &selected_in {
        store.package_mut(*package_id)?.selected_bidder_id = Some(target);
    }
    for package_id in package_ids {
        refresh_package(store, package_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidrec_core::{Bid, BidEvent, Package, Project};
    use chrono::Utc;

    struct Fixture {
        store: Store,
        event_id: BidEventId,
        package_id: PackageId,
        acme: BidderId,
        provisional: BidderId,
    }

    /// One event, one package, two names: "ACME INC" auto-matched to Acme and
    /// "J Smith Co" flagged on a provisional bidder.
    fn fixture() -> Fixture {
        let mut store = Store::new();
        let project_id = store.allocate_id();
        store.projects.insert(
            project_id,
            Project {
                id: project_id,
                name: "School".to_string(),
                project_date: None,
                county: None,
                building_sf: Some(10_000.0),
                notes: None,
            },
        );
        let acme = crate::directory::create_bidder(&mut store, "Acme").unwrap();
        let provisional = crate::directory::create_bidder(&mut store, "J Smith Co").unwrap();

        let event_id = store.allocate_id();
        let package_id = store.allocate_id();
        store.packages.insert(
            package_id,
            Package {
                id: package_id,
                project_id,
                bid_event_id: Some(event_id),
                code: "26".to_string(),
                name: "Electrical".to_string(),
                ..Default::default()
            },
        );
        for (bidder_id, raw, amount, selected) in [
            (acme, "ACME INC", 100.0, false),
            (provisional, "J Smith Co", 90.0, true),
        ] {
            let id = store.allocate_id();
            store.bids.insert(
                id,
                Bid {
                    id,
                    package_id,
                    bidder_id,
                    raw_bidder_name: raw.to_string(),
                    amount,
                    was_selected: selected,
                },
            );
        }
        refresh_package(&mut store, package_id).unwrap();

        let resolution = |raw: &str, bidder_id, needs_review, created_bidder| NameResolution {
            raw_name: raw.to_string(),
            normalized: raw.to_lowercase(),
            bidder_id,
            score: if needs_review { 0.3 } else { 1.0 },
            needs_review,
            decided_by_human: false,
            created_bidder,
            suggestions: Vec::new(),
        };
        store.bid_events.insert(
            event_id,
            BidEvent {
                id: event_id,
                project_id,
                source: "bids.xlsx".to_string(),
                created_at: Utc::now(),
                resolutions: vec![
                    resolution("ACME INC", acme, false, false),
                    resolution("J Smith Co", provisional, true, true),
                ],
            },
        );

        Fixture {
            store,
            event_id,
            package_id,
            acme,
            provisional,
        }
    }

    fn decide(raw: &str, decision: Decision) -> BidderDecision {
        BidderDecision {
            raw_name: raw.to_string(),
            decision,
        }
    }

    #[test]
    fn test_review_summary() {
        let f = fixture();
        let review = bidder_review(&f.store, f.event_id).unwrap();
        assert_eq!(review.summary.names, 2);
        assert_eq!(review.summary.needs_review, 1);
        assert_eq!(review.summary.auto_matched, 1);
        assert_eq!(review.summary.human_decided, 0);
        assert_eq!(review.summary.bids, 2);
        assert_eq!(review.packages.len(), 1);
        assert_eq!(review.all_bidders.len(), 2);
        assert!(bidder_review(&f.store, 999).unwrap_err().is_not_found());
    }

    #[test]
    fn test_assign_moves_bids_and_prunes_provisional() {
        let mut f = fixture();
        let decisions = [decide("J Smith Co", Decision::Assign { bidder_id: f.acme })];

        let changed = apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();

        assert_eq!(changed, 1);
        assert!(f.store.bids.values().all(|b| b.bidder_id == f.acme));
        assert_eq!(
            f.store.package(f.package_id).unwrap().selected_bidder_id,
            Some(f.acme)
        );
        assert!(f.store.bidder(f.provisional).unwrap_err().is_not_found());
        assert!(f.store.bidder(f.acme).unwrap().aliases.contains("J Smith Co"));

        let r = f.store.bid_event(f.event_id).unwrap().resolution("J Smith Co").unwrap();
        assert!(!r.needs_review);
        assert!(r.decided_by_human);
    }

    #[test]
    fn test_create_with_new_name_aliases_raw() {
        let mut f = fixture();
        let decisions = [decide(
            "J Smith Co",
            Decision::Create {
                canonical_name: Some("John Smith Company".to_string()),
            },
        )];

        apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();

        let created = f.store.bidder_by_name("john smith company").unwrap().clone();
        assert!(created.aliases.contains("J Smith Co"));
        assert!(f.store.bidder(f.provisional).is_err());
        let moved = f
            .store
            .bids
            .values()
            .filter(|b| b.raw_bidder_name == "J Smith Co")
            .all(|b| b.bidder_id == created.id);
        assert!(moved);
    }

    #[test]
    fn test_create_from_raw_name_keeps_provisional() {
        let mut f = fixture();
        let decisions = [decide("J Smith Co", Decision::Create { canonical_name: None })];

        let changed = apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();

        assert_eq!(changed, 0);
        assert!(f.store.bidder(f.provisional).is_ok());
        let r = f.store.bid_event(f.event_id).unwrap().resolution("J Smith Co").unwrap();
        assert!(r.decided_by_human);
    }

    #[test]
    fn test_decisions_are_idempotent() {
        let mut f = fixture();
        let decisions = [
            decide("ACME INC", Decision::Keep),
            decide(
                "J Smith Co",
                Decision::Create {
                    canonical_name: Some("Smith Mechanical".to_string()),
                },
            ),
        ];

        apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();
        let once = f.store.clone();
        apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();

        assert_eq!(f.store, once);
    }

    #[test]
    fn test_failing_row_rolls_back_batch() {
        let mut f = fixture();
        let before = f.store.clone();
        let decisions = [
            decide(
                "J Smith Co",
                Decision::Create {
                    canonical_name: Some("Smith Mechanical".to_string()),
                },
            ),
            decide(
                "ACME INC",
                Decision::Create {
                    canonical_name: Some("smith  MECHANICAL".to_string()),
                },
            ),
        ];

        let err = apply_decisions(&mut f.store, f.event_id, &decisions).unwrap_err();

        assert_eq!(err.failed_row(), Some(1));
        assert!(err.is_conflict());
        assert_eq!(f.store, before);
    }

    #[test]
    fn test_raw_name_decided_twice_is_rejected() {
        let mut f = fixture();
        let before = f.store.clone();
        let decisions = [
            decide(
                "J Smith Co",
                Decision::Create {
                    canonical_name: Some("Smith Mechanical".to_string()),
                },
            ),
            decide("J Smith Co", Decision::Assign { bidder_id: f.acme }),
        ];

        let err = apply_decisions(&mut f.store, f.event_id, &decisions).unwrap_err();

        assert!(err.is_validation());
        assert_eq!(err.failed_row(), Some(1));
        assert_eq!(f.store, before);
        assert!(f.store.bidder_by_name("Smith Mechanical").is_none());
    }

    #[test]
    fn test_assign_does_not_steal_another_bidders_alias() {
        let mut f = fixture();
        let beta = crate::directory::create_bidder(&mut f.store, "Beta Electric").unwrap();
        add_alias(&mut f.store, f.acme, "ACME INC").unwrap();
        let decisions = [decide("ACME INC", Decision::Assign { bidder_id: beta })];

        let changed = apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();

        assert_eq!(changed, 1);
        let moved = f
            .store
            .bids
            .values()
            .filter(|b| b.raw_bidder_name == "ACME INC")
            .all(|b| b.bidder_id == beta);
        assert!(moved);
        assert!(f.store.bidder(beta).unwrap().aliases.is_empty());
        assert_eq!(name_owner(&f.store, "acme inc"), Some(f.acme));

        let once = f.store.clone();
        apply_decisions(&mut f.store, f.event_id, &decisions).unwrap();
        assert_eq!(f.store, once);
    }

    #[test]
    fn test_unknown_raw_name_and_bidder() {
        let mut f = fixture();
        let err = apply_decisions(&mut f.store, f.event_id, &[decide("Nobody", Decision::Keep)])
            .unwrap_err();
        assert_eq!(err.failed_row(), Some(0));
        assert!(err.is_not_found());

        let err = apply_decisions(
            &mut f.store,
            f.event_id,
            &[decide("ACME INC", Decision::Assign { bidder_id: 4242 })],
        )
        .unwrap_err();
        assert!(err.is_not_found());
        assert!(apply_decisions(&mut f.store, 4242, &[]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_decision_json_shape() {
        let json = r#"[
            {"raw_name": "A", "action": "keep"},
            {"raw_name": "B", "action": "assign", "bidder_id": 7},
            {"raw_name": "C", "action": "create"},
            {"raw_name": "D", "action": "create", "canonical_name": "Dee"}
        ]"#;
        let parsed: Vec<BidderDecision> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].decision, Decision::Keep);
        assert_eq!(parsed[1].decision, Decision::Assign { bidder_id: 7 });
        assert_eq!(parsed[2].decision, Decision::Create { canonical_name: None });
        assert_eq!(
            parsed[3].decision,
            Decision::Create {
                canonical_name: Some("Dee".to_string())
            }
        );
    }
}
