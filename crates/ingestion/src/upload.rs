//! Import of one upload batch (a bid event).
//!
//! Rows arrive already parsed from the spreadsheet. This module:
//! - Validates every row before touching the store
//! - Upserts packages by code, replacing the bids of existing ones
//! - Resolves each distinct raw bidder name once per batch
//! - Creates bids and refreshes package statistics

use std::collections::{BTreeSet, HashMap};

use bidrec_analytics::refresh_package;
use bidrec_core::{
    Bid, BidEvent, BidEventId, BidderId, Error, NameResolution, Package, PackageId, PackageStatus,
    ProjectId, Result, Store, Suggestion,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::find_or_create_bidder;
use crate::resolver::{IdentityResolver, NameIndex};

/// A spreadsheet amount: a number, or text such as `"$1,234.50"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountCell {
    Number(f64),
    Text(String),
}

impl AmountCell {
    /// The amount as a non-negative finite number.
    pub fn value(&self) -> Result<f64> {
        match self {
            AmountCell::Number(n) => check_amount(*n, &n.to_string()),
            AmountCell::Text(text) => parse_amount(text),
        }
    }
}

impl From<f64> for AmountCell {
    fn from(value: f64) -> Self {
        AmountCell::Number(value)
    }
}

fn check_amount(value: f64, shown: &str) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::validation(format!("amount '{}' is not a number", shown)));
    }
    if value < 0.0 {
        return Err(Error::validation(format!("amount '{}' is negative", shown)));
    }
    Ok(value)
}

/// Parse a currency string. `$`, thousands separators and spaces are ignored.
pub fn parse_amount(text: &str) -> Result<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return Err(Error::validation(format!("amount '{}' is empty", text.trim())));
    }
    let value: f64 = cleaned
        .parse()
        .map_err(|_| Error::validation(format!("amount '{}' is not a number", text.trim())))?;
    check_amount(value, text.trim())
}

/// One bid cell of an upload row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBid {
    pub raw_bidder_name: String,
    pub amount: AmountCell,
    #[serde(default)]
    pub was_selected: bool,
}

/// One package row of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRow {
    pub package_code: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub csi_division: Option<String>,
    #[serde(default)]
    pub gmp_amount: Option<AmountCell>,
    #[serde(default)]
    pub bids: Vec<UploadBid>,
}

/// A row after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub code: String,
    pub name: String,
    pub csi_division: Option<String>,
    pub gmp_amount: Option<f64>,
    pub bids: Vec<ValidBid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidBid {
    pub raw_bidder_name: String,
    pub amount: f64,
    pub was_selected: bool,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn validate_row(row: &UploadRow) -> Result<ValidRow> {
    let code = row.package_code.trim();
    if code.is_empty() {
        return Err(Error::validation("package code is missing"));
    }

    let mut bids = Vec::with_capacity(row.bids.len());
    for (i, bid) in row.bids.iter().enumerate() {
        let raw = bid.raw_bidder_name.trim();
        if raw.is_empty() {
            return Err(Error::validation(format!("bid {} has no bidder name", i + 1)));
        }
        let amount = bid
            .amount
            .value()
            .map_err(|e| Error::validation(format!("bid {} ({}): {}", i + 1, raw, e.root())))?;
        bids.push(ValidBid {
            raw_bidder_name: raw.to_string(),
            amount,
            was_selected: bid.was_selected,
        });
    }
    if bids.iter().filter(|b| b.was_selected).count() > 1 {
        return Err(Error::validation(format!(
            "package '{}' marks more than one bid as selected",
            code
        )));
    }

    let gmp_amount = row
        .gmp_amount
        .as_ref()
        .map(|cell| cell.value().map_err(|e| Error::validation(format!("GMP: {}", e.root()))))
        .transpose()?;

    Ok(ValidRow {
        code: code.to_string(),
        name: non_blank(Some(row.package_name.as_str())).unwrap_or_else(|| code.to_string()),
        csi_division: non_blank(row.csi_division.as_deref()),
        gmp_amount,
        bids,
    })
}

/// Validate a whole upload; the error names the first bad row.
pub fn validate_rows(rows: &[UploadRow]) -> Result<Vec<ValidRow>> {
    if rows.is_empty() {
        return Err(Error::validation("upload has no rows"));
    }
    let mut seen = BTreeSet::new();
    let mut valid = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let checked = validate_row(row).map_err(|e| Error::at_row(i, e))?;
        if !seen.insert(checked.code.clone()) {
            return Err(Error::at_row(
                i,
                Error::validation(format!("package code '{}' appears twice", checked.code)),
            ));
        }
        valid.push(checked);
    }
    Ok(valid)
}

/// What an import created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub bid_event_id: BidEventId,
    pub packages_created: usize,
    /// Existing packages whose bids were replaced.
    pub packages_replaced: usize,
    pub bids: usize,
    /// Distinct raw bidder names.
    pub names: usize,
    pub needs_review: usize,
    /// Provisional bidders made for unmatched names.
    pub bidders_created: usize,
}

/// Import an upload as a new bid event of `project_id`.
///
/// Nothing is written unless every row validates and the whole import
/// succeeds.
pub fn import_bid_event(
    store: &mut Store,
    resolver: &IdentityResolver<'_>,
    project_id: ProjectId,
    source: &str,
    rows: &[UploadRow],
    created_at: DateTime<Utc>,
) -> Result<ImportReport> {
    store.project(project_id)?;
    let rows = match validate_rows(rows) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(project_id, source, error = %e, "rejected upload");
            return Err(e);
        }
    };

    let report = store.transaction(|draft| {
        let event_id = draft.allocate_id();
        let mut report = ImportReport {
            bid_event_id: event_id,
            ..Default::default()
        };

        let resolutions = resolve_names(draft, resolver, &rows, &mut report)?;
        let bidder_of: HashMap<&str, BidderId> = resolutions
            .iter()
            .map(|r| (r.raw_name.as_str(), r.bidder_id))
            .collect();

        for row in &rows {
            let package_id = upsert_package(draft, project_id, event_id, row, &mut report);
            for bid in &row.bids {
                let id = draft.allocate_id();
                let bidder_id = bidder_of
                    .get(bid.raw_bidder_name.as_str())
                    .copied()
                    .ok_or_else(|| Error::not_found(format!("bidder for '{}'", bid.raw_bidder_name)))?;
                draft.bids.insert(
                    id,
                    Bid {
                        id,
                        package_id,
                        bidder_id,
                        raw_bidder_name: bid.raw_bidder_name.clone(),
                        amount: bid.amount,
                        was_selected: bid.was_selected,
                    },
                );
                report.bids += 1;
            }
            refresh_package(draft, package_id)?;
        }

        report.names = resolutions.len();
        report.needs_review = resolutions.iter().filter(|r| r.needs_review).count();
        draft.bid_events.insert(
            event_id,
            BidEvent {
                id: event_id,
                project_id,
                source: source.to_string(),
                created_at,
                resolutions,
            },
        );
        Ok(report)
    })?;

    info!(
        project_id,
        bid_event_id = report.bid_event_id,
        packages_created = report.packages_created,
        packages_replaced = report.packages_replaced,
        bids = report.bids,
        needs_review = report.needs_review,
        "imported bid event"
    );
    Ok(report)
}

/// Resolve every distinct raw name, in order of first appearance.
///
/// An unmatched name is attached to a provisional bidder so every bid has
/// one. A later name in the same batch that matches such a bidder stays
/// flagged, since that bidder has not been reviewed yet.
fn resolve_names(
    store: &mut Store,
    resolver: &IdentityResolver<'_>,
    rows: &[ValidRow],
    report: &mut ImportReport,
) -> Result<Vec<NameResolution>> {
    let mut index = NameIndex::build(store.bidders.values());
    let mut provisional: BTreeSet<BidderId> = BTreeSet::new();
    let mut resolutions: Vec<NameResolution> = Vec::new();

    for row in rows {
        for bid in &row.bids {
            let raw = bid.raw_bidder_name.as_str();
            if resolutions.iter().any(|r| r.raw_name == raw) {
                continue;
            }
            let outcome = resolver.resolve(raw, &index);
            let score = outcome.top_score();

            let resolution = match outcome.matched {
                Some(id) if !provisional.contains(&id) => NameResolution {
                    raw_name: raw.to_string(),
                    normalized: outcome.normalized,
                    bidder_id: id,
                    score,
                    needs_review: false,
                    decided_by_human: false,
                    created_bidder: false,
                    suggestions: Vec::new(),
                },
                Some(id) => NameResolution {
                    raw_name: raw.to_string(),
                    normalized: outcome.normalized,
                    bidder_id: id,
                    score,
                    needs_review: true,
                    decided_by_human: false,
                    created_bidder: false,
                    suggestions: outcome.top.into_iter().collect::<Vec<Suggestion>>(),
                },
                None => {
                    let (id, created) = find_or_create_bidder(store, raw)?;
                    if created {
                        provisional.insert(id);
                        report.bidders_created += 1;
                        index.insert(store.bidder(id)?);
                    }
                    NameResolution {
                        raw_name: raw.to_string(),
                        normalized: outcome.normalized,
                        bidder_id: id,
                        score,
                        needs_review: true,
                        decided_by_human: false,
                        created_bidder: created,
                        suggestions: outcome.suggestions,
                    }
                }
            };
            debug!(
                raw_name = raw,
                bidder_id = resolution.bidder_id,
                needs_review = resolution.needs_review,
                "attached bidder name"
            );
            resolutions.push(resolution);
        }
    }
    Ok(resolutions)
}

fn upsert_package(
    store: &mut Store,
    project_id: ProjectId,
    event_id: BidEventId,
    row: &ValidRow,
    report: &mut ImportReport,
) -> PackageId {
    if let Some(id) = store.package_by_code(project_id, &row.code).map(|p| p.id) {
        store.delete_bids_of(id);
        if let Some(package) = store.packages.get_mut(&id) {
            package.bid_event_id = Some(event_id);
            package.name = row.name.clone();
            package.csi_division = row.csi_division.clone().or(package.csi_division.take());
            package.gmp_amount = row.gmp_amount.or(package.gmp_amount);
        }
        report.packages_replaced += 1;
        return id;
    }

    let id = store.allocate_id();
    store.packages.insert(
        id,
        Package {
            id,
            project_id,
            bid_event_id: Some(event_id),
            code: row.code.clone(),
            name: row.name.clone(),
            csi_division: row.csi_division.clone(),
            status: PackageStatus::Bid,
            gmp_amount: row.gmp_amount,
            ..Default::default()
        },
    );
    report.packages_created += 1;
    id
}
