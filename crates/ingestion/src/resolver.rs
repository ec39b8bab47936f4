//! Raw bidder name resolution against the bidder directory.

use std::cmp::Ordering;

use bidrec_core::config::MatchingConfig;
use bidrec_core::{Bidder, BidderId, Suggestion};
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::normalizer::normalize_name;
use crate::scorer::SimilarityScorer;

/// A bidder with the comparison keys of its canonical name and aliases.
#[derive(Debug, Clone)]
struct IndexedBidder {
    id: BidderId,
    canonical_name: String,
    keys: Vec<String>,
}

/// Pre-normalized view of the directory, built once per batch.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entries: Vec<IndexedBidder>,
}

impl NameIndex {
    /// Index every bidder.
    pub fn build<'a>(bidders: impl IntoIterator<Item = &'a Bidder>) -> Self {
        let mut index = Self::default();
        for bidder in bidders {
            index.insert(bidder);
        }
        index
    }

    /// Add or replace one bidder.
    pub fn insert(&mut self, bidder: &Bidder) {
        let mut keys: Vec<String> = bidder
            .names()
            .map(normalize_name)
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort();
        keys.dedup();

        let entry = IndexedBidder {
            id: bidder.id,
            canonical_name: bidder.canonical_name.clone(),
            keys,
        };
        match self.entries.iter_mut().find(|e| e.id == bidder.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of resolving one raw name.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub raw_name: String,
    pub normalized: String,
    /// Best candidate regardless of threshold.
    pub top: Option<Suggestion>,
    /// Bidder assigned automatically, when the top score clears the threshold.
    pub matched: Option<BidderId>,
    pub needs_review: bool,
    /// Ranked candidates for review; empty when matched.
    pub suggestions: Vec<Suggestion>,
}

impl Resolution {
    /// Best score seen, or 0 with an empty directory.
    pub fn top_score(&self) -> f64 {
        self.top.as_ref().map_or(0.0, |s| s.score)
    }
}

/// Descending score, then canonical name, then id.
fn rank_order(a: &Suggestion, b: &Suggestion) -> Ordering {
    OrderedFloat(b.score)
        .cmp(&OrderedFloat(a.score))
        .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        .then_with(|| a.bidder_id.cmp(&b.bidder_id))
}

/// Matches raw names against the directory with a pluggable scorer.
pub struct IdentityResolver<'a> {
    scorer: &'a dyn SimilarityScorer,
    config: &'a MatchingConfig,
}

impl<'a> IdentityResolver<'a> {
    /// Create a resolver.
    pub fn new(scorer: &'a dyn SimilarityScorer, config: &'a MatchingConfig) -> Self {
        Self { scorer, config }
    }

    /// Score a normalized key against every bidder, best name per bidder.
    ///
    /// Only bidders scoring above the configured suggestion floor are kept.
    pub fn rank(&self, normalized: &str, index: &NameIndex) -> Vec<Suggestion> {
        let mut ranked: Vec<Suggestion> = index
            .entries
            .iter()
            .filter_map(|entry| {
                let best = entry
                    .keys
                    .iter()
                    .map(|key| self.scorer.score(normalized, key))
                    .fold(0.0_f64, f64::max);
                (best > self.config.min_suggestion_score).then(|| Suggestion {
                    bidder_id: entry.id,
                    canonical_name: entry.canonical_name.clone(),
                    score: best,
                })
            })
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }

    /// Resolve one raw name.
    ///
    /// A name whose key is empty is never auto-matched.
    pub fn resolve(&self, raw_name: &str, index: &NameIndex) -> Resolution {
        let normalized = normalize_name(raw_name);
        let ranked = if normalized.is_empty() {
            Vec::new()
        } else {
            self.rank(&normalized, index)
        };
        let top = ranked.first().cloned();

        let matched = top
            .as_ref()
            .filter(|t| t.score >= self.config.auto_match_threshold)
            .map(|t| t.bidder_id);

        let suggestions = if matched.is_some() {
            Vec::new()
        } else {
            ranked
                .into_iter()
                .take(self.config.suggestion_limit)
                .collect()
        };

        debug!(
            raw_name,
            normalized = %normalized,
            top_score = ?top.as_ref().map(|t| t.score),
            matched = ?matched,
            suggestions = suggestions.len(),
            "resolved bidder name"
        );

        Resolution {
            raw_name: raw_name.to_string(),
            normalized,
            top,
            needs_review: matched.is_none(),
            matched,
            suggestions,
        }
    }
}
