//! Similarity scoring between normalized names.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

/// Scores the similarity of two normalized names.
///
/// Implementations must be pure, symmetric, and return values in `[0, 1]`
/// with identical inputs scoring `1.0`.
pub trait SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> f64;
}

impl<F> SimilarityScorer for F
where
    F: Fn(&str, &str) -> f64,
{
    fn score(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// Token-aware scorer.
///
/// Takes the best of:
/// - the plain Levenshtein ratio,
/// - the ratio after sorting tokens (reordering),
/// - the token-set score: the ratio of "shared tokens + leftovers" strings,
///   or the Dice overlap of the token sets, whichever is higher.
///
/// A name whose tokens are a strict subset of another's does not score 1.0,
/// so "ABC" does not auto-match "ABC Electrical".
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetScorer;

impl SimilarityScorer for TokenSetScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let ratio = normalized_levenshtein(a, b);
        let sorted = normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b));
        let set = token_set_score(a, b);
        ratio.max(sorted).max(set).clamp(0.0, 1.0)
    }
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_tokens<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

fn token_set_score(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let shared = ta.intersection(&tb).count();
    let dice = 2.0 * shared as f64 / (ta.len() + tb.len()) as f64;

    // Shared tokens first so the common part aligns.
    let with_a = join_tokens(ta.intersection(&tb).chain(ta.difference(&tb)).copied());
    let with_b = join_tokens(tb.intersection(&ta).chain(tb.difference(&ta)).copied());
    let aligned = normalized_levenshtein(&with_a, &with_b);

    aligned.max(dice)
}
