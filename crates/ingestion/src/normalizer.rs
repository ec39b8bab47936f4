//! Bidder name normalization.
//!
//! Produces a comparison key only; the raw string is kept for display.

/// Tokens dropped from the comparison key: legal suffixes, conjunctions, articles.
const FOLDED_TOKENS: &[&str] = &[
    "and",
    "co",
    "company",
    "corp",
    "corporation",
    "inc",
    "incorporated",
    "limited",
    "llc",
    "llp",
    "lp",
    "ltd",
    "pc",
    "plc",
    "pllc",
    "the",
];

/// Normalize a raw bidder name into a comparison key.
///
/// Steps:
/// 1. Delete periods and apostrophes (`L.L.C.` → `llc`)
/// 2. Lower-case; every other non-alphanumeric character separates tokens
/// 3. Drop folded tokens, unless that would leave nothing
/// 4. Join tokens with single spaces
///
/// Returns an empty string when the name has no alphanumeric characters.
pub fn normalize_name(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '.' | '\'' | '\u{2019}' => {}
            c if c.is_alphanumeric() => cleaned.extend(c.to_lowercase()),
            _ => cleaned.push(' '),
        }
    }

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let folded: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !FOLDED_TOKENS.contains(t))
        .collect();

    if folded.is_empty() {
        tokens.join(" ")
    } else {
        folded.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_suffix_and_punctuation() {
        assert_eq!(normalize_name("ABC ELECTRICAL, INC."), "abc electrical");
        assert_eq!(normalize_name("ABC Electrical Inc"), "abc electrical");
    }

    #[test]
    fn test_normalize_dotted_suffix() {
        assert_eq!(normalize_name("Smith Builders, L.L.C."), "smith builders");
    }

    #[test]
    fn test_normalize_conjunctions() {
        assert_eq!(normalize_name("Smith & Sons"), "smith sons");
        assert_eq!(normalize_name("Smith and Sons Co"), "smith sons");
        assert_eq!(normalize_name("The Glass Co."), "glass");
    }

    #[test]
    fn test_normalize_apostrophe() {
        assert_eq!(normalize_name("O'Neil Mechanical"), "oneil mechanical");
        assert_eq!(normalize_name("O\u{2019}Neil Mechanical"), "oneil mechanical");
    }

    #[test]
    fn test_normalize_whitespace_collapse() {
        assert_eq!(normalize_name("  J   Smith\tCo  "), "j smith");
    }

    #[test]
    fn test_normalize_all_folded_keeps_tokens() {
        assert_eq!(normalize_name("The Company"), "the company");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name(" -- / "), "");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = "Électricité Générale S.A.";
        assert_eq!(normalize_name(raw), normalize_name(raw));
        assert_eq!(normalize_name(raw), "électricité générale sa");
    }
}
