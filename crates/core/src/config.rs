//! Configuration structures for the bid-reconciliation system.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Basis;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bidder name matching configuration.
    pub matching: MatchingConfig,
    /// Validation ledger configuration.
    pub validation: ValidationConfig,
    /// Aggregation configuration.
    pub aggregation: AggregationConfig,
}

impl Config {
    /// Parse a configuration document. Missing sections and fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        if !(m.auto_match_threshold > 0.0 && m.auto_match_threshold <= 1.0) {
            return Err(Error::config(format!(
                "matching.auto_match_threshold must be in (0, 1], got {}",
                m.auto_match_threshold
            )));
        }
        if m.suggestion_limit == 0 {
            return Err(Error::config("matching.suggestion_limit must be at least 1"));
        }
        if !(0.0..1.0).contains(&m.min_suggestion_score) {
            return Err(Error::config(format!(
                "matching.min_suggestion_score must be in [0, 1), got {}",
                m.min_suggestion_score
            )));
        }
        let tolerance = self.validation.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::config(format!(
                "validation.tolerance must be a non-negative number, got {}",
                tolerance
            )));
        }
        Ok(())
    }
}

/// Bidder name matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Top score at or above which a raw name is assigned without review.
    pub auto_match_threshold: f64,
    /// Maximum number of ranked suggestions attached to a flagged name.
    pub suggestion_limit: usize,
    /// Suggestions must score strictly above this floor.
    pub min_suggestion_score: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_match_threshold: 0.9,
            suggestion_limit: 6,
            min_suggestion_score: 0.0,
        }
    }
}

/// Validation ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Absolute tolerance for comparing recorded and live numeric metrics.
    pub tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { tolerance: 0.005 }
    }
}

/// Aggregation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Basis used when a caller does not pick one.
    pub default_basis: Basis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.matching.auto_match_threshold, 0.9);
        assert_eq!(config.matching.suggestion_limit, 6);
        assert_eq!(config.validation.tolerance, 0.005);
        assert_eq!(config.aggregation.default_basis, Basis::MedianBid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config =
            Config::from_json_str(r#"{"matching": {"suggestion_limit": 3}}"#).unwrap();
        assert_eq!(config.matching.suggestion_limit, 3);
        assert_eq!(config.matching.auto_match_threshold, 0.9);
        assert_eq!(config.validation.tolerance, 0.005);
    }

    #[test]
    fn test_basis_from_document() {
        let config =
            Config::from_json_str(r#"{"aggregation": {"default_basis": "selected_amount"}}"#)
                .unwrap();
        assert_eq!(config.aggregation.default_basis, Basis::SelectedAmount);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = Config::from_json_str(r#"{"matching": {"auto_match_threshold": 1.5}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err =
            Config::from_json_str(r#"{"validation": {"tolerance": -0.1}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
