//! Persisted annotation models
//!
//! Types that appear in more than one table or crate: the confidence tier
//! written onto every annotated record and the record source it lives in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Trust placed in a canonical assignment
///
/// Variant order is the single total order used wherever tiers are compared
/// or upgraded: `None < Suggested < Confident < Corrected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// No canonical assignment
    #[default]
    None,
    /// Containment or similarity match, worth curating
    Suggested,
    /// Exact mapping, name or alias match
    Confident,
    /// Explicit override by a higher-evidence pass
    Corrected,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::None => "none",
            ConfidenceTier::Suggested => "suggested",
            ConfidenceTier::Confident => "confident",
            ConfidenceTier::Corrected => "corrected",
        }
    }

    /// Tiers the enrichment driver never overwrites
    pub fn is_settled(&self) -> bool {
        matches!(self, ConfidenceTier::Confident | ConfidenceTier::Corrected)
    }

    /// Parse a stored value, reading anything unrecognized as `None`
    ///
    /// Older rows may carry ad-hoc strings ("high", "verified", "").
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(v) => v.parse().unwrap_or_else(|_| {
                tracing::debug!(value = %v, "Unrecognized stored confidence, reading as none");
                ConfidenceTier::None
            }),
            None => ConfidenceTier::None,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ConfidenceTier::None),
            "suggested" => Ok(ConfidenceTier::Suggested),
            "confident" => Ok(ConfidenceTier::Confident),
            "corrected" => Ok(ConfidenceTier::Corrected),
            other => Err(Error::InvalidInput(format!("Unknown confidence tier: {}", other))),
        }
    }
}

/// Which external table an enrichment run annotates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Packaged-food catalog (description + ingredients text)
    Catalog,
    /// Recipe ingredient lines
    Recipes,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Catalog => "catalog",
            RecordSource::Recipes => "recipes",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            RecordSource::Catalog => "catalog_records",
            RecordSource::Recipes => "recipe_ingredients",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" => Ok(RecordSource::Catalog),
            "recipes" | "recipe" => Ok(RecordSource::Recipes),
            other => Err(Error::InvalidInput(format!("Unknown record source: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_total_order() {
        assert!(ConfidenceTier::None < ConfidenceTier::Suggested);
        assert!(ConfidenceTier::Suggested < ConfidenceTier::Confident);
        assert!(ConfidenceTier::Confident < ConfidenceTier::Corrected);
        assert_eq!(
            ConfidenceTier::Suggested.max(ConfidenceTier::Corrected),
            ConfidenceTier::Corrected
        );
    }

    #[test]
    fn test_tier_parse_and_display() {
        for tier in [
            ConfidenceTier::None,
            ConfidenceTier::Suggested,
            ConfidenceTier::Confident,
            ConfidenceTier::Corrected,
        ] {
            assert_eq!(tier.as_str().parse::<ConfidenceTier>().unwrap(), tier);
        }
        assert_eq!(" Confident ".parse::<ConfidenceTier>().unwrap(), ConfidenceTier::Confident);
        assert!("high".parse::<ConfidenceTier>().is_err());
    }

    #[test]
    fn test_tier_from_stored_is_lenient() {
        assert_eq!(ConfidenceTier::from_stored(Some("verified")), ConfidenceTier::None);
        assert_eq!(ConfidenceTier::from_stored(None), ConfidenceTier::None);
        assert_eq!(ConfidenceTier::from_stored(Some("corrected")), ConfidenceTier::Corrected);
    }

    #[test]
    fn test_settled_tiers() {
        assert!(ConfidenceTier::Confident.is_settled());
        assert!(ConfidenceTier::Corrected.is_settled());
        assert!(!ConfidenceTier::Suggested.is_settled());
        assert!(!ConfidenceTier::None.is_settled());
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&ConfidenceTier::Suggested).unwrap();
        assert_eq!(json, "\"suggested\"");
    }
}
