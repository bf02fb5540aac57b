//! Substitution resolver
//!
//! Read-only, query-time. Lists the curated substitutes of a canonical
//! ingredient and drops the ones known to carry a forbidden allergen.
//! Substitutes without a confident or corrected match are kept but flagged
//! `unverified`, with any allergens the text itself reveals. A suggested
//! match is reported as a hint and never used to drop a substitute.

use pantry_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::allergens::AllergenRules;
use crate::db::substitutions;
use crate::normalizer::Normalizer;
use crate::resolver::Resolver;
use pantry_common::ConfidenceTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Resolved to a canonical whose allergen profile was checked
    Verified,
    /// No settled canonical match; allergen profile comes from the text alone
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Substitute {
    pub name: String,
    pub notes: Option<String>,
    /// Matched canonical; only a suggestion when unverified
    pub canonical: Option<String>,
    pub tier: ConfidenceTier,
    pub allergens: BTreeSet<String>,
    pub verification: Verification,
    /// Forbidden allergens the text of an unverified substitute mentions
    pub flagged_allergens: BTreeSet<String>,
}

/// Ordered substitutes of `canonical_name` avoiding `forbidden`
pub async fn find_substitutes(
    pool: &SqlitePool,
    resolver: &Resolver,
    rules: &AllergenRules,
    normalizer: &Normalizer,
    canonical_name: &str,
    forbidden: &BTreeSet<String>,
) -> Result<Vec<Substitute>> {
    let source = resolver
        .registry()
        .by_name(canonical_name)
        .ok_or_else(|| Error::NotFound(format!("Canonical ingredient '{}'", canonical_name.trim())))?;

    let forbidden: BTreeSet<String> = forbidden
        .iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();

    let rows = substitutions::list_for_canonical(pool, source.id).await?;
    let mut result = Vec::with_capacity(rows.len());

    for row in rows {
        let text_allergens = rules.detect(&row.substitute_name);
        let resolution = resolver.lookup(&normalizer.normalize(&row.substitute_name));
        let resolved = resolution
            .canonical_id
            .and_then(|id| resolver.registry().get(id));

        // Only a settled match vouches for the substitute's allergen profile
        let candidate = match resolved {
            Some(canonical) if resolution.tier.is_settled() => {
                let allergens: BTreeSet<String> =
                    canonical.allergens.union(&text_allergens).cloned().collect();
                if !allergens.is_disjoint(&forbidden) {
                    tracing::debug!(
                        substitute = %row.substitute_name,
                        canonical = %canonical.name,
                        "Substitute dropped: carries a forbidden allergen"
                    );
                    continue;
                }
                Substitute {
                    name: row.substitute_name,
                    notes: row.notes,
                    canonical: Some(canonical.name.clone()),
                    tier: resolution.tier,
                    allergens,
                    verification: Verification::Verified,
                    flagged_allergens: BTreeSet::new(),
                }
            }
            suggested => {
                if let Some(canonical) = suggested {
                    tracing::debug!(
                        substitute = %row.substitute_name,
                        suggested = %canonical.name,
                        "Substitute kept unverified: only a suggested match"
                    );
                }
                Substitute {
                    flagged_allergens: text_allergens.intersection(&forbidden).cloned().collect(),
                    name: row.substitute_name,
                    notes: row.notes,
                    canonical: suggested.map(|c| c.name.clone()),
                    tier: resolution.tier,
                    allergens: text_allergens,
                    verification: Verification::Unverified,
                }
            }
        };
        result.push(candidate);
    }

    Ok(result)
}
