//! Canonical resolver
//!
//! Maps a cleaned key to a canonical ingredient and a confidence tier.
//! Stops at the first step that matches:
//!
//! 1. Exact mapping lookup (messy name cache) → `confident`
//! 2. Exact name/alias match → `confident`, mapping persisted
//! 3. Whole-word containment either way → `suggested`
//! 4. Normalized Levenshtein similarity ≥ threshold → `suggested`
//!
//! Ties go to the canonical with more mappings, then the lexicographically
//! smaller name. `corrected` only ever comes from [`Resolver::correct`].

use pantry_common::{ConfidenceTier, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};

use crate::db::canonical::{self, CanonicalIngredient, ORIGIN_ENRICHMENT};
use crate::db::mappings;
use crate::registry::CanonicalRegistry;

/// Unpersisted results kept per worker before the memo is reset
const MEMO_CAPACITY: usize = 50_000;

/// Which step produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Mapping,
    Exact,
    Containment,
    Similarity,
    Correction,
    Created,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub canonical_id: Option<i64>,
    pub canonical: Option<String>,
    pub tier: ConfidenceTier,
    pub method: MatchMethod,
    /// Similarity score for step 4 matches
    pub score: Option<f64>,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self {
            canonical_id: None,
            canonical: None,
            tier: ConfidenceTier::None,
            method: MatchMethod::Unresolved,
            score: None,
        }
    }

    fn matched(ingredient: &CanonicalIngredient, tier: ConfidenceTier, method: MatchMethod, score: Option<f64>) -> Self {
        Self {
            canonical_id: Some(ingredient.id),
            canonical: Some(ingredient.name.clone()),
            tier,
            method,
            score,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.canonical_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    pub similarity_threshold: f64,
    pub min_key_length: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            min_key_length: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    registry: CanonicalRegistry,
    settings: ResolverSettings,
    memo: HashMap<String, Resolution>,
}

impl Resolver {
    pub fn new(registry: CanonicalRegistry, settings: ResolverSettings) -> Self {
        Self {
            registry,
            settings,
            memo: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &CanonicalRegistry {
        &self.registry
    }

    pub fn settings(&self) -> ResolverSettings {
        self.settings
    }

    fn too_short(&self, key: &str) -> bool {
        key.trim().chars().count() < self.settings.min_key_length.max(1)
    }

    fn pick_logged(&self, key: &str, step: &str, candidates: &BTreeSet<i64>) -> Option<&CanonicalIngredient> {
        let picked = self.registry.pick(candidates)?;
        if candidates.len() > 1 {
            tracing::debug!(
                key = %key,
                step,
                candidates = ?self.registry.names_of(candidates),
                picked = picked,
                "Ambiguous match, tie broken by usage then name"
            );
        }
        self.registry.get(picked)
    }

    /// Steps 2 to 4 against the in-memory registry
    fn match_key(&self, key: &str) -> Resolution {
        let exact = self.registry.exact_candidates(key);
        if let Some(c) = self.pick_logged(key, "exact", &exact) {
            return Resolution::matched(c, ConfidenceTier::Confident, MatchMethod::Exact, Some(1.0));
        }

        let (_, contained) = self.registry.containment_candidates(key);
        if let Some(c) = self.pick_logged(key, "containment", &contained) {
            return Resolution::matched(c, ConfidenceTier::Suggested, MatchMethod::Containment, None);
        }

        let (score, similar) = self.registry.similarity_candidates(key);
        if score >= self.settings.similarity_threshold {
            if let Some(c) = self.pick_logged(key, "similarity", &similar) {
                return Resolution::matched(c, ConfidenceTier::Suggested, MatchMethod::Similarity, Some(score));
            }
        }

        Resolution::unresolved()
    }

    /// Resolve without touching the mapping cache or the database
    pub fn lookup(&self, key: &str) -> Resolution {
        if self.too_short(key) {
            return Resolution::unresolved();
        }

        if let Some(c) = self.registry.mapping(key).and_then(|id| self.registry.get(id)) {
            return Resolution::matched(c, ConfidenceTier::Confident, MatchMethod::Mapping, None);
        }

        if let Some(memo) = self.memo.get(key) {
            return memo.clone();
        }

        self.match_key(key)
    }

    /// Fetch a canonical the local registry has not seen yet
    async fn reconcile_canonical(&mut self, pool: &SqlitePool, id: i64) -> Result<Option<CanonicalIngredient>> {
        if let Some(c) = self.registry.get(id) {
            return Ok(Some(c.clone()));
        }

        let fetched = canonical::find_by_id(pool, id).await?;
        if let Some(c) = &fetched {
            tracing::debug!(canonical = %c.name, id, "Reconciled canonical created elsewhere");
            self.registry.insert_canonical(c.clone());
            self.memo.clear();
        }
        Ok(fetched)
    }

    /// Resolve a key, persisting exact/alias hits as mappings
    pub async fn resolve(&mut self, pool: &SqlitePool, key: &str) -> Result<Resolution> {
        if self.too_short(key) {
            return Ok(Resolution::unresolved());
        }

        if let Some(id) = self.registry.mapping(key) {
            if let Some(c) = self.reconcile_canonical(pool, id).await? {
                return Ok(Resolution::matched(&c, ConfidenceTier::Confident, MatchMethod::Mapping, None));
            }
            tracing::warn!(key = %key, canonical_id = id, "Mapping points at missing canonical, dropping it");
            self.registry.remove_mapping(key);
        }

        if let Some(memo) = self.memo.get(key) {
            return Ok(memo.clone());
        }

        let resolution = self.match_key(key);
        let id = match (resolution.method, resolution.canonical_id) {
            (MatchMethod::Exact, Some(id)) => id,
            _ => {
                if self.memo.len() >= MEMO_CAPACITY {
                    self.memo.clear();
                }
                self.memo.insert(key.to_string(), resolution.clone());
                return Ok(resolution);
            }
        };

        mappings::insert_or_repair(pool, key, id, 1.0).await?;

        // Another writer may already own this messy name
        if let Some(stored) = mappings::find(pool, key).await? {
            if stored.canonical_id != id {
                if let Some(c) = self.reconcile_canonical(pool, stored.canonical_id).await? {
                    self.registry.insert_mapping(key, c.id);
                    self.memo.clear();
                    return Ok(Resolution::matched(&c, ConfidenceTier::Confident, MatchMethod::Mapping, None));
                }
            }
        }

        // Usage counts moved, so memoized tie-breaks may be stale
        self.registry.insert_mapping(key, id);
        self.memo.clear();
        Ok(resolution)
    }

    /// Explicit override: map `key` to `canonical_name` at tier `corrected`
    pub async fn correct(&mut self, pool: &SqlitePool, key: &str, canonical_name: &str) -> Result<Resolution> {
        if key.trim().is_empty() {
            return Err(Error::InvalidInput("Cannot correct an empty name".to_string()));
        }

        let name = canonical_name.trim().to_lowercase();
        let target = match self.registry.by_name(&name) {
            Some(c) => c.clone(),
            None => {
                let fetched = canonical::find_by_name(pool, &name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Canonical ingredient '{}'", name)))?;
                self.registry.insert_canonical(fetched.clone());
                fetched
            }
        };

        mappings::upsert(pool, key, target.id, 1.0).await?;
        self.registry.insert_mapping(key, target.id);
        self.memo.clear();

        tracing::info!(key = %key, canonical = %target.name, "Mapping corrected");
        Ok(Resolution::matched(&target, ConfidenceTier::Corrected, MatchMethod::Correction, None))
    }

    /// Find or create a canonical named after `key`
    ///
    /// Re-queries the table before inserting; the insert relies on
    /// `UNIQUE(name)` so racing workers converge on one row. Returns the
    /// resolution and whether this call created the row.
    pub async fn ensure_canonical(&mut self, pool: &SqlitePool, key: &str) -> Result<(Resolution, bool)> {
        if self.too_short(key) {
            return Ok((Resolution::unresolved(), false));
        }

        if let Some(c) = self.registry.by_name(key) {
            return Ok((
                Resolution::matched(c, ConfidenceTier::Confident, MatchMethod::Exact, Some(1.0)),
                false,
            ));
        }

        let (ingredient, created) = match canonical::find_by_name(pool, key).await? {
            Some(existing) => (existing, false),
            None => {
                let created = canonical::insert_if_absent(pool, key, ORIGIN_ENRICHMENT).await?;
                let row = canonical::find_by_name(pool, key)
                    .await?
                    .ok_or_else(|| Error::Internal(format!("Canonical '{}' vanished after insert", key)))?;
                (row, created)
            }
        };

        self.registry.insert_canonical(ingredient.clone());
        self.memo.clear();
        mappings::insert_or_repair(pool, key, ingredient.id, 1.0).await?;
        self.registry.insert_mapping(key, ingredient.id);

        if created {
            tracing::info!(canonical = %ingredient.name, id = ingredient.id, "Created canonical ingredient");
        }

        Ok((
            Resolution::matched(&ingredient, ConfidenceTier::Confident, MatchMethod::Created, Some(1.0)),
            created,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(id: i64, name: &str, aliases: &[&str]) -> CanonicalIngredient {
        CanonicalIngredient {
            id,
            name: name.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            allergens: BTreeSet::new(),
        }
    }

    fn resolver(canonicals: Vec<CanonicalIngredient>) -> Resolver {
        Resolver::new(CanonicalRegistry::from_parts(canonicals, vec![]), ResolverSettings::default())
    }

    #[test]
    fn test_alias_match_is_confident() {
        let r = resolver(vec![ingredient(1, "flour, wheat", &["all-purpose flour"])]);
        let res = r.lookup("all-purpose flour");
        assert_eq!(res.canonical.as_deref(), Some("flour, wheat"));
        assert_eq!(res.tier, ConfidenceTier::Confident);
        assert_eq!(res.method, MatchMethod::Exact);
    }

    #[test]
    fn test_mapping_wins_over_exact() {
        let mut registry = CanonicalRegistry::from_parts(
            vec![ingredient(1, "cream", &[]), ingredient(2, "heavy cream", &[])],
            vec![],
        );
        registry.insert_mapping("cream", 2);
        let r = Resolver::new(registry, ResolverSettings::default());

        let res = r.lookup("cream");
        assert_eq!(res.canonical.as_deref(), Some("heavy cream"));
        assert_eq!(res.method, MatchMethod::Mapping);
    }

    #[test]
    fn test_containment_is_suggested() {
        let r = resolver(vec![ingredient(1, "flour, wheat", &["all-purpose flour"])]);

        let res = r.lookup("king arthur unbleached all-purpose flour");
        assert_eq!(res.canonical.as_deref(), Some("flour, wheat"));
        assert_eq!(res.tier, ConfidenceTier::Suggested);
        assert_eq!(res.method, MatchMethod::Containment);

        // Contained-by direction
        let res = r.lookup("wheat");
        assert_eq!(res.method, MatchMethod::Containment);
    }

    #[test]
    fn test_similarity_threshold() {
        let r = resolver(vec![ingredient(1, "tomato", &[])]);

        let res = r.lookup("tomatoe");
        assert_eq!(res.canonical.as_deref(), Some("tomato"));
        assert_eq!(res.tier, ConfidenceTier::Suggested);
        assert_eq!(res.method, MatchMethod::Similarity);
        assert!(res.score.unwrap() >= 0.7);

        let res = r.lookup("pineapple");
        assert_eq!(res, Resolution::unresolved());
    }

    #[test]
    fn test_similarity_tie_breaks_by_usage_then_name() {
        let mut registry = CanonicalRegistry::from_parts(
            vec![ingredient(1, "butter", &[]), ingredient(2, "batter", &[])],
            vec![],
        );
        let r = Resolver::new(registry.clone(), ResolverSettings::default());
        assert_eq!(r.lookup("bxtter").canonical.as_deref(), Some("batter"));

        registry.insert_mapping("unsalted butter", 1);
        let r = Resolver::new(registry, ResolverSettings::default());
        assert_eq!(r.lookup("bxtter").canonical.as_deref(), Some("butter"));
    }

    #[test]
    fn test_exact_tie_on_shared_alias() {
        let r = resolver(vec![ingredient(1, "scallion", &["green onion"]), ingredient(2, "spring onion", &["green onion"])]);
        assert_eq!(r.lookup("green onion").canonical.as_deref(), Some("scallion"));
    }

    #[test]
    fn test_short_and_empty_keys_unresolvable() {
        let r = resolver(vec![ingredient(1, "a", &[])]);
        assert_eq!(r.lookup(""), Resolution::unresolved());
        assert_eq!(r.lookup("a"), Resolution::unresolved());
    }

    #[test]
    fn test_never_produces_corrected() {
        let r = resolver(vec![ingredient(1, "salt", &["table salt"])]);
        for key in ["salt", "table salt", "sea salt", "slat", "xyz"] {
            assert_ne!(r.lookup(key).tier, ConfidenceTier::Corrected);
        }
    }

    #[test]
    fn test_custom_threshold() {
        let strict = ResolverSettings {
            similarity_threshold: 0.9,
            min_key_length: 2,
        };
        let r = Resolver::new(CanonicalRegistry::from_parts(vec![ingredient(1, "tomato", &[])], vec![]), strict);
        assert!(!r.lookup("tomatoe").is_resolved());
    }
}
