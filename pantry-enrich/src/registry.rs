//! In-memory canonical registry
//!
//! Holds every canonical ingredient, the messy-name mapping cache and the
//! usage counts used for tie-breaking. Loaded once per worker at run start;
//! each worker owns its copy and reconciles with the database on a miss.
//!
//! Names and aliases are indexed twice: as written (lower-cased, trimmed)
//! and in normalized form, so a curated alias such as "flour, sifted" still
//! matches the key the normalizer produces.

use pantry_common::Result;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};

use crate::db::canonical::{self, CanonicalIngredient};
use crate::db::mappings::{self, MessyNameMapping};
use crate::normalizer::normalize;

/// Split a comparison key into whole-word tokens
pub(crate) fn key_tokens(key: &str) -> Vec<&str> {
    key.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when `needle` appears as a contiguous token run inside `haystack`
pub(crate) fn contains_span(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalRegistry {
    canonicals: HashMap<i64, CanonicalIngredient>,
    by_name: HashMap<String, i64>,
    /// Name/alias comparison form → canonical ids carrying it
    keys: HashMap<String, BTreeSet<i64>>,
    /// Messy name → canonical id
    mappings: HashMap<String, i64>,
    /// Canonical id → number of mappings pointing at it
    usage: HashMap<i64, u64>,
}

impl CanonicalRegistry {
    pub fn from_parts(canonicals: Vec<CanonicalIngredient>, mappings: Vec<MessyNameMapping>) -> Self {
        let mut registry = Self::default();
        for c in canonicals {
            registry.insert_canonical(c);
        }
        for m in mappings {
            registry.insert_mapping(&m.messy_name, m.canonical_id);
        }
        registry
    }

    /// Load canonicals and mappings from the database
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let canonicals = canonical::load_all(pool).await?;
        let mappings = mappings::load_all(pool).await?;
        let registry = Self::from_parts(canonicals, mappings);

        tracing::info!(
            canonicals = registry.len(),
            mappings = registry.mapping_count(),
            "Canonical registry loaded"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.canonicals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonicals.is_empty()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn get(&self, id: i64) -> Option<&CanonicalIngredient> {
        self.canonicals.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&CanonicalIngredient> {
        self.by_name
            .get(name.trim().to_lowercase().as_str())
            .and_then(|id| self.canonicals.get(id))
    }

    pub fn usage(&self, id: i64) -> u64 {
        self.usage.get(&id).copied().unwrap_or(0)
    }

    /// Add (or replace) a canonical ingredient and index its name and aliases
    pub fn insert_canonical(&mut self, ingredient: CanonicalIngredient) {
        let id = ingredient.id;
        if let Some(previous) = self.canonicals.remove(&id) {
            self.by_name.remove(&previous.name);
            for ids in self.keys.values_mut() {
                ids.remove(&id);
            }
            self.keys.retain(|_, ids| !ids.is_empty());
        }

        let forms = std::iter::once(&ingredient.name).chain(ingredient.aliases.iter());
        for form in forms {
            let raw = form.trim().to_lowercase();
            let normalized = normalize(&raw);
            for key in [raw, normalized] {
                if !key.is_empty() {
                    self.keys.entry(key).or_default().insert(id);
                }
            }
        }

        self.by_name.insert(ingredient.name.clone(), id);
        self.canonicals.insert(id, ingredient);
    }

    pub fn mapping(&self, messy_name: &str) -> Option<i64> {
        self.mappings.get(messy_name).copied()
    }

    /// Point a messy name at a canonical, keeping usage counts in step
    pub fn insert_mapping(&mut self, messy_name: &str, canonical_id: i64) {
        if let Some(previous) = self.mappings.insert(messy_name.to_string(), canonical_id) {
            if let Some(count) = self.usage.get_mut(&previous) {
                *count = count.saturating_sub(1);
            }
        }
        *self.usage.entry(canonical_id).or_insert(0) += 1;
    }

    pub fn remove_mapping(&mut self, messy_name: &str) -> Option<i64> {
        let removed = self.mappings.remove(messy_name);
        if let Some(id) = removed {
            if let Some(count) = self.usage.get_mut(&id) {
                *count = count.saturating_sub(1);
            }
        }
        removed
    }

    /// Pick one id from tied candidates: most used, then lexicographic name
    pub fn pick(&self, candidates: &BTreeSet<i64>) -> Option<i64> {
        candidates
            .iter()
            .filter_map(|id| self.canonicals.get(id))
            .min_by(|a, b| {
                self.usage(b.id)
                    .cmp(&self.usage(a.id))
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|c| c.id)
    }

    /// Canonicals whose name or alias equals the key
    pub fn exact_candidates(&self, key: &str) -> BTreeSet<i64> {
        self.keys.get(key).cloned().unwrap_or_default()
    }

    /// Canonicals whose name/alias contains, or is contained by, the key as
    /// a whole-word span; only the longest matched span is kept
    pub fn containment_candidates(&self, key: &str) -> (usize, BTreeSet<i64>) {
        let key_toks = key_tokens(key);
        let mut best_span = 0;
        let mut best: BTreeSet<i64> = BTreeSet::new();

        for (form, ids) in &self.keys {
            if form == key {
                continue;
            }
            let form_toks = key_tokens(form);
            let span = if contains_span(&key_toks, &form_toks) {
                form_toks.len()
            } else if contains_span(&form_toks, &key_toks) {
                key_toks.len()
            } else {
                continue;
            };

            if span > best_span {
                best_span = span;
                best = ids.clone();
            } else if span == best_span {
                best.extend(ids.iter().copied());
            }
        }

        (best_span, best)
    }

    /// Best normalized-Levenshtein similarity over all names/aliases
    ///
    /// Scores are rounded to 1e-9 before comparison so float noise cannot
    /// reorder equal matches.
    pub fn similarity_candidates(&self, key: &str) -> (f64, BTreeSet<i64>) {
        let mut best_score = 0.0_f64;
        let mut best: BTreeSet<i64> = BTreeSet::new();

        for (form, ids) in &self.keys {
            let score = (strsim::normalized_levenshtein(key, form) * 1e9).round() / 1e9;
            if score > best_score {
                best_score = score;
                best = ids.clone();
            } else if score == best_score && score > 0.0 {
                best.extend(ids.iter().copied());
            }
        }

        (best_score, best)
    }

    pub fn names_of(&self, ids: &BTreeSet<i64>) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.canonicals.get(id))
            .map(|c| c.name.clone())
            .collect()
    }
}
