//! Explicit enrichment state
//!
//! Everything a resolution or tagging call needs, passed by value to each
//! worker: the resolver with its registry and mapping cache, the allergen
//! rules, the normalizer and the run parameters.

use pantry_common::models::RecordSource;
use pantry_common::{ConfidenceTier, Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::allergens::AllergenRules;
use crate::db::{self, records};
use crate::models::EnrichmentParameters;
use crate::normalizer::Normalizer;
use crate::registry::CanonicalRegistry;
use crate::resolver::{Resolution, Resolver};
use crate::substitutes::{self, Substitute};

#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    resolver: Resolver,
    rules: Arc<AllergenRules>,
    normalizer: Arc<Normalizer>,
    params: EnrichmentParameters,
}

impl EnrichmentContext {
    pub fn new(
        registry: CanonicalRegistry,
        rules: AllergenRules,
        normalizer: Normalizer,
        params: EnrichmentParameters,
    ) -> Self {
        let params = params.sanitized();
        Self {
            resolver: Resolver::new(registry, params.resolver_settings()),
            rules: Arc::new(rules),
            normalizer: Arc::new(normalizer),
            params,
        }
    }

    /// Load the registry, mapping cache and allergen rules
    pub async fn load(pool: &SqlitePool, normalizer: Normalizer, params: EnrichmentParameters) -> Result<Self> {
        let registry = CanonicalRegistry::load(pool).await?;
        let rules = AllergenRules::load(pool).await?;
        if registry.is_empty() {
            tracing::warn!("No canonical ingredients loaded; import reference data first");
        }
        Ok(Self::new(registry, rules, normalizer, params))
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn rules(&self) -> &AllergenRules {
        &self.rules
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn params(&self) -> &EnrichmentParameters {
        &self.params
    }

    /// Normalize free text and resolve it, populating the mapping cache
    pub async fn resolve_text(&mut self, pool: &SqlitePool, text: &str) -> Result<Resolution> {
        let key = self.normalizer.normalize(text);
        self.resolver.resolve(pool, &key).await
    }

    /// Allergens in `text`, grown from `existing`
    pub fn tag_allergens(&self, text: &str, existing: &BTreeSet<String>) -> BTreeSet<String> {
        self.rules.tag_allergens(text, existing)
    }

    pub async fn find_substitutes(
        &self,
        pool: &SqlitePool,
        canonical_name: &str,
        forbidden: &BTreeSet<String>,
    ) -> Result<Vec<Substitute>> {
        substitutes::find_substitutes(pool, &self.resolver, &self.rules, &self.normalizer, canonical_name, forbidden)
            .await
    }

    /// Map messy `text` to `canonical_name` at tier `corrected`
    pub async fn correct_text(&mut self, pool: &SqlitePool, text: &str, canonical_name: &str) -> Result<Resolution> {
        let key = self.normalizer.normalize(text);
        self.resolver.correct(pool, &key, canonical_name).await
    }

    /// Correct one record: remap its description and retag it `corrected`
    ///
    /// The record's allergen set grows by the canonical's allergens. Fails
    /// with `Conflict` if the record changed while the correction ran.
    pub async fn apply_correction(
        &mut self,
        pool: &SqlitePool,
        source: RecordSource,
        record_id: i64,
        canonical_name: &str,
    ) -> Result<Resolution> {
        let record = records::fetch_by_id(pool, source, record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} record {}", source, record_id)))?;

        let description = record.description.as_deref().unwrap_or_default();
        let resolution = self.correct_text(pool, description, canonical_name).await?;

        let mut allergens = match record.allergens.as_deref() {
            Some(json) => db::parse_label_set(json).ok_or_else(|| {
                Error::InvalidInput(format!("{} record {} has a malformed allergen set", source, record_id))
            })?,
            None => BTreeSet::new(),
        };
        if let Some(canonical) = resolution.canonical_id.and_then(|id| self.resolver.registry().get(id)) {
            allergens.extend(canonical.allergens.iter().cloned());
        }

        let mut tx = pool.begin().await?;
        let written = records::write_annotation(
            &mut tx,
            source,
            record.id,
            record.revision,
            resolution.canonical.as_deref(),
            ConfidenceTier::Corrected,
            &db::label_set_json(&allergens),
        )
        .await?;
        if !written {
            return Err(Error::Conflict(format!("{} record {} changed during correction", source, record_id)));
        }
        tx.commit().await?;

        tracing::info!(
            source = %source,
            record_id,
            canonical = ?resolution.canonical,
            "Record corrected"
        );
        Ok(resolution)
    }
}
