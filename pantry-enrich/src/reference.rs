//! Versioned reference data import
//!
//! Curated canonical ingredients, allergen rules and substitutions live in a
//! TOML file carrying an integer `version`. Import is one transaction of
//! idempotent upserts; the last imported version is recorded in settings and
//! an import that is not newer is skipped unless forced.

use pantry_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::db;

/// Reference data shipped with the crate
pub const DEFAULT_REFERENCE: &str = include_str!("../reference/default_reference.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub allergen: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeEntry {
    pub term: String,
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub allergen: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionEntry {
    pub canonical: String,
    pub name: String,
    pub notes: Option<String>,
    /// Curation order; entries without one keep their file order
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub version: i64,
    #[serde(default, rename = "canonical")]
    pub canonicals: Vec<CanonicalEntry>,
    #[serde(default, rename = "keyword")]
    pub keywords: Vec<KeywordEntry>,
    #[serde(default, rename = "derivative")]
    pub derivatives: Vec<DerivativeEntry>,
    #[serde(default, rename = "exception")]
    pub exceptions: Vec<ExceptionEntry>,
    #[serde(default, rename = "substitution")]
    pub substitutions: Vec<SubstitutionEntry>,
}

fn clean(value: &str) -> String {
    value.trim().to_lowercase()
}

fn clean_set(values: &[String]) -> BTreeSet<String> {
    values.iter().map(|v| clean(v)).filter(|v| !v.is_empty()).collect()
}

impl ReferenceData {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let data: Self = toml::from_str(content)
            .map_err(|e| Error::InvalidInput(format!("Parse reference data failed: {}", e)))?;
        data.validate()?;
        Ok(data)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The reference data compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_REFERENCE)
    }

    /// Structural checks that need no database
    pub fn validate(&self) -> Result<()> {
        if self.version < 1 {
            return Err(Error::InvalidInput(format!(
                "Reference data version must be at least 1, got {}",
                self.version
            )));
        }

        let mut names = BTreeSet::new();
        for entry in &self.canonicals {
            let name = clean(&entry.name);
            if name.is_empty() {
                return Err(Error::InvalidInput("Canonical entry with empty name".to_string()));
            }
            if !names.insert(name.clone()) {
                return Err(Error::InvalidInput(format!("Duplicate canonical entry '{}'", name)));
            }
        }

        for entry in &self.substitutions {
            if clean(&entry.name).is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Substitution for '{}' has an empty name",
                    entry.canonical.trim()
                )));
            }
        }

        Ok(())
    }
}

/// What an import wrote (or why it did not)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub version: i64,
    pub previous_version: i64,
    pub skipped: bool,
    pub canonicals: usize,
    pub keywords: usize,
    pub derivatives: usize,
    pub exceptions: usize,
    pub substitutions: usize,
}

/// Import reference data in one transaction
///
/// Substitutions may name canonicals already in the database as well as
/// ones in this file. A substitution naming an unknown canonical rejects
/// the whole import.
pub async fn import_reference(pool: &SqlitePool, data: &ReferenceData, force: bool) -> Result<ImportSummary> {
    data.validate()?;

    let previous_version = db::settings::get_reference_data_version(pool).await?;
    let mut summary = ImportSummary {
        version: data.version,
        previous_version,
        ..Default::default()
    };

    if data.version <= previous_version && !force {
        tracing::info!(
            version = data.version,
            stored_version = previous_version,
            "Reference data not newer than stored version, skipping import"
        );
        summary.skipped = true;
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;

    for entry in &data.canonicals {
        let name = clean(&entry.name);
        db::canonical::upsert_curated(&mut tx, &name, &clean_set(&entry.aliases), &clean_set(&entry.allergens))
            .await?;
        summary.canonicals += 1;
    }

    for entry in &data.keywords {
        let allergen = clean(&entry.allergen);
        for term in clean_set(&entry.terms) {
            db::allergens::insert_keyword(&mut tx, &allergen, &term).await?;
            summary.keywords += 1;
        }
    }

    for entry in &data.derivatives {
        let term = clean(&entry.term);
        for allergen in clean_set(&entry.allergens) {
            db::allergens::insert_derivative(&mut tx, &term, &allergen).await?;
            summary.derivatives += 1;
        }
    }

    for entry in &data.exceptions {
        let allergen = clean(&entry.allergen);
        for phrase in clean_set(&entry.phrases) {
            db::allergens::insert_exception(&mut tx, &allergen, &phrase).await?;
            summary.exceptions += 1;
        }
    }

    let mut ids: HashMap<String, i64> = HashMap::new();
    let mut file_order: HashMap<i64, i64> = HashMap::new();
    for entry in &data.substitutions {
        let canonical = clean(&entry.canonical);
        let canonical_id = match ids.get(&canonical) {
            Some(id) => *id,
            None => {
                let id = db::canonical::id_by_name(&mut tx, &canonical).await?.ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Substitution '{}' names unknown canonical '{}'",
                        entry.name.trim(),
                        canonical
                    ))
                })?;
                ids.insert(canonical, id);
                id
            }
        };

        let position = file_order.entry(canonical_id).or_insert(0);
        *position += 1;
        let priority = entry.priority.unwrap_or(*position);

        let notes = entry.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
        db::substitutions::upsert(&mut tx, canonical_id, &clean(&entry.name), notes, priority).await?;
        summary.substitutions += 1;
    }

    tx.commit().await?;
    db::settings::set_reference_data_version(pool, data.version).await?;

    tracing::info!(
        version = data.version,
        previous_version,
        canonicals = summary.canonicals,
        keywords = summary.keywords,
        derivatives = summary.derivatives,
        exceptions = summary.exceptions,
        substitutions = summary.substitutions,
        "Reference data imported"
    );

    Ok(summary)
}
