//! Canonical ingredient table operations

use pantry_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;

use super::{label_set_json, parse_label_set};

/// Where a canonical ingredient came from
pub const ORIGIN_CURATION: &str = "curation";
pub const ORIGIN_ENRICHMENT: &str = "enrichment";

/// Canonical ingredient as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalIngredient {
    pub id: i64,
    /// Lower-cased comparison form, unique
    pub name: String,
    /// Never contains `name`
    pub aliases: BTreeSet<String>,
    pub allergens: BTreeSet<String>,
}

fn from_row(row: &SqliteRow) -> CanonicalIngredient {
    let id: i64 = row.get("id");
    let name: String = row.get("name");
    let aliases_json: String = row.get("aliases");
    let allergens_json: String = row.get("allergens");

    let aliases = parse_label_set(&aliases_json).unwrap_or_else(|| {
        tracing::warn!(canonical = %name, "Unparseable aliases column, ignoring aliases");
        BTreeSet::new()
    });
    let allergens = parse_label_set(&allergens_json).unwrap_or_else(|| {
        tracing::warn!(canonical = %name, "Unparseable allergens column, ignoring allergens");
        BTreeSet::new()
    });

    CanonicalIngredient {
        id,
        aliases: aliases.into_iter().filter(|a| *a != name).collect(),
        name,
        allergens,
    }
}

/// Load every canonical ingredient
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<CanonicalIngredient>> {
    let rows = sqlx::query("SELECT id, name, aliases, allergens FROM canonical_ingredients ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(from_row).collect())
}

/// Look up a canonical ingredient by exact name
pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<CanonicalIngredient>> {
    let row = sqlx::query("SELECT id, name, aliases, allergens FROM canonical_ingredients WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(from_row))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<CanonicalIngredient>> {
    let row = sqlx::query("SELECT id, name, aliases, allergens FROM canonical_ingredients WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(from_row))
}

/// Insert a bare canonical ingredient unless the name already exists
///
/// Returns true if this call created the row. Concurrent callers racing on
/// the same name converge on one row through `UNIQUE(name)`.
pub async fn insert_if_absent(pool: &SqlitePool, name: &str, origin: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO canonical_ingredients (name, aliases, allergens, origin)
        VALUES (?, '[]', '[]', ?)
        ON CONFLICT(name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(origin)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Insert or update a curated canonical ingredient (reference import)
///
/// Aliases and allergens are replaced with the curated sets.
pub async fn upsert_curated(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    name: &str,
    aliases: &BTreeSet<String>,
    allergens: &BTreeSet<String>,
) -> Result<()> {
    let aliases: BTreeSet<String> = aliases.iter().filter(|a| a.as_str() != name).cloned().collect();

    sqlx::query(
        r#"
        INSERT INTO canonical_ingredients (name, aliases, allergens, origin)
        VALUES (?, ?, ?, 'curation')
        ON CONFLICT(name) DO UPDATE SET
            aliases = excluded.aliases,
            allergens = excluded.allergens,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(name)
    .bind(label_set_json(&aliases))
    .bind(label_set_json(allergens))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Resolve a canonical id inside a transaction
pub async fn id_by_name(tx: &mut sqlx::Transaction<'_, Sqlite>, name: &str) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM canonical_ingredients WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(id)
}
