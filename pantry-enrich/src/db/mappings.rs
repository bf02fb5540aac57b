//! Messy name → canonical mapping table operations
//!
//! At most one row per messy name (`UNIQUE(messy_name)`); every write is an
//! upsert so corrections update in place.

use pantry_common::Result;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct MessyNameMapping {
    pub messy_name: String,
    pub canonical_id: i64,
    pub confidence: Option<f64>,
}

pub async fn load_all(pool: &SqlitePool) -> Result<Vec<MessyNameMapping>> {
    let rows = sqlx::query("SELECT messy_name, canonical_id, confidence FROM messy_name_mappings ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MessyNameMapping {
            messy_name: row.get("messy_name"),
            canonical_id: row.get("canonical_id"),
            confidence: row.get("confidence"),
        })
        .collect())
}

pub async fn find(pool: &SqlitePool, messy_name: &str) -> Result<Option<MessyNameMapping>> {
    let row = sqlx::query("SELECT messy_name, canonical_id, confidence FROM messy_name_mappings WHERE messy_name = ?")
        .bind(messy_name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| MessyNameMapping {
        messy_name: row.get("messy_name"),
        canonical_id: row.get("canonical_id"),
        confidence: row.get("confidence"),
    }))
}

/// Record a mapping discovered by exact/alias match
///
/// An existing row is only overwritten when its target canonical no longer
/// exists, so a correction written by another process is never clobbered.
pub async fn insert_or_repair(
    pool: &SqlitePool,
    messy_name: &str,
    canonical_id: i64,
    confidence: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messy_name_mappings (messy_name, canonical_id, confidence)
        VALUES (?, ?, ?)
        ON CONFLICT(messy_name) DO UPDATE SET
            canonical_id = excluded.canonical_id,
            confidence = excluded.confidence,
            updated_at = CURRENT_TIMESTAMP
        WHERE messy_name_mappings.canonical_id NOT IN (SELECT id FROM canonical_ingredients)
        "#,
    )
    .bind(messy_name)
    .bind(canonical_id)
    .bind(confidence)
    .execute(pool)
    .await?;

    Ok(())
}

/// Point a messy name at a canonical, replacing any existing target
pub async fn upsert(pool: &SqlitePool, messy_name: &str, canonical_id: i64, confidence: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messy_name_mappings (messy_name, canonical_id, confidence)
        VALUES (?, ?, ?)
        ON CONFLICT(messy_name) DO UPDATE SET
            canonical_id = excluded.canonical_id,
            confidence = excluded.confidence,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(messy_name)
    .bind(canonical_id)
    .bind(confidence)
    .execute(pool)
    .await?;

    Ok(())
}
