//! Substitution table operations

use pantry_common::Result;
use sqlx::{Row, Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRow {
    pub id: i64,
    pub canonical_id: i64,
    pub substitute_name: String,
    pub notes: Option<String>,
    pub priority: i64,
}

/// Substitutions of one canonical ingredient in curation order
pub async fn list_for_canonical(pool: &SqlitePool, canonical_id: i64) -> Result<Vec<SubstitutionRow>> {
    let rows = sqlx::query(
        r#"
        SELECT id, canonical_id, substitute_name, notes, priority
        FROM substitutions
        WHERE canonical_id = ?
        ORDER BY priority, id
        "#,
    )
    .bind(canonical_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SubstitutionRow {
            id: row.get("id"),
            canonical_id: row.get("canonical_id"),
            substitute_name: row.get("substitute_name"),
            notes: row.get("notes"),
            priority: row.get("priority"),
        })
        .collect())
}

pub async fn upsert(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    canonical_id: i64,
    substitute_name: &str,
    notes: Option<&str>,
    priority: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO substitutions (canonical_id, substitute_name, notes, priority)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(canonical_id, substitute_name) DO UPDATE SET
            notes = excluded.notes,
            priority = excluded.priority
        "#,
    )
    .bind(canonical_id)
    .bind(substitute_name)
    .bind(notes)
    .bind(priority)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
