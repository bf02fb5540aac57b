//! Annotated record access (catalog records and recipe ingredient lines)
//!
//! Both tables expose the same annotation columns; recipe lines map `line`
//! onto `description`. Writes are conditional on `revision` so a concurrent
//! writer is detected instead of overwritten.

use pantry_common::models::RecordSource;
use pantry_common::{ConfidenceTier, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

/// Record row exactly as stored, before annotation parsing
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: i64,
    pub description: Option<String>,
    pub ingredients_text: Option<String>,
    pub canonical_tag: Option<String>,
    pub confidence: Option<String>,
    pub allergens: Option<String>,
    pub revision: i64,
}

fn select_columns(source: RecordSource) -> &'static str {
    match source {
        RecordSource::Catalog => {
            "id, description, ingredients_text, canonical_tag, canonical_tag_confidence, allergens, revision"
        }
        RecordSource::Recipes => {
            "id, line AS description, NULL AS ingredients_text, canonical_tag, canonical_tag_confidence, allergens, revision"
        }
    }
}

fn from_row(row: &SqliteRow) -> RawRecord {
    RawRecord {
        id: row.get("id"),
        description: row.get("description"),
        ingredients_text: row.get("ingredients_text"),
        canonical_tag: row.get("canonical_tag"),
        confidence: row.get("canonical_tag_confidence"),
        allergens: row.get("allergens"),
        revision: row.get("revision"),
    }
}

/// Next page of one partition, keyset-paged by id
///
/// Partition `index` of `count` holds the ids with `id mod count = index`
/// (non-negative modulus, so negative ids are claimed too).
pub async fn fetch_partition_batch(
    pool: &SqlitePool,
    source: RecordSource,
    partition_index: usize,
    partition_count: usize,
    after_id: Option<i64>,
    limit: usize,
) -> Result<Vec<RawRecord>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM {}
        WHERE id > ? AND ((id % ?) + ?) % ? = ?
        ORDER BY id
        LIMIT ?
        "#,
        select_columns(source),
        source.table()
    );

    let count = partition_count as i64;
    let rows = sqlx::query(&sql)
        .bind(after_id.unwrap_or(i64::MIN))
        .bind(count)
        .bind(count)
        .bind(count)
        .bind(partition_index as i64)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(from_row).collect())
}

pub async fn fetch_by_id(pool: &SqlitePool, source: RecordSource, id: i64) -> Result<Option<RawRecord>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", select_columns(source), source.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(from_row))
}

/// Write annotation fields if the record is still at `expected_revision`
///
/// Returns false when the revision moved (another writer got there first);
/// nothing is written in that case.
pub async fn write_annotation(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    source: RecordSource,
    id: i64,
    expected_revision: i64,
    canonical_tag: Option<&str>,
    confidence: ConfidenceTier,
    allergens_json: &str,
) -> Result<bool> {
    let sql = format!(
        r#"
        UPDATE {}
        SET canonical_tag = ?,
            canonical_tag_confidence = ?,
            allergens = ?,
            revision = revision + 1
        WHERE id = ? AND revision = ?
        "#,
        source.table()
    );

    let result = sqlx::query(&sql)
        .bind(canonical_tag)
        .bind(confidence.as_str())
        .bind(allergens_json)
        .bind(id)
        .bind(expected_revision)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() == 1)
}
