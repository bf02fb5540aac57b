//! Enrichment checkpoint rows, one per (job, partition)

use pantry_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRow {
    pub job_name: String,
    pub partition_index: i64,
    pub partition_count: i64,
    pub last_id: i64,
    /// Serialized running counters (JSON)
    pub counters: String,
    pub updated_at: String,
}

const COLUMNS: &str =
    "job_name, partition_index, partition_count, last_id, counters, CAST(updated_at AS TEXT) AS updated_at";

fn from_row(row: &SqliteRow) -> CheckpointRow {
    CheckpointRow {
        job_name: row.get("job_name"),
        partition_index: row.get("partition_index"),
        partition_count: row.get("partition_count"),
        last_id: row.get("last_id"),
        counters: row.get("counters"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn load_for_job(pool: &SqlitePool, job_name: &str) -> Result<Vec<CheckpointRow>> {
    let sql = format!(
        "SELECT {} FROM enrichment_checkpoints WHERE job_name = ? ORDER BY partition_index",
        COLUMNS
    );
    let rows = sqlx::query(&sql).bind(job_name).fetch_all(pool).await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CheckpointRow>> {
    let sql = format!(
        "SELECT {} FROM enrichment_checkpoints ORDER BY job_name, partition_index",
        COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(from_row).collect())
}

/// Save a partition's position inside the batch transaction
pub async fn save(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    job_name: &str,
    partition_index: usize,
    partition_count: usize,
    last_id: i64,
    counters_json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO enrichment_checkpoints
            (job_name, partition_index, partition_count, last_id, counters, updated_at)
        VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(job_name, partition_index) DO UPDATE SET
            partition_count = excluded.partition_count,
            last_id = excluded.last_id,
            counters = excluded.counters,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(job_name)
    .bind(partition_index as i64)
    .bind(partition_count as i64)
    .bind(last_id)
    .bind(counters_json)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Delete every checkpoint of a job, returning the number removed
pub async fn delete_job(pool: &SqlitePool, job_name: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM enrichment_checkpoints WHERE job_name = ?")
        .bind(job_name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
