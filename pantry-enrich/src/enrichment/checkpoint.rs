//! Resumable enrichment checkpoints
//!
//! One row per (job, partition): the last record id written and the
//! partition's cumulative counters. Rows that do not fit the current run
//! (other partition count, unreadable counters) invalidate the whole job,
//! which then restarts from zero. Record writes are idempotent, so
//! re-processing is safe.

use pantry_common::Result;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool};

use crate::db::checkpoints::{self, CheckpointRow};
use crate::models::RunCounters;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionCheckpoint {
    pub job_name: String,
    pub partition_index: usize,
    pub partition_count: usize,
    /// Last record id committed by this partition
    pub last_id: i64,
    pub counters: RunCounters,
    pub updated_at: Option<String>,
}

impl PartitionCheckpoint {
    fn from_row(row: CheckpointRow) -> std::result::Result<Self, String> {
        let counters: RunCounters = serde_json::from_str(&row.counters)
            .map_err(|e| format!("unreadable counters: {}", e))?;
        let partition_index =
            usize::try_from(row.partition_index).map_err(|_| "negative partition index".to_string())?;
        let partition_count =
            usize::try_from(row.partition_count).map_err(|_| "negative partition count".to_string())?;

        Ok(Self {
            job_name: row.job_name,
            partition_index,
            partition_count,
            last_id: row.last_id,
            counters,
            updated_at: Some(row.updated_at),
        })
    }
}

/// Checkpoint access for one job
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
    job_name: String,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool, job_name: impl Into<String>) -> Self {
        Self {
            pool,
            job_name: job_name.into(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Resume positions indexed by partition
    ///
    /// Returns one slot per partition. Any inconsistency clears the job's
    /// checkpoints and yields all `None`.
    pub async fn load(&self, partition_count: usize) -> Result<Vec<Option<PartitionCheckpoint>>> {
        let rows = checkpoints::load_for_job(&self.pool, &self.job_name).await?;
        let mut slots: Vec<Option<PartitionCheckpoint>> = vec![None; partition_count];

        for row in rows {
            let problem = match PartitionCheckpoint::from_row(row) {
                Ok(cp) if cp.partition_count != partition_count => Some(format!(
                    "stored for {} partitions, running with {}",
                    cp.partition_count, partition_count
                )),
                Ok(cp) if cp.partition_index >= partition_count => {
                    Some(format!("partition index {} out of range", cp.partition_index))
                }
                Ok(cp) => {
                    let index = cp.partition_index;
                    slots[index] = Some(cp);
                    None
                }
                Err(reason) => Some(reason),
            };

            if let Some(reason) = problem {
                tracing::warn!(
                    job = %self.job_name,
                    reason = %reason,
                    "Checkpoint inconsistent, restarting job from zero"
                );
                self.reset().await?;
                return Ok(vec![None; partition_count]);
            }
        }

        let resumed = slots.iter().filter(|s| s.is_some()).count();
        if resumed > 0 {
            tracing::info!(job = %self.job_name, partitions = resumed, "Resuming from checkpoints");
        }
        Ok(slots)
    }

    /// Persist a partition position inside the batch transaction
    pub async fn save(&self, tx: &mut sqlx::Transaction<'_, Sqlite>, checkpoint: &PartitionCheckpoint) -> Result<()> {
        let counters = serde_json::to_string(&checkpoint.counters)
            .map_err(|e| pantry_common::Error::Internal(format!("Serialize counters failed: {}", e)))?;
        checkpoints::save(
            tx,
            &self.job_name,
            checkpoint.partition_index,
            checkpoint.partition_count,
            checkpoint.last_id,
            &counters,
        )
        .await
    }

    /// Current checkpoints of this job (unreadable rows are skipped)
    pub async fn list(&self) -> Result<Vec<PartitionCheckpoint>> {
        let rows = checkpoints::load_for_job(&self.pool, &self.job_name).await?;
        Ok(rows.into_iter().filter_map(|r| PartitionCheckpoint::from_row(r).ok()).collect())
    }

    pub async fn reset(&self) -> Result<u64> {
        let removed = checkpoints::delete_job(&self.pool, &self.job_name).await?;
        if removed > 0 {
            tracing::info!(job = %self.job_name, removed, "Checkpoints cleared");
        }
        Ok(removed)
    }
}

/// Raw checkpoint rows of every job, for inspection
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CheckpointRow>> {
    checkpoints::list_all(pool).await
}
