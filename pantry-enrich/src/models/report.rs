//! Enrichment outcomes and run report

use pantry_common::events::ProgressCounters;
use pantry_common::models::RecordSource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enrichment::checkpoint::PartitionCheckpoint;

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// At least one annotation field was written
    Updated,
    /// Nothing to change
    Skipped,
    /// No tag could be produced and nothing was written
    Unresolved,
    /// Malformed input or lost write
    Errored,
}

/// Running counters, persisted with each checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounters {
    pub records_seen: u64,
    pub updated: u64,
    pub skipped: u64,
    pub unresolved: u64,
    pub errored: u64,
    pub canonicals_created: u64,
    /// Updates that only grew the allergen set
    pub allergen_only_updates: u64,
}

impl RunCounters {
    pub fn record(&mut self, outcome: RecordOutcome) {
        self.records_seen += 1;
        match outcome {
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Unresolved => self.unresolved += 1,
            RecordOutcome::Errored => self.errored += 1,
        }
    }

    pub fn add(&mut self, other: &RunCounters) {
        self.records_seen += other.records_seen;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.unresolved += other.unresolved;
        self.errored += other.errored;
        self.canonicals_created += other.canonicals_created;
        self.allergen_only_updates += other.allergen_only_updates;
    }

    pub fn progress(&self) -> ProgressCounters {
        ProgressCounters {
            records_seen: self.records_seen,
            updated: self.updated,
            skipped: self.skipped,
            unresolved: self.unresolved,
            errored: self.errored,
        }
    }
}

/// Result of one `enrich` call
///
/// Counters cover this run only; each checkpoint carries the cumulative
/// counters of its partition across resumed runs.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    pub run_id: Uuid,
    pub job_name: String,
    pub source: RecordSource,
    pub workers: usize,
    pub batches: u64,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub elapsed_seconds: f64,
    pub records_per_second: f64,
    /// False when the run was cancelled or stopped at a batch limit
    pub completed: bool,
    pub checkpoints: Vec<PartitionCheckpoint>,
}

impl EnrichmentReport {
    pub fn throughput(records: u64, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds > 0.0 {
            records as f64 / elapsed_seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut counters = RunCounters::default();
        counters.record(RecordOutcome::Updated);
        counters.record(RecordOutcome::Updated);
        counters.record(RecordOutcome::Errored);
        assert_eq!(counters.records_seen, 3);
        assert_eq!(counters.updated, 2);
        assert_eq!(counters.errored, 1);
        assert_eq!(counters.progress().records_seen, 3);
    }

    #[test]
    fn test_counters_json_tolerates_missing_fields() {
        let counters: RunCounters = serde_json::from_str(r#"{"updated": 4}"#).unwrap();
        assert_eq!(counters.updated, 4);
        assert_eq!(counters.allergen_only_updates, 0);
    }

    #[test]
    fn test_throughput_zero_elapsed() {
        assert_eq!(EnrichmentReport::throughput(10, 0.0), 0.0);
        assert_eq!(EnrichmentReport::throughput(10, 2.0), 5.0);
    }
}
