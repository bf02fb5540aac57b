//! Batch enrichment
//!
//! Streams annotated records in fixed-size batches, resolves a canonical
//! tag for each, grows its allergen set and writes only what changed. Each
//! batch's record writes and its checkpoint commit in one transaction.

pub mod checkpoint;
pub mod context;
pub mod driver;

pub use checkpoint::{CheckpointStore, PartitionCheckpoint};
pub use context::EnrichmentContext;
pub use driver::{enrich, EnrichOptions};

use thiserror::Error;

/// Per-record failures; counted as `errored`, never abort a batch
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Malformed record {id}: {reason}")]
    Malformed { id: i64, reason: String },

    #[error("Record {id} changed since it was read (expected revision {expected_revision})")]
    Conflict { id: i64, expected_revision: i64 },

    #[error("Storage error on record {id}: {source}")]
    Storage {
        id: i64,
        #[source]
        source: pantry_common::Error,
    },
}
