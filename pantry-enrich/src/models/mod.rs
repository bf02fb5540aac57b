//! Data models for pantry-enrich

pub mod parameters;
pub mod report;

pub use parameters::EnrichmentParameters;
pub use report::{EnrichmentReport, RecordOutcome, RunCounters};
