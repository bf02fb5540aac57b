//! Enrichment run parameters

use serde::{Deserialize, Serialize};

use crate::resolver::ResolverSettings;

/// Tunables for one enrichment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentParameters {
    /// Records fetched and written per transaction (default: 500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallel workers, one id partition each (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Minimum normalized Levenshtein similarity for a fuzzy match (default: 0.7)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Shorter cleaned keys are never resolved (default: 2)
    #[serde(default = "default_min_key_length")]
    pub min_key_length: usize,

    /// Create a canonical for keys nothing matches (default: false)
    #[serde(default)]
    pub create_missing_canonicals: bool,

    /// Lock-contention retry budget per batch write (default: 5000 ms)
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

pub(crate) fn default_batch_size() -> usize {
    500
}

pub(crate) fn default_workers() -> usize {
    1
}

pub(crate) fn default_similarity_threshold() -> f64 {
    0.7
}

pub(crate) fn default_min_key_length() -> usize {
    2
}

pub(crate) fn default_max_lock_wait_ms() -> u64 {
    5000
}

impl Default for EnrichmentParameters {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            similarity_threshold: default_similarity_threshold(),
            min_key_length: default_min_key_length(),
            create_missing_canonicals: false,
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

impl EnrichmentParameters {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            similarity_threshold: self.similarity_threshold,
            min_key_length: self.min_key_length,
        }
    }

    /// Clamp values that would stall or disable a run
    pub fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.workers = self.workers.max(1);
        self.similarity_threshold = self.similarity_threshold.clamp(0.0, 1.0);
        self
    }
}
