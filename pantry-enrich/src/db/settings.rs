//! Settings accessors for pantry-enrich
//!
//! Key-value reads from the shared `settings` table. A missing key returns
//! `None` so callers can fall through to ENV, TOML and compiled defaults.

use pantry_common::{Error, Result};
use sqlx::SqlitePool;

pub const BATCH_SIZE: &str = "enrich_batch_size";
pub const WORKERS: &str = "enrich_workers";
pub const SIMILARITY_THRESHOLD: &str = "enrich_similarity_threshold";
pub const MIN_KEY_LENGTH: &str = "enrich_min_key_length";
pub const CREATE_MISSING_CANONICALS: &str = "enrich_create_missing_canonicals";
pub const MAX_LOCK_WAIT_MS: &str = "db_max_lock_wait_ms";
pub const LOCK_RETRY_MS: &str = "db_lock_retry_ms";
pub const REFERENCE_DATA_VERSION: &str = "reference_data_version";

/// Keys accepted by `settings set`
pub const KNOWN_KEYS: &[&str] = &[
    BATCH_SIZE,
    WORKERS,
    SIMILARITY_THRESHOLD,
    MIN_KEY_LENGTH,
    CREATE_MISSING_CANONICALS,
    MAX_LOCK_WAIT_MS,
    LOCK_RETRY_MS,
];

/// Generic typed setting getter
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match pantry_common::db::get_setting(db, key).await? {
        Some(value) if !value.trim().is_empty() => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Last imported reference data version (0 if never imported)
pub async fn get_reference_data_version(db: &SqlitePool) -> Result<i64> {
    get_setting(db, REFERENCE_DATA_VERSION).await.map(|opt| opt.unwrap_or(0))
}

pub async fn set_reference_data_version(db: &SqlitePool, version: i64) -> Result<()> {
    pantry_common::db::set_setting(db, REFERENCE_DATA_VERSION, &version.to_string()).await
}
