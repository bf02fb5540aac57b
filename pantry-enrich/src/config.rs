//! Enrichment parameter resolution
//!
//! Each parameter resolves independently, first hit wins:
//! 1. Command-line override for this run
//! 2. Database `settings` table (authoritative)
//! 3. Environment variable
//! 4. TOML `[enrichment]` section
//! 5. Compiled default

use pantry_common::config::TomlConfig;
use pantry_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::db::settings;
use crate::models::parameters::{
    default_batch_size, default_max_lock_wait_ms, default_min_key_length, default_similarity_threshold,
    default_workers,
};
use crate::models::EnrichmentParameters;

pub const ENV_BATCH_SIZE: &str = "PANTRY_BATCH_SIZE";
pub const ENV_WORKERS: &str = "PANTRY_WORKERS";
pub const ENV_SIMILARITY_THRESHOLD: &str = "PANTRY_SIMILARITY_THRESHOLD";
pub const ENV_MIN_KEY_LENGTH: &str = "PANTRY_MIN_KEY_LENGTH";
pub const ENV_CREATE_MISSING_CANONICALS: &str = "PANTRY_CREATE_MISSING_CANONICALS";

/// Per-run command-line overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOverrides {
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub min_key_length: Option<usize>,
    pub create_missing_canonicals: Option<bool>,
}

/// Boolean setting accepting true/false, yes/no, on/off and 1/0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flag(bool);

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Flag(true)),
            "false" | "no" | "off" | "0" => Ok(Flag(false)),
            other => Err(format!("not a boolean: {}", other)),
        }
    }
}

fn env_value<T: FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={}", var, trimmed);
            None
        }
    }
}

fn check<T>(key: &str, value: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map(|_| ())
        .map_err(|e| Error::InvalidInput(format!("Invalid value for {}: {}", key, e)))
}

/// Check a settings value before it is stored
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        settings::BATCH_SIZE | settings::WORKERS | settings::MIN_KEY_LENGTH => check::<usize>(key, value),
        settings::MAX_LOCK_WAIT_MS | settings::LOCK_RETRY_MS => check::<u64>(key, value),
        settings::SIMILARITY_THRESHOLD => {
            let threshold: f64 = value
                .trim()
                .parse()
                .map_err(|e| Error::InvalidInput(format!("Invalid value for {}: {}", key, e)))?;
            if (0.0..=1.0).contains(&threshold) {
                Ok(())
            } else {
                Err(Error::InvalidInput(format!("{} must be between 0 and 1", key)))
            }
        }
        settings::CREATE_MISSING_CANONICALS => check::<Flag>(key, value),
        other => Err(Error::InvalidInput(format!(
            "Unknown setting '{}'; known settings: {}",
            other,
            settings::KNOWN_KEYS.join(", ")
        ))),
    }
}

/// Resolve one value through CLI → database → ENV → TOML → default
async fn resolve_value<T>(
    db: &SqlitePool,
    key: &str,
    cli: Option<T>,
    env_var: Option<&str>,
    toml: Option<T>,
    default: T,
) -> Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let (value, source) = if let Some(v) = cli {
        (v, "command line")
    } else if let Some(v) = settings::get_setting::<T>(db, key).await? {
        (v, "database")
    } else if let Some(v) = env_var.and_then(env_value::<T>) {
        (v, "environment")
    } else if let Some(v) = toml {
        (v, "TOML")
    } else {
        (default, "default")
    };

    debug!(key, value = ?value, source, "Enrichment parameter resolved");
    Ok(value)
}

/// Resolve every enrichment parameter for one run
pub async fn resolve_enrichment_parameters(
    db: &SqlitePool,
    toml_config: &TomlConfig,
    overrides: &ParameterOverrides,
) -> Result<EnrichmentParameters> {
    let toml = &toml_config.enrichment;

    let batch_size = resolve_value(
        db,
        settings::BATCH_SIZE,
        overrides.batch_size,
        Some(ENV_BATCH_SIZE),
        toml.batch_size,
        default_batch_size(),
    )
    .await?;

    let workers = resolve_value(
        db,
        settings::WORKERS,
        overrides.workers,
        Some(ENV_WORKERS),
        toml.workers,
        default_workers(),
    )
    .await?;

    let similarity_threshold = resolve_value(
        db,
        settings::SIMILARITY_THRESHOLD,
        overrides.similarity_threshold,
        Some(ENV_SIMILARITY_THRESHOLD),
        toml.similarity_threshold,
        default_similarity_threshold(),
    )
    .await?;

    let min_key_length = resolve_value(
        db,
        settings::MIN_KEY_LENGTH,
        overrides.min_key_length,
        Some(ENV_MIN_KEY_LENGTH),
        toml.min_key_length,
        default_min_key_length(),
    )
    .await?;

    let Flag(create_missing_canonicals) = resolve_value(
        db,
        settings::CREATE_MISSING_CANONICALS,
        overrides.create_missing_canonicals.map(Flag),
        Some(ENV_CREATE_MISSING_CANONICALS),
        toml.create_missing_canonicals.map(Flag),
        Flag(false),
    )
    .await?;

    let max_lock_wait_ms = resolve_value(
        db,
        settings::MAX_LOCK_WAIT_MS,
        None,
        None,
        toml.db_max_lock_wait_ms,
        default_max_lock_wait_ms(),
    )
    .await?;

    let params = EnrichmentParameters {
        batch_size,
        workers,
        similarity_threshold,
        min_key_length,
        create_missing_canonicals,
        max_lock_wait_ms,
    };

    let sanitized = params.clone().sanitized();
    if sanitized != params {
        warn!(?params, ?sanitized, "Enrichment parameters out of range, clamped");
    }
    Ok(sanitized)
}
