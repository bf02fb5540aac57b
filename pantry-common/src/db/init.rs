//! Database initialization
//!
//! Creates the database on first run, applies connection pragmas, creates
//! every table idempotently, runs migrations and fills in default settings.
//!
//! The engine owns the reference tables (canonical ingredients, mappings,
//! allergen rules, substitutions) and the checkpoint table. The annotated
//! record tables (`catalog_records`, `recipe_ingredients`) belong to the
//! surrounding application; they are created here only if absent so the
//! engine can run standalone.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Parallel enrichment workers each hold at most one connection at a time
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    // Shorter busy timeout once settings exist; retry_on_lock handles the rest
    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_lock_retry_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .unwrap_or(250);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;
    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create all tables, run migrations and insert default settings
///
/// Safe to call repeatedly. Exposed separately from [`init_database`] so
/// tests can initialize a pool they opened themselves.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Reference data
    create_canonical_ingredients_table(pool).await?;
    create_messy_name_mappings_table(pool).await?;
    create_allergen_tables(pool).await?;
    create_substitutions_table(pool).await?;

    // Annotated records (external schema)
    create_catalog_records_table(pool).await?;
    create_recipe_ingredients_table(pool).await?;

    // Resumable enrichment state
    create_enrichment_checkpoints_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_canonical_ingredients_table(pool: &SqlitePool) -> Result<()> {
    // aliases/allergens hold JSON string arrays
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS canonical_ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            aliases TEXT NOT NULL DEFAULT '[]',
            allergens TEXT NOT NULL DEFAULT '[]',
            origin TEXT NOT NULL DEFAULT 'curation',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_messy_name_mappings_table(pool: &SqlitePool) -> Result<()> {
    // No foreign key: a dangling canonical_id is detected and repaired by
    // the resolver rather than rejected by the database
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messy_name_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            messy_name TEXT NOT NULL UNIQUE,
            canonical_id INTEGER NOT NULL,
            confidence REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mappings_canonical ON messy_name_mappings(canonical_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_allergen_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS allergen_keywords (
            allergen TEXT NOT NULL,
            keyword TEXT NOT NULL,
            PRIMARY KEY (allergen, keyword)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS allergen_derivatives (
            derivative TEXT NOT NULL,
            allergen TEXT NOT NULL,
            PRIMARY KEY (derivative, allergen)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS allergen_exceptions (
            allergen TEXT NOT NULL,
            phrase TEXT NOT NULL,
            PRIMARY KEY (allergen, phrase)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_substitutions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS substitutions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_id INTEGER NOT NULL,
            substitute_name TEXT NOT NULL,
            notes TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            UNIQUE (canonical_id, substitute_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_catalog_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_records (
            id INTEGER PRIMARY KEY,
            description TEXT,
            ingredients_text TEXT,
            canonical_tag TEXT,
            canonical_tag_confidence TEXT NOT NULL DEFAULT 'none',
            allergens TEXT NOT NULL DEFAULT '[]',
            revision INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recipe_ingredients_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            id INTEGER PRIMARY KEY,
            recipe_id INTEGER NOT NULL DEFAULT 0,
            line TEXT NOT NULL,
            canonical_tag TEXT,
            canonical_tag_confidence TEXT NOT NULL DEFAULT 'none',
            allergens TEXT NOT NULL DEFAULT '[]',
            revision INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_enrichment_checkpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrichment_checkpoints (
            job_name TEXT NOT NULL,
            partition_index INTEGER NOT NULL,
            partition_count INTEGER NOT NULL,
            last_id INTEGER NOT NULL DEFAULT 0,
            counters TEXT NOT NULL DEFAULT '{}',
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (job_name, partition_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings
///
/// Ensures the storage settings exist; NULL values are reset to the default.
/// `enrich_*` keys stay absent until an operator sets one; ENV and TOML
/// values apply beneath them.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;
    ensure_setting(pool, "db_lock_retry_ms", "250").await?;

    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default_value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// All settings rows, ordered by key
pub async fn list_settings(pool: &SqlitePool) -> Result<Vec<(String, Option<String>)>> {
    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(pool)
            .await?;

    Ok(rows)
}
