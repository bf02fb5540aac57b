//! Database schema migrations
//!
//! Versioned migrations tracked in `schema_version`. Each migration is
//! idempotent so a partially applied upgrade can simply be re-run.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - add a new one instead
//! 2. **Prefer ALTER TABLE** over DROP/CREATE to preserve data
//! 3. **Check before altering** - `pragma_table_info` makes column adds idempotent

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Annotated record tables and the columns the engine writes
const ANNOTATED_TABLES: [&str; 2] = ["catalog_records", "recipe_ingredients"];

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Migration v1: add annotation columns to externally created record tables
///
/// Record tables created by the surrounding application may predate the
/// engine and lack the columns it writes.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let columns = [
        ("canonical_tag", "TEXT"),
        ("canonical_tag_confidence", "TEXT NOT NULL DEFAULT 'none'"),
        ("allergens", "TEXT NOT NULL DEFAULT '[]'"),
        ("revision", "INTEGER NOT NULL DEFAULT 0"),
    ];

    for table in ANNOTATED_TABLES {
        for (column, decl) in columns {
            if !has_column(pool, table, column).await? {
                let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
                sqlx::query(&sql).execute(pool).await?;
                info!("Migration v1: Added {}.{}", table, column);
            }
        }
    }

    Ok(())
}

/// Migration v2: fold legacy confidence strings into the closed tier set
///
/// Anything outside `none|suggested|confident|corrected` becomes `none`, so
/// those records are re-resolved on the next enrichment run.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    for table in ANNOTATED_TABLES {
        let sql = format!(
            r#"
            UPDATE {}
            SET canonical_tag_confidence = 'none'
            WHERE canonical_tag_confidence IS NULL
               OR canonical_tag_confidence NOT IN ('none', 'suggested', 'confident', 'corrected')
            "#,
            table
        );
        let result = sqlx::query(&sql).execute(pool).await?;
        if result.rows_affected() > 0 {
            info!(
                "Migration v2: Reset {} legacy confidence values in {}",
                result.rows_affected(),
                table
            );
        }
    }

    Ok(())
}
