//! Allergen reference tables: keywords, derivatives, exceptions

use pantry_common::Result;
use sqlx::{Sqlite, SqlitePool};

/// (allergen, keyword) pairs
pub async fn load_keywords(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT allergen, keyword FROM allergen_keywords ORDER BY allergen, keyword")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

/// (derivative, allergen) edges
pub async fn load_derivatives(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT derivative, allergen FROM allergen_derivatives ORDER BY derivative, allergen",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// (allergen, phrase) exceptions
pub async fn load_exceptions(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT allergen, phrase FROM allergen_exceptions ORDER BY allergen, phrase")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

pub async fn insert_keyword(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    allergen: &str,
    keyword: &str,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO allergen_keywords (allergen, keyword) VALUES (?, ?)")
        .bind(allergen)
        .bind(keyword)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn insert_derivative(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    derivative: &str,
    allergen: &str,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO allergen_derivatives (derivative, allergen) VALUES (?, ?)")
        .bind(derivative)
        .bind(allergen)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn insert_exception(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    allergen: &str,
    phrase: &str,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO allergen_exceptions (allergen, phrase) VALUES (?, ?)")
        .bind(allergen)
        .bind(phrase)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
