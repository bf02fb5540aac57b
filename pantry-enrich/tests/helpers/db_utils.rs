//! Database Test Utilities
//!
//! Temporary databases seeded with reference data and annotated records

use anyhow::Result;
use pantry_common::db::init_database;
use pantry_common::models::RecordSource;
use pantry_enrich::{import_reference, EnrichmentContext, EnrichmentParameters, Normalizer, ReferenceData};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Annotation state of one record: (id, canonical_tag, tier, allergens JSON)
pub type AnnotationRow = (i64, Option<String>, String, String);

/// Create temporary test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let pool = init_database(&temp_dir.path().join("test_pantry.db")).await?;
    Ok((temp_dir, pool))
}

/// Test database with the built-in reference data imported
pub async fn create_reference_db() -> Result<(TempDir, SqlitePool)> {
    let (temp_dir, pool) = create_test_db().await?;
    import_reference(&pool, &ReferenceData::builtin()?, false).await?;
    Ok((temp_dir, pool))
}

pub async fn load_context(pool: &SqlitePool, params: EnrichmentParameters) -> Result<EnrichmentContext> {
    Ok(EnrichmentContext::load(pool, Normalizer::default(), params).await?)
}

/// Insert catalog records with ids 1..=n
pub async fn seed_catalog(pool: &SqlitePool, rows: &[(&str, Option<&str>)]) -> Result<()> {
    for (i, (description, ingredients)) in rows.iter().enumerate() {
        sqlx::query("INSERT INTO catalog_records (id, description, ingredients_text) VALUES (?, ?, ?)")
            .bind(i as i64 + 1)
            .bind(*description)
            .bind(*ingredients)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Insert recipe lines with ids 1..=n
pub async fn seed_recipes(pool: &SqlitePool, lines: &[&str]) -> Result<()> {
    for (i, line) in lines.iter().enumerate() {
        sqlx::query("INSERT INTO recipe_ingredients (id, recipe_id, line) VALUES (?, 1, ?)")
            .bind(i as i64 + 1)
            .bind(*line)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Catalog descriptions cycling through a mixed set of products
pub fn mixed_catalog(count: usize) -> Vec<(&'static str, Option<&'static str>)> {
    const PRODUCTS: &[(&str, Option<&str>)] = &[
        ("KING ARTHUR UNBLEACHED ALL-PURPOSE FLOUR 5LB", Some("unbleached hard red wheat flour, malted barley flour")),
        ("Organic Unsalted Butter", Some("pasteurized cream (milk)")),
        ("Whey Protein Isolate", Some("whey protein isolate, soy lecithin")),
        ("Gluten-Free Rolled Oats", Some("whole grain oats")),
        ("2 large eggs", None),
        ("tomatoe paste", Some("tomatoes, salt")),
        ("Creamy Peanut Butter", Some("roasted peanuts, salt")),
        ("Mystery Snack Mix", Some("corn, sunflower oil, sea salt")),
        ("Low Sodium Soy Sauce", Some("water, soybeans, wheat, salt")),
        ("Dark Chocolate Bar", Some("cocoa mass, sugar, cocoa butter")),
    ];
    PRODUCTS.iter().copied().cycle().take(count).collect()
}

pub async fn annotation_snapshot(pool: &SqlitePool, source: RecordSource) -> Result<Vec<AnnotationRow>> {
    let sql = format!(
        "SELECT id, canonical_tag, canonical_tag_confidence, allergens FROM {} ORDER BY id",
        source.table()
    );
    Ok(sqlx::query_as::<_, AnnotationRow>(&sql).fetch_all(pool).await?)
}

pub async fn annotation_of(pool: &SqlitePool, source: RecordSource, id: i64) -> Result<AnnotationRow> {
    let sql = format!(
        "SELECT id, canonical_tag, canonical_tag_confidence, allergens FROM {} WHERE id = ?",
        source.table()
    );
    Ok(sqlx::query_as::<_, AnnotationRow>(&sql).bind(id).fetch_one(pool).await?)
}

/// Mapping table as (messy_name, canonical name) pairs
pub async fn mapping_snapshot(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    Ok(sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT m.messy_name, c.name
        FROM messy_name_mappings m
        JOIN canonical_ingredients c ON c.id = m.canonical_id
        ORDER BY m.messy_name
        "#,
    )
    .fetch_all(pool)
    .await?)
}

pub async fn canonical_names(pool: &SqlitePool) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar::<_, String>("SELECT name FROM canonical_ingredients ORDER BY name")
        .fetch_all(pool)
        .await?)
}

pub async fn canonical_id(pool: &SqlitePool, name: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM canonical_ingredients WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?)
}
