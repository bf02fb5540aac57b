//! Reference data import: versioning, idempotence and rollback

mod helpers;

use helpers::*;
use pantry_common::Error;
use pantry_enrich::{import_reference, ReferenceData};
use sqlx::SqlitePool;

async fn table_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn stored_version(pool: &SqlitePool) -> Option<String> {
    pantry_common::db::get_setting(pool, "reference_data_version").await.unwrap()
}

const SMALL_REFERENCE: &str = r#"
version = 2

[[canonical]]
name = "Butter"
aliases = ["Unsalted Butter", "sweet cream butter"]
allergens = ["milk"]

[[canonical]]
name = "margarine"

[[keyword]]
allergen = "milk"
terms = ["butter", "cream"]

[[exception]]
allergen = "milk"
phrases = ["cocoa butter"]

[[substitution]]
canonical = "butter"
name = "margarine"

[[substitution]]
canonical = "butter"
name = "coconut oil"
priority = 0
"#;

#[tokio::test]
async fn test_builtin_import_populates_tables() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::builtin().unwrap();

    let summary = import_reference(&pool, &data, false).await.unwrap();
    assert!(!summary.skipped);
    assert_eq!(summary.previous_version, 0);
    assert_eq!(summary.canonicals, data.canonicals.len());
    assert_eq!(table_count(&pool, "canonical_ingredients").await, data.canonicals.len() as i64);
    assert_eq!(table_count(&pool, "substitutions").await, summary.substitutions as i64);
    assert_eq!(stored_version(&pool).await.as_deref(), Some(data.version.to_string().as_str()));
}

#[tokio::test]
async fn test_same_version_is_skipped_unless_forced() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::from_toml_str(SMALL_REFERENCE).unwrap();

    import_reference(&pool, &data, false).await.unwrap();
    let canonicals = canonical_names(&pool).await.unwrap();
    let substitutions = table_count(&pool, "substitutions").await;

    let again = import_reference(&pool, &data, false).await.unwrap();
    assert!(again.skipped);
    assert_eq!(again.previous_version, 2);

    // Forced re-import upserts in place
    let forced = import_reference(&pool, &data, true).await.unwrap();
    assert!(!forced.skipped);
    assert_eq!(canonical_names(&pool).await.unwrap(), canonicals);
    assert_eq!(table_count(&pool, "substitutions").await, substitutions);
}

#[tokio::test]
async fn test_import_cleans_names_and_orders_substitutions() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::from_toml_str(SMALL_REFERENCE).unwrap();
    import_reference(&pool, &data, false).await.unwrap();

    assert_eq!(canonical_names(&pool).await.unwrap(), vec!["butter", "margarine"]);

    let aliases: String = sqlx::query_scalar("SELECT aliases FROM canonical_ingredients WHERE name = 'butter'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(aliases, r#"["sweet cream butter","unsalted butter"]"#);

    let order: Vec<String> = sqlx::query_scalar(
        "SELECT substitute_name FROM substitutions ORDER BY priority, id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(order, vec!["coconut oil", "margarine"]);
}

#[tokio::test]
async fn test_older_version_does_not_downgrade() {
    let (_dir, pool) = create_test_db().await.unwrap();
    import_reference(&pool, &ReferenceData::from_toml_str(SMALL_REFERENCE).unwrap(), false)
        .await
        .unwrap();

    let older = ReferenceData::from_toml_str(
        r#"
        version = 1

        [[canonical]]
        name = "butter"
        allergens = []
        "#,
    )
    .unwrap();
    let summary = import_reference(&pool, &older, false).await.unwrap();
    assert!(summary.skipped);

    let allergens: String = sqlx::query_scalar("SELECT allergens FROM canonical_ingredients WHERE name = 'butter'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(allergens, r#"["milk"]"#);
}

#[tokio::test]
async fn test_unknown_substitution_canonical_rolls_back() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::from_toml_str(
        r#"
        version = 1

        [[canonical]]
        name = "milk"
        allergens = ["milk"]

        [[substitution]]
        canonical = "cream cheese"
        name = "cashew spread"
        "#,
    )
    .unwrap();

    let err = import_reference(&pool, &data, false).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(table_count(&pool, "canonical_ingredients").await, 0);
    assert_eq!(stored_version(&pool).await, None);
}
