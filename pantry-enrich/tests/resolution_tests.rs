//! Resolution persistence and correction against a real database

mod helpers;

use helpers::*;
use pantry_common::models::RecordSource;
use pantry_common::{ConfidenceTier, Error};
use pantry_enrich::{EnrichmentParameters, MatchMethod};

#[tokio::test]
async fn test_exact_hit_persists_mapping_for_next_context() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let mut ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let first = ctx.resolve_text(&pool, "2 cups all-purpose flour").await.unwrap();
    assert_eq!(first.canonical.as_deref(), Some("flour, wheat"));
    assert_eq!(first.tier, ConfidenceTier::Confident);
    assert_eq!(first.method, MatchMethod::Exact);

    let mappings = mapping_snapshot(&pool).await.unwrap();
    assert!(mappings.contains(&("all-purpose flour".to_string(), "flour, wheat".to_string())));

    let mut fresh = load_context(&pool, EnrichmentParameters::default()).await.unwrap();
    let second = fresh.resolve_text(&pool, "All-Purpose Flour").await.unwrap();
    assert_eq!(second.method, MatchMethod::Mapping);
    assert_eq!(second.canonical.as_deref(), Some("flour, wheat"));
}

#[tokio::test]
async fn test_suggested_match_is_not_persisted() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let mut ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();
    let before = mapping_snapshot(&pool).await.unwrap();

    let resolution = ctx.resolve_text(&pool, "tomatoe").await.unwrap();
    assert_eq!(resolution.tier, ConfidenceTier::Suggested);
    assert_eq!(resolution.method, MatchMethod::Similarity);

    assert_eq!(mapping_snapshot(&pool).await.unwrap(), before);
}

#[tokio::test]
async fn test_correction_overrides_mapping() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let mut ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let corrected = ctx.correct_text(&pool, "AP flour", "flour, wheat").await.unwrap();
    assert_eq!(corrected.tier, ConfidenceTier::Corrected);
    assert_eq!(corrected.method, MatchMethod::Correction);

    let mappings = mapping_snapshot(&pool).await.unwrap();
    assert!(mappings.contains(&("ap flour".to_string(), "flour, wheat".to_string())));

    let again = ctx.resolve_text(&pool, "ap flour").await.unwrap();
    assert_eq!(again.canonical.as_deref(), Some("flour, wheat"));

    let err = ctx.correct_text(&pool, "ap flour", "unobtainium").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_apply_correction_retags_record() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    seed_catalog(&pool, &[("House Blend Baking Mix", Some("enriched flour, sugar"))])
        .await
        .unwrap();
    let mut ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let resolution = ctx
        .apply_correction(&pool, RecordSource::Catalog, 1, "flour, wheat")
        .await
        .unwrap();
    assert_eq!(resolution.tier, ConfidenceTier::Corrected);

    let (_, tag, tier, allergens) = annotation_of(&pool, RecordSource::Catalog, 1).await.unwrap();
    assert_eq!(tag.as_deref(), Some("flour, wheat"));
    assert_eq!(tier, "corrected");
    assert_eq!(allergens, r#"["gluten","wheat"]"#);

    let missing = ctx
        .apply_correction(&pool, RecordSource::Catalog, 99, "flour, wheat")
        .await
        .unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
}

#[tokio::test]
async fn test_stale_mapping_is_repaired() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    sqlx::query("INSERT INTO messy_name_mappings (messy_name, canonical_id, confidence) VALUES ('all-purpose flour', 9999, 1.0)")
        .execute(&pool)
        .await
        .unwrap();
    let mut ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let resolution = ctx.resolve_text(&pool, "all-purpose flour").await.unwrap();
    assert_eq!(resolution.canonical.as_deref(), Some("flour, wheat"));
    assert_eq!(resolution.tier, ConfidenceTier::Confident);

    let flour_id = canonical_id(&pool, "flour, wheat").await.unwrap();
    let stored: i64 = sqlx::query_scalar("SELECT canonical_id FROM messy_name_mappings WHERE messy_name = 'all-purpose flour'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, flour_id);
}

#[tokio::test]
async fn test_concurrent_resolvers_share_one_mapping() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let mut ctx = ctx.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            ctx.resolve_text(&pool, "plain flour").await.unwrap()
        }));
    }
    for handle in handles {
        let resolution = handle.await.unwrap();
        assert_eq!(resolution.canonical.as_deref(), Some("flour, wheat"));
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messy_name_mappings WHERE messy_name = 'plain flour'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_created_canonical_when_enabled() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let params = EnrichmentParameters {
        create_missing_canonicals: true,
        ..Default::default()
    };
    let ctx = load_context(&pool, params).await.unwrap();

    let (resolution, created) = ctx
        .resolver()
        .clone()
        .ensure_canonical(&pool, "dragon fruit")
        .await
        .unwrap();
    assert!(created);
    assert_eq!(resolution.method, MatchMethod::Created);
    assert!(canonical_names(&pool).await.unwrap().contains(&"dragon fruit".to_string()));
}
