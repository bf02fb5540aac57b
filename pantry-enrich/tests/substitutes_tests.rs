//! Allergen-aware substitution lookups over imported reference data

mod helpers;

use helpers::*;
use pantry_common::{ConfidenceTier, Error};
use pantry_enrich::{import_reference, EnrichmentParameters, ReferenceData, Verification};
use std::collections::BTreeSet;

fn labels(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_gluten_free_flour_substitutes() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let subs = ctx
        .find_substitutes(&pool, "flour, wheat", &labels(&["gluten"]))
        .await
        .unwrap();
    let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();

    // Priority order kept, barley flour dropped
    assert_eq!(names, vec!["almond flour", "rice flour", "oat flour", "cassava flour"]);

    let almond = &subs[0];
    assert_eq!(almond.verification, Verification::Verified);
    assert_eq!(almond.canonical.as_deref(), Some("almond flour"));
    assert_eq!(almond.allergens, labels(&["tree nuts"]));

    let cassava = &subs[3];
    assert_eq!(cassava.verification, Verification::Unverified);
    assert_eq!(cassava.canonical, None);
    assert!(cassava.flagged_allergens.is_empty());
}

#[tokio::test]
async fn test_forbidden_labels_are_normalized() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let subs = ctx
        .find_substitutes(&pool, "Flour, Wheat", &labels(&[" Tree Nuts", "gluten"]))
        .await
        .unwrap();
    assert!(subs.iter().all(|s| s.name != "almond flour"));
    assert!(subs.iter().all(|s| s.name != "barley flour"));
    assert!(subs.iter().any(|s| s.name == "rice flour"));
}

#[tokio::test]
async fn test_no_forbidden_allergens_keeps_everything() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let subs = ctx
        .find_substitutes(&pool, "flour, wheat", &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(subs.len(), 5);
    assert_eq!(subs[1].name, "barley flour");
}

#[tokio::test]
async fn test_unknown_canonical_is_not_found() {
    let (_dir, pool) = create_reference_db().await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let err = ctx
        .find_substitutes(&pool, "unobtainium", &labels(&["gluten"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_unverified_substitute_flags_text_allergens() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::from_toml_str(
        r#"
        version = 1

        [[canonical]]
        name = "pasta"
        aliases = ["spaghetti"]
        allergens = ["wheat", "gluten"]

        [[canonical]]
        name = "rice noodles"

        [[keyword]]
        allergen = "wheat"
        terms = ["wheat", "kamut", "spelt"]

        [[derivative]]
        term = "wheat"
        allergens = ["gluten"]

        [[substitution]]
        canonical = "pasta"
        name = "rice noodles"

        [[substitution]]
        canonical = "pasta"
        name = "kamut noodles"
        notes = "ancient wheat"
        "#,
    )
    .unwrap();
    import_reference(&pool, &data, false).await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let subs = ctx.find_substitutes(&pool, "pasta", &labels(&["wheat"])).await.unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].name, "rice noodles");
    assert_eq!(subs[0].verification, Verification::Verified);

    let kamut = &subs[1];
    assert_eq!(kamut.verification, Verification::Unverified);
    assert_eq!(kamut.notes.as_deref(), Some("ancient wheat"));
    assert_eq!(kamut.flagged_allergens, labels(&["wheat"]));
    assert!(kamut.allergens.contains("gluten"));
}

#[tokio::test]
async fn test_suggested_match_stays_unverified() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let data = ReferenceData::from_toml_str(
        r#"
        version = 1

        [[canonical]]
        name = "milk"
        allergens = ["milk"]

        [[keyword]]
        allergen = "tree nuts"
        terms = ["cashew"]

        [[exception]]
        allergen = "milk"
        phrases = ["cashew milk", "hemp milk"]

        [[substitution]]
        canonical = "milk"
        name = "cashew milk"

        [[substitution]]
        canonical = "milk"
        name = "hemp milk"
        "#,
    )
    .unwrap();
    import_reference(&pool, &data, false).await.unwrap();
    let ctx = load_context(&pool, EnrichmentParameters::default()).await.unwrap();

    let subs = ctx.find_substitutes(&pool, "milk", &labels(&["milk"])).await.unwrap();
    let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["cashew milk", "hemp milk"]);

    for sub in &subs {
        assert_eq!(sub.verification, Verification::Unverified);
        assert_eq!(sub.tier, ConfidenceTier::Suggested);
        assert_eq!(sub.canonical.as_deref(), Some("milk"));
        assert!(sub.flagged_allergens.is_empty());
    }
    assert_eq!(subs[0].allergens, labels(&["tree nuts"]));
    assert!(subs[1].allergens.is_empty());
}
