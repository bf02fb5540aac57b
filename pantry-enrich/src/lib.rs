//! pantry-enrich library interface
//!
//! Ingredient resolution engine: turns messy ingredient and product text
//! into canonical ingredients with confidence tiers, tags allergens,
//! proposes allergen-safe substitutes and enriches record tables in
//! resumable batches.

pub mod allergens;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod models;
pub mod normalizer;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod substitutes;
pub mod utils;

pub use allergens::AllergenRules;
pub use enrichment::{enrich, EnrichOptions, EnrichmentContext};
pub use models::{EnrichmentParameters, EnrichmentReport, RecordOutcome};
pub use normalizer::{normalize, Normalizer};
pub use reference::{import_reference, ReferenceData};
pub use registry::CanonicalRegistry;
pub use resolver::{MatchMethod, Resolution, Resolver, ResolverSettings};
pub use substitutes::{find_substitutes, Substitute, Verification};
