//! # Pantry Common Library
//!
//! Shared code for the pantry enrichment engine including:
//! - Error and result types
//! - Configuration loading (root folder, TOML, settings)
//! - Database initialization and migrations
//! - Persisted annotation models (confidence tiers, record sources)
//! - Enrichment progress events

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::ConfidenceTier;
