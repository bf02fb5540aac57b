//! Database access for pantry-enrich
//!
//! One module per table family. Tables themselves are created by
//! `pantry_common::db::init_database`.

pub mod allergens;
pub mod canonical;
pub mod checkpoints;
pub mod mappings;
pub mod records;
pub mod settings;
pub mod substitutions;

use std::collections::BTreeSet;

/// Parse a JSON string-array column into a label set
///
/// Labels are trimmed and lower-cased; blanks are dropped. Returns `None`
/// when the column is not a JSON array of strings.
pub fn parse_label_set(json: &str) -> Option<BTreeSet<String>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Some(BTreeSet::new());
    }

    let labels: Vec<String> = serde_json::from_str(trimmed).ok()?;
    Some(
        labels
            .iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect(),
    )
}

/// Serialize a label set for a JSON text column (sorted, so stable)
pub fn label_set_json(labels: &BTreeSet<String>) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string())
}
