//! Allergen tagger
//!
//! Scans free text for allergen keywords and derivative terms, expands
//! through the derivative graph and applies per-allergen exception phrases.
//!
//! Matching is whole-word on lower-case alphanumeric tokens: hyphens and
//! punctuation separate tokens, so `gluten-free` matches "Gluten Free" and
//! "GLUTEN-FREE" alike. An exception phrase only suppresses the allergen it
//! is registered for; "gluten-free wheat starch" is tagged `wheat` but not
//! `gluten`.

use pantry_common::Result;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::db;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty()
        && phrase.len() <= tokens.len()
        && tokens.windows(phrase.len()).any(|w| w == phrase)
}

fn clean_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Curated allergen reference data, ready for matching
#[derive(Debug, Clone, Default)]
pub struct AllergenRules {
    /// Token sequence → allergens it implies directly
    terms: BTreeMap<Vec<String>, BTreeSet<String>>,
    /// Allergen → parents it implies through the derivative graph
    parents: BTreeMap<String, BTreeSet<String>>,
    /// Allergen → exception phrases (tokenized)
    exceptions: BTreeMap<String, Vec<Vec<String>>>,
    labels: BTreeSet<String>,
}

impl AllergenRules {
    /// Build rules from (allergen, keyword), (derivative, allergen) and
    /// (allergen, phrase) pairs
    pub fn from_parts(
        keywords: Vec<(String, String)>,
        derivatives: Vec<(String, String)>,
        exceptions: Vec<(String, String)>,
    ) -> Self {
        let mut rules = Self::default();

        for (allergen, keyword) in keywords {
            let allergen = clean_label(&allergen);
            rules.add_term(&allergen, &allergen);
            rules.add_term(&keyword, &allergen);
            rules.labels.insert(allergen);
        }

        let mut derivative_edges = Vec::new();
        for (derivative, allergen) in derivatives {
            let allergen = clean_label(&allergen);
            rules.add_term(&allergen, &allergen);
            rules.add_term(&derivative, &allergen);
            rules.labels.insert(allergen.clone());
            derivative_edges.push((clean_label(&derivative), allergen));
        }

        // A derivative term that is itself an allergen label propagates upward
        for (derivative, allergen) in derivative_edges {
            if rules.labels.contains(&derivative) && derivative != allergen {
                rules.parents.entry(derivative).or_default().insert(allergen);
            }
        }

        for (allergen, phrase) in exceptions {
            let tokens = tokenize(&phrase);
            if !tokens.is_empty() {
                rules.exceptions.entry(clean_label(&allergen)).or_default().push(tokens);
            }
        }

        rules
    }

    /// Load rules from the allergen reference tables
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let keywords = db::allergens::load_keywords(pool).await?;
        let derivatives = db::allergens::load_derivatives(pool).await?;
        let exceptions = db::allergens::load_exceptions(pool).await?;
        let rules = Self::from_parts(keywords, derivatives, exceptions);

        tracing::info!(
            allergens = rules.labels.len(),
            terms = rules.terms.len(),
            "Allergen rules loaded"
        );
        Ok(rules)
    }

    fn add_term(&mut self, term: &str, allergen: &str) {
        let tokens = tokenize(term);
        if !tokens.is_empty() {
            self.terms.entry(tokens).or_default().insert(allergen.to_string());
        }
    }

    /// Known top-level allergen labels
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn excepted(&self, allergen: &str, tokens: &[String]) -> bool {
        self.exceptions
            .get(allergen)
            .is_some_and(|phrases| phrases.iter().any(|p| contains_phrase(tokens, p)))
    }

    /// Allergens detected in `text`, without the existing set
    pub fn detect(&self, text: &str) -> BTreeSet<String> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return BTreeSet::new();
        }

        let mut queue: VecDeque<String> = self
            .terms
            .iter()
            .filter(|(term, _)| contains_phrase(&tokens, term))
            .flat_map(|(_, allergens)| allergens.iter().cloned())
            .collect();

        // Exceptions are applied after every positive candidate is known;
        // an excepted allergen neither tags nor propagates
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut detected: BTreeSet<String> = BTreeSet::new();
        while let Some(allergen) = queue.pop_front() {
            if !visited.insert(allergen.clone()) {
                continue;
            }
            if self.excepted(&allergen, &tokens) {
                tracing::debug!(allergen = %allergen, "Allergen suppressed by exception phrase");
                continue;
            }
            if let Some(parents) = self.parents.get(&allergen) {
                queue.extend(parents.iter().cloned());
            }
            detected.insert(allergen);
        }

        detected
    }

    /// `existing ∪ detect(text)`; never removes a tag
    pub fn tag_allergens(&self, text: &str, existing: &BTreeSet<String>) -> BTreeSet<String> {
        let mut tags = existing.clone();
        tags.extend(self.detect(text));
        tags
    }
}
