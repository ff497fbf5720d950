//! Entity extraction by deterministic lookup, not NLP.
//!
//! Pulls three kinds of hint out of a message:
//! - structured record ids (`PRJ-00042`): 2–4 letters, a hyphen, 5 digits
//! - known entity names from a fixed gazetteer (substring match)
//! - relative-date phrases ("last week", "today", ...)

use ledgerbridge_config::ExtractionConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,4}-[0-9]{5}\b").expect("id pattern is valid"));

/// What a message mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Gazetteer keywords found in the message (lower case).
    #[serde(default)]
    pub names: BTreeSet<String>,
    /// Structured record ids (upper case).
    #[serde(default)]
    pub ids: BTreeSet<String>,
    /// Relative-date phrases found in the message.
    #[serde(default)]
    pub date_hints: BTreeSet<String>,
}

impl ExtractedEntities {
    /// Whether there is anything to filter records by. Date hints alone do
    /// not narrow a record list.
    pub fn has_filters(&self) -> bool {
        !self.names.is_empty() || !self.ids.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_filters() && self.date_hints.is_empty()
    }
}

/// Stateless extractor over configured lookup tables.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    gazetteer: Vec<String>,
    date_phrases: Vec<String>,
}

impl EntityExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            gazetteer: lowercase_all(&config.gazetteer),
            date_phrases: lowercase_all(&config.date_phrases),
        }
    }

    pub fn extract(&self, message: &str) -> ExtractedEntities {
        let lower = message.to_lowercase();
        let upper = message.to_uppercase();

        ExtractedEntities {
            names: contained(&lower, &self.gazetteer),
            ids: ID_PATTERN
                .find_iter(&upper)
                .map(|m| m.as_str().to_string())
                .collect(),
            date_hints: contained(&lower, &self.date_phrases),
        }
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contained(haystack: &str, needles: &[String]) -> BTreeSet<String> {
    needles
        .iter()
        .filter(|n| haystack.contains(n.as_str()))
        .cloned()
        .collect()
}
