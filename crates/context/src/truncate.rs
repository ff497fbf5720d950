//! Relevance filtering and recency truncation.
//!
//! A raw record list is cut to something the LLM can read cheaply:
//!
//! 1. If the message named records (ids or gazetteer names) and any match,
//!    return exactly the matches.
//! 2. Otherwise keep the `max_recent` most recently updated rows.
//!
//! In the recency case the summary's status histogram and amount total are
//! computed over the **full** input, so aggregate questions ("what's owed
//! across all clients?") stay correct even though most rows are dropped.

use ledgerbridge_config::RecordLimit;
use ledgerbridge_core::Record;
use ledgerbridge_core::record::{field_number, field_text};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extractor::ExtractedEntities;

/// Status bucket for rows with no status value.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Facts about the full list that survive truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationSummary {
    /// Rows in the returned subset.
    pub shown: usize,
    /// Rows in the full input.
    pub total: usize,
    /// Whether the subset came from exact-match filtering.
    pub filtered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_breakdown: Option<BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

/// A bounded subset plus its summary. `summary` is `None` only for an
/// empty input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truncated {
    pub records: Vec<Record>,
    pub summary: Option<TruncationSummary>,
}

/// Filter or truncate `records` according to `limit`.
pub fn truncate(records: &[Record], entities: &ExtractedEntities, limit: &RecordLimit) -> Truncated {
    if records.is_empty() {
        return Truncated {
            records: Vec::new(),
            summary: None,
        };
    }

    if entities.has_filters() {
        let matches: Vec<Record> = records
            .iter()
            .filter(|r| is_match(r, entities, limit))
            .cloned()
            .collect();
        if !matches.is_empty() {
            return Truncated {
                summary: Some(TruncationSummary {
                    shown: matches.len(),
                    total: records.len(),
                    filtered: true,
                    status_breakdown: None,
                    total_amount: None,
                }),
                records: matches,
            };
        }
    }

    let status_breakdown = limit
        .status_field
        .as_deref()
        .map(|field| histogram(records, field));
    let total_amount = limit
        .amount_field
        .as_deref()
        .map(|field| sum(records, field));

    let subset = most_recent(records, &limit.timestamp_field, limit.max_recent);
    Truncated {
        summary: Some(TruncationSummary {
            shown: subset.len(),
            total: records.len(),
            filtered: false,
            status_breakdown,
            total_amount,
        }),
        records: subset,
    }
}

fn is_match(record: &Record, entities: &ExtractedEntities, limit: &RecordLimit) -> bool {
    let id_hit = field_text(record, &limit.id_field)
        .is_some_and(|id| entities.ids.contains(&id.to_uppercase()));
    if id_hit {
        return true;
    }
    field_text(record, &limit.name_field).is_some_and(|name| {
        let name = name.to_lowercase();
        entities.names.iter().any(|n| name.contains(n.as_str()))
    })
}

/// Newest `n` rows by `timestamp_field`, descending. Rows without a
/// timestamp sort last; equal timestamps keep input order.
fn most_recent(records: &[Record], timestamp_field: &str, n: usize) -> Vec<Record> {
    let mut ordered: Vec<(Option<String>, &Record)> = records
        .iter()
        .map(|r| (field_text(r, timestamp_field), r))
        .collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0));
    ordered.into_iter().take(n).map(|(_, r)| r.clone()).collect()
}

fn histogram(records: &[Record], field: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let status = field_text(record, field)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

/// Sum of the numeric values of `field`. Non-numeric values are skipped.
fn sum(records: &[Record], field: &str) -> f64 {
    records.iter().filter_map(|r| field_number(r, field)).sum()
}
