//! Token estimation.
//!
//! Character heuristic: one token is roughly four bytes of English or JSON.
//! Good enough to keep a prompt under a budget without a tokenizer.

use ledgerbridge_core::Record;

/// Estimate the token count of a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for one record as it is rendered (compact JSON) plus
/// a line break.
pub fn estimate_record_tokens(record: &Record) -> usize {
    let json = serde_json::to_string(record).unwrap_or_default();
    estimate_tokens(&json) + 1
}

/// Estimate tokens for a slice of records.
pub fn estimate_records_tokens(records: &[Record]) -> usize {
    records.iter().map(estimate_record_tokens).sum()
}
