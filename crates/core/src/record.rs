//! Flat records and query filters.
//!
//! Both upstream systems hand back loosely-typed rows, so a record is just a
//! JSON object. Field access helpers never fail: a missing or odd-typed field
//! reads as `None` and the caller picks the fallback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single upstream row.
pub type Record = Map<String, Value>;

/// Read a field as text. Strings are returned as-is, numbers and booleans
/// are rendered, null and nested values read as absent.
pub fn field_text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a field as a number. Accepts JSON numbers and numeric strings with
/// currency decoration (`"$1,250.00"`).
pub fn field_number(record: &Record, field: &str) -> Option<f64> {
    match record.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Active query parameters for an accounting list call.
///
/// Backed by a `BTreeMap` so the rendered signature does not depend on
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter(BTreeMap<String, String>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Canonical cache-key form: `k1=v1&k2=v2`, keys sorted. An empty
    /// filter renders as `*`.
    pub fn signature(&self) -> String {
        if self.0.is_empty() {
            return "*".into();
        }
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Whether a record satisfies every parameter (text equality).
    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(k, v)| field_text(record, k).is_some_and(|fv| fv.eq_ignore_ascii_case(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn signature_is_order_independent() {
        let a = Filter::new().with("status", "open").with("active", "true");
        let b = Filter::new().with("active", "true").with("status", "open");
        assert_eq!(a.signature(), "active=true&status=open");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn empty_signature_is_wildcard() {
        assert_eq!(Filter::new().signature(), "*");
    }

    #[test]
    fn field_number_handles_currency_strings() {
        let r = record(json!({"amount": "$1,250.50", "n": 7, "bad": "n/a"}));
        assert_eq!(field_number(&r, "amount"), Some(1250.5));
        assert_eq!(field_number(&r, "n"), Some(7.0));
        assert_eq!(field_number(&r, "bad"), None);
        assert_eq!(field_number(&r, "missing"), None);
    }

    #[test]
    fn field_text_renders_scalars() {
        let r = record(json!({"id": 42, "name": "Temple Hills", "flag": true, "obj": {}}));
        assert_eq!(field_text(&r, "id").as_deref(), Some("42"));
        assert_eq!(field_text(&r, "name").as_deref(), Some("Temple Hills"));
        assert_eq!(field_text(&r, "flag").as_deref(), Some("true"));
        assert_eq!(field_text(&r, "obj"), None);
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let r = record(json!({"active": true, "status": "Open"}));
        assert!(Filter::new().with("active", "true").matches(&r));
        assert!(Filter::new().with("status", "open").matches(&r));
        assert!(!Filter::new().with("status", "closed").matches(&r));
    }
}
