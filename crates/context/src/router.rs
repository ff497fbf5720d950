//! Domain routing: which upstream domains does this message need?
//!
//! Rules, first match wins:
//!
//! 1. Short message with an off-topic keyword → `{none}`
//! 2. Comparison keyword plus both systems named → both domains
//! 3. Follow-up keyword and the previous turn loaded accounting → both domains
//! 4. Union of keyword-matched domains (payment words imply conversational)
//! 5. Nothing matched → `{conversational}`
//!
//! Matching is whole-word and case-insensitive, so "her" does not fire on
//! "here". Routing is a pure function of the message and the session
//! snapshot it is given.

use ledgerbridge_config::RoutingConfig;
use ledgerbridge_core::{Domain, DomainSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::session_keys::LAST_DOMAINS_LOADED;

/// Which rule produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteRule {
    OffTopic,
    Comparison,
    FollowUp,
    Keywords,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub domains: DomainSet,
    pub rule: RouteRule,
}

/// Keyword lists, pre-normalised at construction.
#[derive(Debug, Clone)]
pub struct DomainRouter {
    short_message_chars: usize,
    off_topic: Vec<String>,
    comparison: Vec<String>,
    operational_names: Vec<String>,
    accounting_names: Vec<String>,
    follow_up: Vec<String>,
    accounting: Vec<String>,
    operational: Vec<String>,
    payment: Vec<String>,
}

impl DomainRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            short_message_chars: config.short_message_chars,
            off_topic: normalize_all(&config.off_topic),
            comparison: normalize_all(&config.comparison),
            operational_names: normalize_all(&config.operational_names),
            accounting_names: normalize_all(&config.accounting_names),
            follow_up: normalize_all(&config.follow_up),
            accounting: normalize_all(&config.accounting),
            operational: normalize_all(&config.operational),
            payment: normalize_all(&config.payment),
        }
    }

    /// Domains to load for `message`, given the session snapshot taken
    /// before this turn's writes.
    pub fn route(&self, message: &str, memory: &HashMap<String, Value>) -> DomainSet {
        self.route_explained(message, memory).domains
    }

    /// Like [`route`](Self::route), also reporting which rule fired.
    pub fn route_explained(&self, message: &str, memory: &HashMap<String, Value>) -> RouteDecision {
        let text = padded(message);

        let is_short = message.trim().chars().count() < self.short_message_chars;
        if is_short && any_phrase(&text, &self.off_topic) {
            return decision([Domain::None], RouteRule::OffTopic);
        }

        if any_phrase(&text, &self.comparison)
            && any_phrase(&text, &self.operational_names)
            && any_phrase(&text, &self.accounting_names)
        {
            return decision(
                [Domain::Conversational, Domain::ExternalAccounting],
                RouteRule::Comparison,
            );
        }

        if any_phrase(&text, &self.follow_up)
            && previous_domains(memory).contains(&Domain::ExternalAccounting)
        {
            return decision(
                [Domain::Conversational, Domain::ExternalAccounting],
                RouteRule::FollowUp,
            );
        }

        let mut domains = DomainSet::new();
        if any_phrase(&text, &self.accounting) {
            domains.insert(Domain::ExternalAccounting);
        }
        if any_phrase(&text, &self.operational) || any_phrase(&text, &self.payment) {
            domains.insert(Domain::Conversational);
        }
        if !domains.is_empty() {
            return RouteDecision {
                domains,
                rule: RouteRule::Keywords,
            };
        }

        decision([Domain::Conversational], RouteRule::Default)
    }
}

impl Default for DomainRouter {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

/// Domains recorded by the previous turn. Unreadable entries are ignored.
pub fn previous_domains(memory: &HashMap<String, Value>) -> DomainSet {
    match memory.get(LAST_DOMAINS_LOADED) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| s.parse::<Domain>().ok())
            .collect(),
        _ => DomainSet::new(),
    }
}

fn decision<const N: usize>(domains: [Domain; N], rule: RouteRule) -> RouteDecision {
    RouteDecision {
        domains: domains.into_iter().collect(),
        rule,
    }
}

/// Lower-case, punctuation to spaces, single-spaced, no padding.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised text with a space at each end, for whole-word lookups.
fn padded(text: &str) -> String {
    format!(" {} ", normalize(text))
}

fn normalize_all(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| normalize(w))
        .filter(|w| !w.is_empty())
        .collect()
}

fn any_phrase(padded_text: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|p| padded_text.contains(&format!(" {p} ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty() -> HashMap<String, Value> {
        HashMap::new()
    }

    fn after(domains: Value) -> HashMap<String, Value> {
        HashMap::from([(LAST_DOMAINS_LOADED.to_string(), domains)])
    }

    fn set(domains: &[Domain]) -> DomainSet {
        domains.iter().copied().collect()
    }

    #[test]
    fn short_greeting_is_off_topic() {
        let router = DomainRouter::default();
        let d = router.route_explained("Hi there!", &empty());
        assert_eq!(d.domains, set(&[Domain::None]));
        assert_eq!(d.rule, RouteRule::OffTopic);
    }

    #[test]
    fn long_message_with_greeting_is_not_off_topic() {
        let router = DomainRouter::default();
        let d = router.route(
            "hello, can you list every invoice that is still unpaid this quarter",
            &empty(),
        );
        assert_eq!(d, set(&[Domain::ExternalAccounting]));
    }

    #[test]
    fn comparison_with_both_systems_loads_both() {
        let router = DomainRouter::default();
        let d = router.route_explained(
            "reconcile the spreadsheet against quickbooks",
            &empty(),
        );
        assert_eq!(d.domains, set(&[Domain::Conversational, Domain::ExternalAccounting]));
        assert_eq!(d.rule, RouteRule::Comparison);
    }

    #[test]
    fn comparison_naming_one_system_falls_through() {
        let router = DomainRouter::default();
        let d = router.route_explained("compare the sheet totals for projects", &empty());
        assert_eq!(d.rule, RouteRule::Keywords);
        assert_eq!(d.domains, set(&[Domain::Conversational]));
    }

    #[test]
    fn follow_up_forces_both_after_accounting_turn() {
        let router = DomainRouter::default();
        let memory = after(json!(["external-accounting"]));
        let d = router.route_explained("same for them", &memory);
        assert_eq!(d.domains, set(&[Domain::Conversational, Domain::ExternalAccounting]));
        assert_eq!(d.rule, RouteRule::FollowUp);
    }

    #[test]
    fn follow_up_without_prior_accounting_uses_keywords() {
        let router = DomainRouter::default();
        let memory = after(json!(["conversational"]));
        let d = router.route_explained("what about their projects", &memory);
        assert_eq!(d.rule, RouteRule::Keywords);
        assert_eq!(d.domains, set(&[Domain::Conversational]));
    }

    #[test]
    fn pronoun_match_is_whole_word() {
        let router = DomainRouter::default();
        let memory = after(json!(["external-accounting"]));
        // "here" and "other" must not trigger the follow-up rule.
        let d = router.route_explained("anything else here or other things", &memory);
        assert_eq!(d.rule, RouteRule::Default);
    }

    #[test]
    fn payment_keywords_pull_in_conversational() {
        let router = DomainRouter::default();
        assert_eq!(
            router.route("which deposits came in", &empty()),
            set(&[Domain::Conversational])
        );
        assert_eq!(
            router.route("payments against overdue invoices", &empty()),
            set(&[Domain::Conversational, Domain::ExternalAccounting])
        );
    }

    #[test]
    fn unmatched_defaults_to_conversational() {
        let router = DomainRouter::default();
        let d = router.route_explained("what should I focus on this afternoon", &empty());
        assert_eq!(d.domains, set(&[Domain::Conversational]));
        assert_eq!(d.rule, RouteRule::Default);
    }

    #[test]
    fn short_question_with_filler_word_is_routed() {
        let router = DomainRouter::default();
        let decision = router.route_explained("ok, what's overdue?", &empty());
        assert_eq!(decision.rule, RouteRule::Keywords);
        assert_eq!(decision.domains, set(&[Domain::ExternalAccounting]));
    }

    #[test]
    fn routing_is_deterministic() {
        let router = DomainRouter::default();
        let memory = after(json!(["external-accounting", "conversational"]));
        for msg in ["same for her", "invoices for Temple", "thanks!", ""] {
            assert_eq!(router.route(msg, &memory), router.route(msg, &memory));
        }
    }

    #[test]
    fn malformed_previous_domains_are_ignored() {
        let memory = after(json!(["external-accounting", 7, "bogus"]));
        assert_eq!(previous_domains(&memory), set(&[Domain::ExternalAccounting]));
        assert!(previous_domains(&after(json!("nope"))).is_empty());
    }

    #[test]
    fn custom_keyword_tables() {
        let config = RoutingConfig {
            accounting: vec!["Ledger Entry".into()],
            ..RoutingConfig::default()
        };
        let router = DomainRouter::new(&config);
        assert_eq!(
            router.route("show the latest ledger-entry rows", &empty()),
            set(&[Domain::ExternalAccounting])
        );
    }
}
