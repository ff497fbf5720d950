//! Configuration loading, validation, and management for LedgerBridge.
//!
//! Loads configuration from `~/.ledgerbridge/config.toml` with environment
//! variable overrides. Keyword lists and truncation limits are data, so
//! routing can be tuned without a rebuild.

use ledgerbridge_core::RecordKind;
use ledgerbridge_core::EntityType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ledgerbridge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session memory settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Accounting entity cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-record-kind truncation limits and field names
    #[serde(default)]
    pub truncation: TruncationConfig,

    /// Domain routing keyword lists
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Entity extraction lookup tables
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default time-to-live for session keys
    #[serde(default = "default_session_ttl")]
    pub ttl_minutes: u64,

    /// Maximum conversation turns kept per session
    #[serde(default = "default_conversation_tail")]
    pub conversation_tail: usize,
}

fn default_session_ttl() -> u64 {
    10
}
fn default_conversation_tail() -> usize {
    20
}

/// Upper bound for any configured lifetime: one week.
pub const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Upper bound for a single upstream call: one hour.
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 60 * 60;

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        minutes(self.ttl_minutes)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl(),
            conversation_tail: default_conversation_tail(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window for cached accounting payloads
    #[serde(default = "default_cache_ttl")]
    pub ttl_minutes: u64,

    /// How long past expiry a payload may still be served when upstream fails
    #[serde(default = "default_grace")]
    pub grace_minutes: u64,

    /// Upper bound on a single upstream list call
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_cache_ttl() -> u64 {
    5
}
fn default_grace() -> u64 {
    15
}
fn default_fetch_timeout() -> u64 {
    10
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        minutes(self.ttl_minutes)
    }

    pub fn grace(&self) -> Duration {
        minutes(self.grace_minutes)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_cache_ttl(),
            grace_minutes: default_grace(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// How one record list is cut down before it reaches the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLimit {
    /// Rows kept when falling back to recency ordering
    pub max_recent: usize,

    /// Field compared against extracted structured ids
    pub id_field: String,

    /// Field searched for extracted names
    pub name_field: String,

    /// Last-modified field used for recency ordering
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Field histogrammed in the summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_field: Option<String>,

    /// Field summed in the summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_field: Option<String>,
}

fn default_timestamp_field() -> String {
    "updated_at".into()
}

impl RecordLimit {
    fn new(max_recent: usize, id_field: &str, name_field: &str) -> Self {
        Self {
            max_recent,
            id_field: id_field.into(),
            name_field: name_field.into(),
            timestamp_field: default_timestamp_field(),
            status_field: None,
            amount_field: None,
        }
    }

    fn with_status(mut self, field: &str) -> Self {
        self.status_field = Some(field.into());
        self
    }

    fn with_amount(mut self, field: &str) -> Self {
        self.amount_field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationConfig {
    /// Token ceiling for the whole assembled context
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    #[serde(default = "default_projects_limit")]
    pub projects: RecordLimit,

    #[serde(default = "default_clients_limit")]
    pub clients: RecordLimit,

    #[serde(default = "default_payments_limit")]
    pub payments: RecordLimit,

    #[serde(default = "default_customers_limit")]
    pub customers: RecordLimit,

    #[serde(default = "default_invoices_limit")]
    pub invoices: RecordLimit,
}

fn default_max_context_tokens() -> usize {
    6000
}
fn default_projects_limit() -> RecordLimit {
    RecordLimit::new(10, "project_id", "name")
        .with_status("status")
        .with_amount("contract_value")
}
fn default_clients_limit() -> RecordLimit {
    RecordLimit::new(15, "client_id", "name").with_amount("balance")
}
fn default_payments_limit() -> RecordLimit {
    RecordLimit::new(20, "payment_id", "client_name")
        .with_status("status")
        .with_amount("amount")
}
fn default_customers_limit() -> RecordLimit {
    RecordLimit::new(15, "id", "name").with_amount("balance")
}
fn default_invoices_limit() -> RecordLimit {
    RecordLimit::new(20, "id", "customer_name")
        .with_status("status")
        .with_amount("balance")
}

impl TruncationConfig {
    /// Limits for an operational record kind.
    pub fn for_kind(&self, kind: RecordKind) -> &RecordLimit {
        match kind {
            RecordKind::Projects => &self.projects,
            RecordKind::Clients => &self.clients,
            RecordKind::Payments => &self.payments,
        }
    }

    /// Limits for an accounting entity type.
    pub fn for_entity(&self, entity: EntityType) -> &RecordLimit {
        match entity {
            EntityType::Customer => &self.customers,
            EntityType::Invoice => &self.invoices,
        }
    }

    fn all(&self) -> [(&'static str, &RecordLimit); 5] {
        [
            ("projects", &self.projects),
            ("clients", &self.clients),
            ("payments", &self.payments),
            ("customers", &self.customers),
            ("invoices", &self.invoices),
        ]
    }
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            projects: default_projects_limit(),
            clients: default_clients_limit(),
            payments: default_payments_limit(),
            customers: default_customers_limit(),
            invoices: default_invoices_limit(),
        }
    }
}

/// Keyword tables for the domain router. Matching is whole-word and
/// case-insensitive; multi-word entries match as phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Messages shorter than this may be classified off-topic
    #[serde(default = "default_short_message_chars")]
    pub short_message_chars: usize,

    #[serde(default = "default_off_topic")]
    pub off_topic: Vec<String>,

    #[serde(default = "default_comparison")]
    pub comparison: Vec<String>,

    /// Words naming the operational store itself
    #[serde(default = "default_operational_names")]
    pub operational_names: Vec<String>,

    /// Words naming the accounting service itself
    #[serde(default = "default_accounting_names")]
    pub accounting_names: Vec<String>,

    #[serde(default = "default_follow_up")]
    pub follow_up: Vec<String>,

    #[serde(default = "default_accounting")]
    pub accounting: Vec<String>,

    #[serde(default = "default_operational")]
    pub operational: Vec<String>,

    #[serde(default = "default_payment")]
    pub payment: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_short_message_chars() -> usize {
    40
}
fn default_off_topic() -> Vec<String> {
    words(&[
        "hi", "hello", "hey", "thanks", "thank you", "thx", "good morning",
        "good afternoon", "good evening", "how are you", "bye", "goodbye",
    ])
}
fn default_comparison() -> Vec<String> {
    words(&[
        "compare", "comparison", "sync", "synced", "match", "mismatch", "reconcile",
        "difference", "differences", "discrepancy", "versus", "vs",
    ])
}
fn default_operational_names() -> Vec<String> {
    words(&["sheet", "sheets", "spreadsheet", "internal", "our records"])
}
fn default_accounting_names() -> Vec<String> {
    words(&["quickbooks", "qb", "accounting", "books"])
}
fn default_follow_up() -> Vec<String> {
    words(&["same", "also", "too", "their", "his", "her", "hers", "them"])
}
fn default_accounting() -> Vec<String> {
    words(&[
        "invoice", "invoices", "customer", "customers", "balance", "balances", "owed",
        "owe", "owes", "outstanding", "overdue", "unpaid", "billing", "billed",
        "quickbooks",
    ])
}
fn default_operational() -> Vec<String> {
    words(&[
        "project", "projects", "job", "jobs", "client", "clients", "site", "sites",
        "schedule", "status", "crew", "estimate", "estimates", "permit", "permits",
    ])
}
fn default_payment() -> Vec<String> {
    words(&[
        "payment", "payments", "paid", "deposit", "deposits", "check", "checks",
        "received",
    ])
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            short_message_chars: default_short_message_chars(),
            off_topic: default_off_topic(),
            comparison: default_comparison(),
            operational_names: default_operational_names(),
            accounting_names: default_accounting_names(),
            follow_up: default_follow_up(),
            accounting: default_accounting(),
            operational: default_operational(),
            payment: default_payment(),
        }
    }
}

/// Lookup tables for the entity extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Known entity-name keywords (lower case)
    #[serde(default = "default_gazetteer")]
    pub gazetteer: Vec<String>,

    /// Relative-date phrases recognised as hints
    #[serde(default = "default_date_phrases")]
    pub date_phrases: Vec<String>,
}

fn default_gazetteer() -> Vec<String> {
    words(&[
        "temple", "oakridge", "riverside", "maple", "summit", "harbor", "cedar",
        "lakeview",
    ])
}
fn default_date_phrases() -> Vec<String> {
    words(&["today", "last week", "last month", "this month", "recent", "yesterday"])
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            gazetteer: default_gazetteer(),
            date_phrases: default_date_phrases(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ledgerbridge/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `LEDGERBRIDGE_SESSION_TTL_MINUTES`
    /// - `LEDGERBRIDGE_CACHE_TTL_MINUTES`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ledgerbridge")
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(minutes) = env_minutes("LEDGERBRIDGE_SESSION_TTL_MINUTES")? {
            self.session.ttl_minutes = minutes;
        }
        if let Some(minutes) = env_minutes("LEDGERBRIDGE_CACHE_TTL_MINUTES")? {
            self.cache.ttl_minutes = minutes;
        }
        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_minutes must be > 0".into(),
            ));
        }

        if self.cache.ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_minutes must be > 0".into(),
            ));
        }

        for (name, value) in [
            ("session.ttl_minutes", self.session.ttl_minutes),
            ("cache.ttl_minutes", self.cache.ttl_minutes),
            ("cache.grace_minutes", self.cache.grace_minutes),
        ] {
            if value > MAX_TTL_MINUTES {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be <= {MAX_TTL_MINUTES}"
                )));
            }
        }

        if self.cache.fetch_timeout_secs == 0
            || self.cache.fetch_timeout_secs > MAX_FETCH_TIMEOUT_SECS
        {
            return Err(ConfigError::ValidationError(format!(
                "cache.fetch_timeout_secs must be between 1 and {MAX_FETCH_TIMEOUT_SECS}"
            )));
        }

        if self.truncation.max_context_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "truncation.max_context_tokens must be > 0".into(),
            ));
        }

        for (name, limit) in self.truncation.all() {
            if limit.max_recent == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "truncation.{name}.max_recent must be > 0"
                )));
            }
            if limit.id_field.is_empty() || limit.name_field.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "truncation.{name} needs id_field and name_field"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn env_minutes(var: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::ValidationError(format!("{var}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ledgerbridge_core::Error {
    fn from(err: ConfigError) -> Self {
        ledgerbridge_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.ttl_minutes, 10);
        assert_eq!(config.cache.ttl_minutes, 5);
        assert_eq!(config.truncation.projects.max_recent, 10);
        assert_eq!(config.truncation.clients.max_recent, 15);
        assert_eq!(config.truncation.payments.max_recent, 20);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.session.ttl_minutes, config.session.ttl_minutes);
        assert_eq!(parsed.routing.follow_up, config.routing.follow_up);
        assert_eq!(
            parsed.truncation.payments.amount_field.as_deref(),
            Some("amount")
        );
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut config = AppConfig::default();
        config.cache.ttl_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_ttls_rejected() {
        let mut config = AppConfig::default();
        config.session.ttl_minutes = u64::MAX / 60;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session.ttl_minutes"));

        let mut config = AppConfig::default();
        config.cache.grace_minutes = MAX_TTL_MINUTES + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_minutes_saturate_instead_of_overflowing() {
        let mut config = AppConfig::default();
        config.session.ttl_minutes = u64::MAX;
        assert_eq!(config.session.ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn off_topic_list_is_greetings_and_thanks_only() {
        let off_topic = AppConfig::default().routing.off_topic;
        for word in ["ok", "okay", "cool", "great", "lol"] {
            assert!(!off_topic.iter().any(|w| w == word), "{word} is off-topic");
        }
        assert!(off_topic.iter().any(|w| w == "thanks"));
    }

    #[test]
    fn zero_max_recent_rejected() {
        let mut config = AppConfig::default();
        config.truncation.invoices.max_recent = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invoices"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.session.conversation_tail, 20);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[session]
ttl_minutes = 30

[routing]
off_topic = ["yo"]

[truncation.payments]
max_recent = 5
id_field = "ref"
name_field = "payer"
amount_field = "value"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.session.ttl_minutes, 30);
        assert_eq!(config.session.conversation_tail, 20);
        assert_eq!(config.routing.off_topic, vec!["yo".to_string()]);
        assert!(!config.routing.accounting.is_empty());
        assert_eq!(config.truncation.payments.max_recent, 5);
        assert_eq!(config.truncation.payments.timestamp_field, "updated_at");
        assert_eq!(config.truncation.payments.status_field, None);
        assert_eq!(config.truncation.projects.max_recent, 10);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session\nttl_minutes = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn limits_by_kind_and_entity() {
        let config = TruncationConfig::default();
        assert_eq!(config.for_kind(RecordKind::Payments).id_field, "payment_id");
        assert_eq!(config.for_entity(EntityType::Invoice).name_field, "customer_name");
    }

    #[test]
    fn durations_are_minutes() {
        let config = AppConfig::default();
        assert_eq!(config.session.ttl(), Duration::from_secs(600));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("quickbooks"));
    }
}
