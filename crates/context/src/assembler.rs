//! Context assembly for one chat turn, from message to bounded context.
//!
//! ```text
//! message ─► session snapshot ─► router ─► fetch per domain ─► truncate ─► budget
//!                                   │                                        │
//!                                   └─ extractor (filters the truncator) ◄───┘
//! ```
//!
//! [`ContextAssembler::prepare_turn`] never writes session state: routing
//! sees the snapshot taken before the turn, so follow-up detection always
//! reads the previous turn's domains. Once the caller has an answer it calls
//! [`ContextAssembler::finish_turn`] to persist the turn.
//!
//! A failing upstream narrows the context instead of failing the turn; the
//! failure is reported in [`AssembledContext::unavailable`].

use ledgerbridge_cache::{CachedAccounting, FetchOrigin};
use ledgerbridge_config::{AppConfig, TruncationConfig};
use ledgerbridge_core::{
    Domain, DomainSet, EntityType, Filter, Record, RecordKind, RecordSource, SessionError,
    UpstreamError,
};
use ledgerbridge_memory::SessionStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extractor::{EntityExtractor, ExtractedEntities};
use crate::router::{DomainRouter, RouteRule};
use crate::session_keys::{
    self, CONVERSATION, CREATED_AT, ConversationTurn, LAST_DOMAINS_LOADED, LAST_ENTITIES,
};
use crate::token;
use crate::truncate::{TruncationSummary, truncate};

// ── Types ─────────────────────────────────────────────────────────────────

/// One record list as it will be shown to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSection {
    pub domain: Domain,
    /// Record kind label, e.g. `projects` or `invoices`.
    pub source: String,
    pub records: Vec<Record>,
    pub summary: Option<TruncationSummary>,
    /// Cache provenance, for accounting sections only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<FetchOrigin>,
}

/// A record list that could not be loaded this turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainFailure {
    pub domain: Domain,
    pub source: String,
    pub reason: String,
}

/// Rows removed from a section by budget enforcement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropInfo {
    pub source: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens of the rendered context.
    pub total_tokens: usize,
    pub budget: usize,
    pub drops: Vec<DropInfo>,
}

/// The bounded context for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub session_id: String,
    pub message: String,
    /// Domains routed this turn; persisted by `finish_turn`.
    pub domains: DomainSet,
    pub rule: RouteRule,
    pub entities: ExtractedEntities,
    /// Whether `entities` were carried over from the previous turn.
    pub entities_reused: bool,
    pub sections: Vec<DomainSection>,
    pub unavailable: Vec<DomainFailure>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// Whether any requested record list failed to load.
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// Total rows across all sections.
    pub fn record_count(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    /// Text block handed to the LLM layer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.domains.contains(&Domain::None) {
            out.push_str("No business data is needed for this message.\n");
            return out;
        }

        for section in &self.sections {
            out.push_str(&section_header(section));
            out.push('\n');
            if let Some(summary) = &section.summary {
                out.push_str(&summary_line(summary));
                out.push('\n');
            }
            for record in &section.records {
                out.push_str(&serde_json::to_string(record).unwrap_or_default());
                out.push('\n');
            }
            out.push('\n');
        }

        for failure in &self.unavailable {
            let _ = writeln!(
                out,
                "## {} [{}]: unavailable ({})",
                failure.source, failure.domain, failure.reason
            );
        }
        out
    }
}

fn section_header(section: &DomainSection) -> String {
    match section.origin {
        Some(FetchOrigin::Stale) => format!(
            "## {} [{}] (cached copy, upstream unavailable)",
            section.source, section.domain
        ),
        _ => format!("## {} [{}]", section.source, section.domain),
    }
}

fn summary_line(summary: &TruncationSummary) -> String {
    let mut line = if summary.filtered {
        format!(
            "Showing {} of {} (matched by name or id)",
            summary.shown, summary.total
        )
    } else {
        format!(
            "Showing {} of {} (most recent)",
            summary.shown, summary.total
        )
    };
    if let Some(breakdown) = &summary.status_breakdown {
        let parts: Vec<String> = breakdown.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let _ = write!(line, "; status: {}", parts.join(", "));
    }
    if let Some(amount) = summary.total_amount {
        let _ = write!(line, "; total amount: {amount:.2}");
    }
    line
}

fn section_overhead_tokens(section: &DomainSection) -> usize {
    let mut tokens = token::estimate_tokens(&section_header(section)) + 1;
    if let Some(summary) = &section.summary {
        tokens += token::estimate_tokens(&summary_line(summary)) + 1;
    }
    tokens
}

fn entity_label(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Customer => "customers",
        EntityType::Invoice => "invoices",
    }
}

/// Query parameters used when the assembler lists an entity type.
pub fn default_filter(entity: EntityType) -> Filter {
    match entity {
        EntityType::Customer => Filter::new().with("active", "true"),
        EntityType::Invoice => Filter::new(),
    }
}

#[derive(Default)]
struct Loaded {
    sections: Vec<DomainSection>,
    failures: Vec<DomainFailure>,
}

impl Loaded {
    fn absorb(&mut self, item: Result<DomainSection, DomainFailure>) {
        match item {
            Ok(section) => self.sections.push(section),
            Err(failure) => self.failures.push(failure),
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    router: DomainRouter,
    extractor: EntityExtractor,
    truncation: TruncationConfig,
    conversation_tail: usize,
    sessions: Arc<SessionStore>,
    records: Arc<dyn RecordSource>,
    accounting: Arc<CachedAccounting>,
}

impl ContextAssembler {
    pub fn new(
        config: &AppConfig,
        sessions: Arc<SessionStore>,
        records: Arc<dyn RecordSource>,
        accounting: Arc<CachedAccounting>,
    ) -> Self {
        Self {
            router: DomainRouter::new(&config.routing),
            extractor: EntityExtractor::new(&config.extraction),
            truncation: config.truncation.clone(),
            conversation_tail: config.session.conversation_tail,
            sessions,
            records,
            accounting,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn accounting(&self) -> &Arc<CachedAccounting> {
        &self.accounting
    }

    pub fn router(&self) -> &DomainRouter {
        &self.router
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    /// Build the bounded context for one message. Reads session state but
    /// never writes it.
    pub async fn prepare_turn(
        &self,
        session_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> AssembledContext {
        let memory = self.sessions.get_all(session_id);
        let decision = self.router.route_explained(message, &memory);

        let mut entities = self.extractor.extract(message);
        let mut entities_reused = false;
        if decision.rule == RouteRule::FollowUp && !entities.has_filters() {
            if let Some(previous) = previous_entities(&memory) {
                entities.names = previous.names;
                entities.ids = previous.ids;
                entities_reused = true;
            }
        }

        info!(
            session_id,
            rule = ?decision.rule,
            domains = ?decision.domains,
            names = entities.names.len(),
            ids = entities.ids.len(),
            entities_reused,
            "Routed turn"
        );

        let wants_operational = decision.domains.contains(&Domain::Conversational);
        let wants_accounting = decision.domains.contains(&Domain::ExternalAccounting);

        let (operational, accounting) = tokio::join!(
            async {
                if wants_operational {
                    self.load_operational(&entities, cancel).await
                } else {
                    Loaded::default()
                }
            },
            async {
                if wants_accounting {
                    self.load_accounting(&entities, cancel).await
                } else {
                    Loaded::default()
                }
            }
        );

        let mut sections = operational.sections;
        sections.extend(accounting.sections);
        let mut unavailable = operational.failures;
        unavailable.extend(accounting.failures);

        let budget = self.truncation.max_context_tokens;
        let (total_tokens, drops) = enforce_budget(&mut sections, message, budget);
        if !drops.is_empty() {
            info!(
                session_id,
                total_tokens,
                budget,
                sections = drops.len(),
                "Trimmed context to token budget"
            );
        }

        AssembledContext {
            session_id: session_id.to_string(),
            message: message.to_string(),
            domains: decision.domains,
            rule: decision.rule,
            entities,
            entities_reused,
            sections,
            unavailable,
            metadata: AssemblyMetadata {
                total_tokens,
                budget,
                drops,
            },
        }
    }

    /// Persist a completed turn: routed domains, referenced entities, the
    /// conversation tail, and the session's creation marker.
    pub fn finish_turn(
        &self,
        context: &AssembledContext,
        reply: Option<&str>,
    ) -> Result<(), SessionError> {
        let session_id = context.session_id.as_str();

        self.sessions
            .set_json(session_id, LAST_DOMAINS_LOADED, &context.domains, None)?;
        if context.entities.has_filters() {
            self.sessions
                .set_json(session_id, LAST_ENTITIES, &context.entities, None)?;
        }

        let mut tail: Vec<ConversationTurn> = self
            .sessions
            .get_as(session_id, CONVERSATION)
            .unwrap_or_else(|e| {
                warn!(session_id, error = %e, "Discarding unreadable conversation tail");
                None
            })
            .unwrap_or_default();
        let mut turns = vec![ConversationTurn::user(&context.message)];
        if let Some(reply) = reply {
            turns.push(ConversationTurn::assistant(reply));
        }
        session_keys::append_capped(&mut tail, turns, self.conversation_tail);
        self.sessions.set_json(session_id, CONVERSATION, &tail, None)?;

        if self.sessions.get(session_id, CREATED_AT).is_none() {
            let now = chrono::Utc::now().to_rfc3339();
            self.sessions
                .set(session_id, CREATED_AT, Value::String(now), None);
        }

        debug!(session_id, tail = tail.len(), "Turn persisted");
        Ok(())
    }

    /// Forget everything about a session.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id)
    }

    async fn load_operational(
        &self,
        entities: &ExtractedEntities,
        cancel: &CancellationToken,
    ) -> Loaded {
        let (projects, clients, payments) = tokio::join!(
            self.load_kind(RecordKind::Projects, entities, cancel),
            self.load_kind(RecordKind::Clients, entities, cancel),
            self.load_kind(RecordKind::Payments, entities, cancel),
        );
        let mut loaded = Loaded::default();
        for item in [projects, clients, payments] {
            loaded.absorb(item);
        }
        loaded
    }

    async fn load_kind(
        &self,
        kind: RecordKind,
        entities: &ExtractedEntities,
        cancel: &CancellationToken,
    ) -> Result<DomainSection, DomainFailure> {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = self.records.fetch(kind) => result,
        };
        let source = kind.as_str().to_string();
        match fetched {
            Ok(rows) => Ok(self.section(
                Domain::Conversational,
                source,
                &rows,
                entities,
                self.truncation.for_kind(kind),
                None,
            )),
            Err(e) => {
                warn!(
                    source = %source,
                    backend = self.records.name(),
                    error = %e,
                    "Operational records unavailable"
                );
                Err(DomainFailure {
                    domain: Domain::Conversational,
                    source,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn load_accounting(
        &self,
        entities: &ExtractedEntities,
        cancel: &CancellationToken,
    ) -> Loaded {
        let (customers, invoices) = tokio::join!(
            self.load_entity(EntityType::Customer, entities, cancel),
            self.load_entity(EntityType::Invoice, entities, cancel),
        );
        let mut loaded = Loaded::default();
        loaded.absorb(customers);
        loaded.absorb(invoices);
        loaded
    }

    async fn load_entity(
        &self,
        entity: EntityType,
        entities: &ExtractedEntities,
        cancel: &CancellationToken,
    ) -> Result<DomainSection, DomainFailure> {
        let filter = default_filter(entity);
        let source = entity_label(entity).to_string();
        match self.accounting.list(entity, &filter, cancel).await {
            Ok(fetched) => Ok(self.section(
                Domain::ExternalAccounting,
                source,
                &fetched.records,
                entities,
                self.truncation.for_entity(entity),
                Some(fetched.origin),
            )),
            Err(e) => Err(DomainFailure {
                domain: Domain::ExternalAccounting,
                source,
                reason: e.to_string(),
            }),
        }
    }

    fn section(
        &self,
        domain: Domain,
        source: String,
        rows: &[Record],
        entities: &ExtractedEntities,
        limit: &ledgerbridge_config::RecordLimit,
        origin: Option<FetchOrigin>,
    ) -> DomainSection {
        let truncated = truncate(rows, entities, limit);
        debug!(
            source = %source,
            total = rows.len(),
            shown = truncated.records.len(),
            filtered = truncated.summary.as_ref().is_some_and(|s| s.filtered),
            "Truncated record list"
        );
        DomainSection {
            domain,
            source,
            records: truncated.records,
            summary: truncated.summary,
            origin,
        }
    }
}

fn previous_entities(memory: &HashMap<String, Value>) -> Option<ExtractedEntities> {
    let value = memory.get(LAST_ENTITIES)?.clone();
    serde_json::from_value::<ExtractedEntities>(value)
        .ok()
        .filter(ExtractedEntities::has_filters)
}

/// Drop trailing rows, last section first, until the estimated size fits
/// `budget`. Headers and summaries always stay. Returns the final estimate
/// and what was dropped.
fn enforce_budget(
    sections: &mut [DomainSection],
    message: &str,
    budget: usize,
) -> (usize, Vec<DropInfo>) {
    let fixed: usize = token::estimate_tokens(message)
        + sections.iter().map(section_overhead_tokens).sum::<usize>();
    let mut total = fixed
        + sections
            .iter()
            .map(|s| token::estimate_records_tokens(&s.records))
            .sum::<usize>();

    let mut drops = Vec::new();
    for section in sections.iter_mut().rev() {
        if total <= budget {
            break;
        }
        let mut dropped = 0;
        let mut tokens_dropped = 0;
        while total > budget {
            let Some(record) = section.records.pop() else {
                break;
            };
            let cost = token::estimate_record_tokens(&record);
            total -= cost;
            tokens_dropped += cost;
            dropped += 1;
        }
        if dropped > 0 {
            if let Some(summary) = section.summary.as_mut() {
                summary.shown = section.records.len();
            }
            drops.push(DropInfo {
                source: section.source.clone(),
                items_dropped: dropped,
                tokens_dropped,
                reason: format!("context budget of {budget} tokens exceeded"),
            });
        }
    }
    (total, drops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_cache::EntityCache;
    use ledgerbridge_sources::{InMemoryAccounting, InMemoryRecordSource};
    use serde_json::json;
    use std::time::Duration;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn projects() -> Vec<Record> {
        (1..=30)
            .map(|i| {
                let name = if i == 4 {
                    "Temple Hills Remodel".to_string()
                } else {
                    format!("Project {i}")
                };
                record(json!({
                    "project_id": format!("PRJ-{i:05}"),
                    "name": name,
                    "status": "active",
                    "contract_value": 1000,
                    "updated_at": format!("2026-05-{:02}", (i % 28) + 1),
                }))
            })
            .collect()
    }

    fn payments() -> Vec<Record> {
        (1..=25)
            .map(|i| {
                record(json!({
                    "payment_id": format!("PAY-{i:05}"),
                    "client_name": if i == 3 { "Temple Hills HOA" } else { "Cedar Homes" },
                    "amount": 100,
                    "status": "cleared",
                    "updated_at": format!("2026-05-{i:02}"),
                }))
            })
            .collect()
    }

    fn customers() -> Vec<Record> {
        vec![
            record(json!({"id": "CUS-00001", "name": "Temple Hills HOA", "active": true, "balance": 1200})),
            record(json!({"id": "CUS-00002", "name": "Oakridge Dental", "active": true, "balance": 300})),
            record(json!({"id": "CUS-00003", "name": "Old Client", "active": false, "balance": 0})),
        ]
    }

    fn invoices() -> Vec<Record> {
        vec![
            record(json!({"id": "INV-00001", "customer_name": "Temple Hills HOA", "status": "open", "balance": 1200})),
            record(json!({"id": "INV-00002", "customer_name": "Oakridge Dental", "status": "paid", "balance": 0})),
        ]
    }

    struct Harness {
        assembler: ContextAssembler,
        records: Arc<InMemoryRecordSource>,
        upstream: Arc<InMemoryAccounting>,
    }

    fn harness_with(config: AppConfig) -> Harness {
        let records = Arc::new(
            InMemoryRecordSource::new()
                .with_records(RecordKind::Projects, projects())
                .with_records(RecordKind::Clients, vec![])
                .with_records(RecordKind::Payments, payments()),
        );
        let upstream = Arc::new(
            InMemoryAccounting::new()
                .with_entities(EntityType::Customer, customers())
                .with_entities(EntityType::Invoice, invoices()),
        );
        let cache = Arc::new(EntityCache::new(config.cache.ttl()).with_grace(config.cache.grace()));
        let accounting = Arc::new(CachedAccounting::new(
            upstream.clone(),
            cache,
            config.cache.fetch_timeout(),
        ));
        let sessions = Arc::new(SessionStore::new(config.session.ttl()));
        Harness {
            assembler: ContextAssembler::new(&config, sessions, records.clone(), accounting),
            records,
            upstream,
        }
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default())
    }

    fn sources(ctx: &AssembledContext) -> Vec<&str> {
        ctx.sections.iter().map(|s| s.source.as_str()).collect()
    }

    #[tokio::test]
    async fn off_topic_loads_nothing() {
        let h = harness();
        let ctx = h
            .assembler
            .prepare_turn("s1", "thanks!", &CancellationToken::new())
            .await;
        assert_eq!(ctx.domains, DomainSet::from([Domain::None]));
        assert!(ctx.sections.is_empty());
        assert_eq!(h.upstream.list_calls(), 0);
        assert!(ctx.render().contains("No business data"));
    }

    #[tokio::test]
    async fn operational_turn_truncates_and_summarises() {
        let h = harness();
        let ctx = h
            .assembler
            .prepare_turn("s1", "how are the projects and payments looking", &CancellationToken::new())
            .await;
        assert_eq!(ctx.domains, DomainSet::from([Domain::Conversational]));
        assert_eq!(sources(&ctx), vec!["projects", "clients", "payments"]);

        let payments = &ctx.sections[2];
        assert_eq!(payments.records.len(), 20);
        let summary = payments.summary.as_ref().unwrap();
        assert_eq!(summary.total, 25);
        assert_eq!(summary.total_amount, Some(2500.0));

        // An empty list has no summary.
        assert!(ctx.sections[1].summary.is_none());
        assert_eq!(h.upstream.list_calls(), 0);
    }

    #[tokio::test]
    async fn named_entity_filters_every_section() {
        let h = harness();
        let ctx = h
            .assembler
            .prepare_turn(
                "s1",
                "compare the sheet with quickbooks for temple",
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(ctx.rule, RouteRule::Comparison);
        assert_eq!(
            sources(&ctx),
            vec!["projects", "clients", "payments", "customers", "invoices"]
        );
        let projects = &ctx.sections[0];
        assert_eq!(projects.records.len(), 1);
        assert!(projects.summary.as_ref().unwrap().filtered);
        let customers = &ctx.sections[3];
        assert_eq!(customers.records.len(), 1);
        assert_eq!(customers.records[0]["id"], "CUS-00001");
        assert_eq!(customers.origin, Some(FetchOrigin::Upstream));
    }

    #[tokio::test]
    async fn inactive_customers_are_not_listed() {
        let h = harness();
        let ctx = h
            .assembler
            .prepare_turn("s1", "list every customer balance", &CancellationToken::new())
            .await;
        let customers = ctx.sections.iter().find(|s| s.source == "customers").unwrap();
        assert_eq!(customers.summary.as_ref().unwrap().total, 2);
    }

    #[tokio::test]
    async fn accounting_reads_hit_the_cache_on_the_next_turn() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.assembler
            .prepare_turn("s1", "which invoices are overdue", &cancel)
            .await;
        assert_eq!(h.upstream.list_calls(), 2);

        let ctx = h
            .assembler
            .prepare_turn("s2", "any unpaid invoices", &cancel)
            .await;
        assert_eq!(h.upstream.list_calls(), 2);
        assert!(
            ctx.sections
                .iter()
                .filter(|s| s.domain == Domain::ExternalAccounting)
                .all(|s| s.origin == Some(FetchOrigin::Cache))
        );
    }

    #[tokio::test]
    async fn follow_up_reloads_accounting_and_reuses_entities() {
        let h = harness();
        let cancel = CancellationToken::new();

        let first = h
            .assembler
            .prepare_turn("s1", "what does temple owe on invoices", &cancel)
            .await;
        assert_eq!(first.domains, DomainSet::from([Domain::ExternalAccounting]));
        h.assembler.finish_turn(&first, Some("They owe 1200.")).unwrap();

        let second = h
            .assembler
            .prepare_turn("s1", "same for them", &cancel)
            .await;
        assert_eq!(second.rule, RouteRule::FollowUp);
        assert!(second.domains.contains(&Domain::Conversational));
        assert!(second.domains.contains(&Domain::ExternalAccounting));
        assert!(second.entities_reused);
        assert!(second.entities.names.contains("temple"));
        let projects = second.sections.iter().find(|s| s.source == "projects").unwrap();
        assert_eq!(projects.records.len(), 1);
    }

    #[tokio::test]
    async fn routing_reads_the_snapshot_before_this_turn() {
        let h = harness();
        let cancel = CancellationToken::new();
        // No previous turn: a follow-up word alone must not force accounting.
        let ctx = h
            .assembler
            .prepare_turn("fresh", "same for them", &cancel)
            .await;
        assert_ne!(ctx.rule, RouteRule::FollowUp);
        assert!(!ctx.domains.contains(&Domain::ExternalAccounting));
        // And preparing a turn wrote nothing.
        assert!(h.assembler.sessions().get_all("fresh").is_empty());
    }

    #[tokio::test]
    async fn finish_turn_persists_state() {
        let h = harness();
        let ctx = h
            .assembler
            .prepare_turn("s1", "show invoices for PRJ-00004", &CancellationToken::new())
            .await;
        h.assembler.finish_turn(&ctx, Some("done")).unwrap();

        let sessions = h.assembler.sessions();
        assert_eq!(
            sessions.get("s1", LAST_DOMAINS_LOADED),
            Some(json!(["external-accounting"]))
        );
        let entities: ExtractedEntities = sessions.get_as("s1", LAST_ENTITIES).unwrap().unwrap();
        assert!(entities.ids.contains("PRJ-00004"));
        let tail: Vec<ConversationTurn> = sessions.get_as("s1", CONVERSATION).unwrap().unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].content, "done");

        let created = sessions.get("s1", CREATED_AT).unwrap();
        h.assembler.finish_turn(&ctx, None).unwrap();
        assert_eq!(sessions.get("s1", CREATED_AT).unwrap(), created);
    }

    #[tokio::test]
    async fn conversation_tail_is_capped() {
        let mut config = AppConfig::default();
        config.session.conversation_tail = 4;
        let h = harness_with(config);
        for i in 0..5 {
            let ctx = h
                .assembler
                .prepare_turn("s1", &format!("hello {i}"), &CancellationToken::new())
                .await;
            h.assembler.finish_turn(&ctx, Some(&format!("reply {i}"))).unwrap();
        }
        let tail: Vec<ConversationTurn> = h
            .assembler
            .sessions()
            .get_as("s1", CONVERSATION)
            .unwrap()
            .unwrap();
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].content, "hello 3");
        assert_eq!(tail[3].content, "reply 4");
    }

    #[tokio::test]
    async fn failed_domain_degrades_instead_of_failing() {
        let h = harness();
        h.upstream.fail_with(UpstreamError::Network("connection reset".into()));
        let ctx = h
            .assembler
            .prepare_turn(
                "s1",
                "which projects have unpaid invoices",
                &CancellationToken::new(),
            )
            .await;
        assert!(ctx.is_degraded());
        assert_eq!(ctx.unavailable.len(), 2);
        assert!(ctx.unavailable.iter().all(|f| f.domain == Domain::ExternalAccounting));
        assert_eq!(ctx.sections[0].source, "projects");
        assert!(ctx.render().contains("invoices [external-accounting]: unavailable"));
    }

    #[tokio::test]
    async fn operational_failure_is_reported_per_kind() {
        let h = harness();
        h.records.fail_with(UpstreamError::Network("sheet offline".into()));
        let ctx = h
            .assembler
            .prepare_turn("s1", "project status please", &CancellationToken::new())
            .await;
        assert_eq!(ctx.unavailable.len(), 3);
        assert!(ctx.sections.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_accounting_data_is_flagged() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.assembler.prepare_turn("s1", "open invoices", &cancel).await;

        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        h.upstream.fail_with(UpstreamError::RateLimited {
            retry_after_secs: 30,
        });
        let ctx = h.assembler.prepare_turn("s1", "open invoices", &cancel).await;
        assert!(!ctx.is_degraded());
        let invoices = ctx.sections.iter().find(|s| s.source == "invoices").unwrap();
        assert_eq!(invoices.origin, Some(FetchOrigin::Stale));
        assert!(ctx.render().contains("cached copy"));
    }

    #[tokio::test]
    async fn cancelled_turn_loads_nothing() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = h
            .assembler
            .prepare_turn("s1", "projects and invoices", &cancel)
            .await;
        assert!(ctx.sections.is_empty());
        assert_eq!(ctx.unavailable.len(), 5);
        assert_eq!(h.assembler.accounting().stats().entries, 0);
    }

    #[tokio::test]
    async fn budget_drops_trailing_rows_but_keeps_summaries() {
        let mut config = AppConfig::default();
        config.truncation.max_context_tokens = 400;
        let h = harness_with(config);
        let ctx = h
            .assembler
            .prepare_turn("s1", "projects and payments", &CancellationToken::new())
            .await;

        assert!(ctx.metadata.total_tokens <= 400);
        assert!(!ctx.metadata.drops.is_empty());
        // Payments is last, so it is trimmed first.
        assert_eq!(ctx.metadata.drops[0].source, "payments");
        let payments = ctx.sections.iter().find(|s| s.source == "payments").unwrap();
        let summary = payments.summary.as_ref().unwrap();
        assert_eq!(summary.shown, payments.records.len());
        assert_eq!(summary.total, 25);
        assert_eq!(summary.total_amount, Some(2500.0));
    }

    #[tokio::test]
    async fn clear_session_forgets_follow_up_state() {
        let h = harness();
        let cancel = CancellationToken::new();
        let ctx = h.assembler.prepare_turn("s1", "unpaid invoices", &cancel).await;
        h.assembler.finish_turn(&ctx, None).unwrap();
        assert!(h.assembler.clear_session("s1"));

        let next = h.assembler.prepare_turn("s1", "same for them", &cancel).await;
        assert_ne!(next.rule, RouteRule::FollowUp);
    }

    #[test]
    fn render_lists_summary_and_rows() {
        let ctx = AssembledContext {
            session_id: "s".into(),
            message: "m".into(),
            domains: DomainSet::from([Domain::Conversational]),
            rule: RouteRule::Keywords,
            entities: ExtractedEntities::default(),
            entities_reused: false,
            sections: vec![DomainSection {
                domain: Domain::Conversational,
                source: "payments".into(),
                records: vec![record(json!({"payment_id": "PAY-00001"}))],
                summary: Some(TruncationSummary {
                    shown: 1,
                    total: 3,
                    filtered: false,
                    status_breakdown: Some([("cleared".to_string(), 3)].into()),
                    total_amount: Some(300.0),
                }),
                origin: None,
            }],
            unavailable: vec![],
            metadata: AssemblyMetadata::default(),
        };
        let text = ctx.render();
        assert!(text.contains("## payments [conversational]"));
        assert!(text.contains("Showing 1 of 3 (most recent); status: cleared=3; total amount: 300.00"));
        assert!(text.contains(r#"{"payment_id":"PAY-00001"}"#));
    }
}
