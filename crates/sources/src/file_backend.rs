//! JSON fixture collaborators.
//!
//! A data directory holds one JSON array per list:
//!
//! ```text
//! data/
//!   projects.json  clients.json  payments.json     (operational records)
//!   customers.json invoices.json                   (accounting entities)
//! ```
//!
//! Operational files are re-read on every fetch so edits show up without a
//! restart. Accounting files are loaded once and flushed on every mutation,
//! mirroring a remote system that owns its own state. A mutation is applied
//! to memory only after its flush succeeds.

use async_trait::async_trait;
use ledgerbridge_core::{
    AccountingClient, EntityType, Filter, Record, RecordKind, RecordSource, UpstreamError,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::mutation;

fn entity_file(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Customer => "customers.json",
        EntityType::Invoice => "invoices.json",
    }
}

/// Parse a JSON array of objects. Non-object elements are skipped.
fn parse_rows(path: &Path, content: &str) -> Result<Vec<Record>, UpstreamError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| UpstreamError::InvalidPayload(format!("{}: {e}", path.display())))?;
    let Value::Array(items) = value else {
        return Err(UpstreamError::InvalidPayload(format!(
            "{}: expected a JSON array",
            path.display()
        )));
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            other => {
                warn!(path = %path.display(), value = %other, "Skipping non-object row");
                None
            }
        })
        .collect())
}

/// Operational records read from `<dir>/<kind>.json`.
pub struct FileRecordSource {
    dir: PathBuf,
}

impl FileRecordSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, kind: RecordKind) -> Result<Vec<Record>, UpstreamError> {
        let path = self.dir.join(format!("{}.json", kind.as_str()));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_rows(&path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No fixture file, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(UpstreamError::Network(format!("{}: {e}", path.display()))),
        }
    }
}

/// Accounting entities loaded from `<dir>/customers.json` and
/// `<dir>/invoices.json`.
pub struct FileAccounting {
    dir: PathBuf,
    entities: RwLock<HashMap<EntityType, Vec<Record>>>,
}

impl FileAccounting {
    /// Load both entity files. Missing files start empty; unreadable or
    /// malformed files are an error.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, UpstreamError> {
        let dir = dir.into();
        let mut entities = HashMap::new();
        for entity in EntityType::ALL {
            let path = dir.join(entity_file(entity));
            let rows = match std::fs::read_to_string(&path) {
                Ok(content) => parse_rows(&path, &content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(UpstreamError::Network(format!("{}: {e}", path.display()))),
            };
            debug!(path = %path.display(), count = rows.len(), "Accounting fixture loaded");
            entities.insert(entity, rows);
        }
        Ok(Self {
            dir,
            entities: RwLock::new(entities),
        })
    }

    /// Write `rows` to a sibling temp file and rename it over the fixture.
    async fn flush(&self, entity: EntityType, rows: &[Record]) -> Result<(), UpstreamError> {
        let path = self.dir.join(entity_file(entity));
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(rows)
            .map_err(|e| UpstreamError::InvalidPayload(e.to_string()))?;
        let io_error = |e: std::io::Error| UpstreamError::Network(format!("{}: {e}", path.display()));
        tokio::fs::write(&staging, content).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(io_error)
    }

    /// Run `apply` on a copy of the entity's rows and keep the copy only if
    /// it was flushed.
    async fn mutate<T>(
        &self,
        entity: EntityType,
        apply: impl FnOnce(&mut Vec<Record>) -> Result<(T, bool), UpstreamError> + Send,
    ) -> Result<T, UpstreamError> {
        let mut entities = self.entities.write().await;
        let mut rows = entities.get(&entity).cloned().unwrap_or_default();
        let (out, changed) = apply(&mut rows)?;
        if changed {
            self.flush(entity, &rows).await?;
            entities.insert(entity, rows);
        }
        Ok(out)
    }
}

#[async_trait]
impl AccountingClient for FileAccounting {
    fn name(&self) -> &str {
        "file"
    }

    async fn list(&self, entity: EntityType, filter: &Filter) -> Result<Vec<Record>, UpstreamError> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&entity)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, entity: EntityType, record: Record) -> Result<Record, UpstreamError> {
        self.mutate(entity, |rows| Ok((mutation::create(rows, entity, record), true)))
            .await
    }

    async fn update(
        &self,
        entity: EntityType,
        id: &str,
        record: Record,
    ) -> Result<Record, UpstreamError> {
        self.mutate(entity, |rows| Ok((mutation::update(rows, id, record)?, true)))
            .await
    }

    async fn delete(&self, entity: EntityType, id: &str) -> Result<bool, UpstreamError> {
        self.mutate(entity, |rows| {
            let deleted = mutation::delete(rows, id);
            Ok((deleted, deleted))
        })
        .await
    }
}
