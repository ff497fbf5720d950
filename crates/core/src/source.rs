//! Upstream collaborator traits.
//!
//! Implementations: JSON fixture files and in-memory doubles live in
//! `ledgerbridge-sources`; production wire clients are out of this
//! workspace's scope and plug in through these same traits.

use async_trait::async_trait;
use crate::domain::{EntityType, RecordKind};
use crate::error::UpstreamError;
use crate::record::{Filter, Record};

/// The read-mostly operational record store. Assumed cheap and local, so
/// nothing caches it.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Source name for logs (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Fetch every record of one kind.
    async fn fetch(&self, kind: RecordKind) -> Result<Vec<Record>, UpstreamError>;
}

/// The rate-limited accounting service.
///
/// Callers outside `ledgerbridge-cache` should not hold this directly: every
/// read goes through the entity cache and every mutation must invalidate it.
#[async_trait]
pub trait AccountingClient: Send + Sync {
    /// Client name for logs.
    fn name(&self) -> &str;

    /// List entities of one type matching a filter.
    async fn list(&self, entity: EntityType, filter: &Filter) -> Result<Vec<Record>, UpstreamError>;

    /// Create an entity, returning the stored version.
    async fn create(&self, entity: EntityType, record: Record) -> Result<Record, UpstreamError>;

    /// Update an entity by id, returning the stored version.
    async fn update(
        &self,
        entity: EntityType,
        id: &str,
        record: Record,
    ) -> Result<Record, UpstreamError>;

    /// Delete an entity by id. Returns `true` if something was removed.
    async fn delete(&self, entity: EntityType, id: &str) -> Result<bool, UpstreamError>;
}
