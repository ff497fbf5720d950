//! Cache-fronted accounting client.
//!
//! Reads check the [`EntityCache`] first and only reach the upstream service
//! on a miss, racing the call against a timeout and the caller's
//! cancellation token. A cancelled or timed-out fetch never populates the
//! cache. Transient upstream failures fall back to a retained stale payload
//! when one exists.
//!
//! Writes invalidate the whole entity type after the upstream call succeeds
//! and before returning, so the next read is always fresh. A fetch that was
//! already in flight when the write landed is returned to its caller but not
//! cached.

use ledgerbridge_core::{AccountingClient, EntityType, Filter, Record, UpstreamError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::entity_cache::{CacheStats, EntityCache};

/// Where a list result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    Cache,
    Upstream,
    /// Expired cache copy served because the upstream call failed.
    Stale,
}

/// A list result plus its provenance.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub records: Vec<Record>,
    pub origin: FetchOrigin,
}

pub struct CachedAccounting {
    client: Arc<dyn AccountingClient>,
    cache: Arc<EntityCache>,
    fetch_timeout: Duration,
}

impl CachedAccounting {
    pub fn new(
        client: Arc<dyn AccountingClient>,
        cache: Arc<EntityCache>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            fetch_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// List entities, from cache when fresh.
    pub async fn list(
        &self,
        entity: EntityType,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<Fetched, UpstreamError> {
        let signature = filter.signature();
        if let Some(records) = self.cache.get(entity, &signature) {
            return Ok(Fetched {
                records,
                origin: FetchOrigin::Cache,
            });
        }
        let generation = self.cache.generation(entity);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = tokio::time::timeout(self.fetch_timeout, self.client.list(entity, filter)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(UpstreamError::Timeout(format!(
                        "{} list for '{}' exceeded {}s",
                        entity,
                        signature,
                        self.fetch_timeout.as_secs()
                    ))),
                }
            }
        };

        match outcome {
            Ok(records) => {
                self.cache
                    .put_if_generation(entity, &signature, generation, records.clone());
                Ok(Fetched {
                    records,
                    origin: FetchOrigin::Upstream,
                })
            }
            Err(UpstreamError::Cancelled) => Err(UpstreamError::Cancelled),
            Err(e) if e.is_transient() => match self.cache.get_stale(entity, &signature) {
                Some(stale) => {
                    warn!(
                        entity = %entity,
                        signature = %signature,
                        age_secs = stale.age.as_secs(),
                        error = %e,
                        "Upstream fetch failed, serving stale cache entry"
                    );
                    Ok(Fetched {
                        records: stale.records,
                        origin: FetchOrigin::Stale,
                    })
                }
                None => {
                    warn!(entity = %entity, signature = %signature, error = %e, "Upstream fetch failed");
                    Err(e)
                }
            },
            Err(e) => {
                warn!(entity = %entity, signature = %signature, error = %e, "Upstream fetch failed");
                Err(e)
            }
        }
    }

    /// Create an entity and invalidate its type.
    pub async fn create(&self, entity: EntityType, record: Record) -> Result<Record, UpstreamError> {
        let created = self.client.create(entity, record).await?;
        self.invalidate_after_write(entity, "create");
        Ok(created)
    }

    /// Update an entity and invalidate its type.
    pub async fn update(
        &self,
        entity: EntityType,
        id: &str,
        record: Record,
    ) -> Result<Record, UpstreamError> {
        let updated = self.client.update(entity, id, record).await?;
        self.invalidate_after_write(entity, "update");
        Ok(updated)
    }

    /// Delete an entity and invalidate its type. A delete that removed
    /// nothing still invalidates: the upstream state is unknown.
    pub async fn delete(&self, entity: EntityType, id: &str) -> Result<bool, UpstreamError> {
        let deleted = self.client.delete(entity, id).await?;
        self.invalidate_after_write(entity, "delete");
        Ok(deleted)
    }

    fn invalidate_after_write(&self, entity: EntityType, op: &str) {
        let removed = self.cache.invalidate(entity);
        info!(
            client = self.client.name(),
            entity = %entity,
            op,
            removed,
            "Accounting write, cache invalidated"
        );
    }
}
