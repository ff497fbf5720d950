//! In-memory collaborators for tests and demos.
//!
//! Both doubles can be told to fail (to exercise degraded turns) and the
//! accounting double counts upstream list calls so cache behaviour can be
//! asserted from the outside.

use async_trait::async_trait;
use ledgerbridge_core::{
    AccountingClient, EntityType, Filter, Record, RecordKind, RecordSource, UpstreamError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::mutation;

fn injected(slot: &Mutex<Option<UpstreamError>>) -> Option<UpstreamError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn set_slot<T>(slot: &Mutex<Option<T>>, value: Option<T>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

/// An operational record store held in a map.
#[derive(Default)]
pub struct InMemoryRecordSource {
    records: RwLock<HashMap<RecordKind, Vec<Record>>>,
    failure: Mutex<Option<UpstreamError>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding.
    pub fn with_records(mut self, kind: RecordKind, records: Vec<Record>) -> Self {
        self.records.get_mut().insert(kind, records);
        self
    }

    /// Replace the rows of one kind.
    pub async fn set_records(&self, kind: RecordKind, records: Vec<Record>) {
        self.records.write().await.insert(kind, records);
    }

    /// Make every subsequent fetch fail with `err`.
    pub fn fail_with(&self, err: UpstreamError) {
        set_slot(&self.failure, Some(err));
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        set_slot(&self.failure, None);
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn fetch(&self, kind: RecordKind) -> Result<Vec<Record>, UpstreamError> {
        if let Some(err) = injected(&self.failure) {
            return Err(err);
        }
        Ok(self
            .records
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }
}

/// An accounting service held in a map.
#[derive(Default)]
pub struct InMemoryAccounting {
    entities: RwLock<HashMap<EntityType, Vec<Record>>>,
    list_calls: AtomicUsize,
    failure: Mutex<Option<UpstreamError>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding.
    pub fn with_entities(mut self, entity: EntityType, rows: Vec<Record>) -> Self {
        self.entities.get_mut().insert(entity, rows);
        self
    }

    /// Number of `list` calls that reached this double.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `err`.
    pub fn fail_with(&self, err: UpstreamError) {
        set_slot(&self.failure, Some(err));
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        set_slot(&self.failure, None);
    }

    /// Delay every `list` result by `latency`. Rows are read before the
    /// delay, so writes made meanwhile are not in the result.
    pub fn set_latency(&self, latency: Duration) {
        set_slot(&self.latency, Some(latency));
    }

    /// Current rows of one type, bypassing counters.
    pub async fn snapshot(&self, entity: EntityType) -> Vec<Record> {
        self.entities
            .read()
            .await
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountingClient for InMemoryAccounting {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn list(&self, entity: EntityType, filter: &Filter) -> Result<Vec<Record>, UpstreamError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // Rows are read when the call lands; the delay models the response in transit.
        let rows: Vec<Record> = self
            .entities
            .read()
            .await
            .get(&entity)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = injected(&self.failure) {
            return Err(err);
        }
        Ok(rows)
    }

    async fn create(&self, entity: EntityType, record: Record) -> Result<Record, UpstreamError> {
        if let Some(err) = injected(&self.failure) {
            return Err(err);
        }
        let mut entities = self.entities.write().await;
        Ok(mutation::create(entities.entry(entity).or_default(), entity, record))
    }

    async fn update(
        &self,
        entity: EntityType,
        id: &str,
        record: Record,
    ) -> Result<Record, UpstreamError> {
        if let Some(err) = injected(&self.failure) {
            return Err(err);
        }
        let mut entities = self.entities.write().await;
        mutation::update(entities.entry(entity).or_default(), id, record)
    }

    async fn delete(&self, entity: EntityType, id: &str) -> Result<bool, UpstreamError> {
        if let Some(err) = injected(&self.failure) {
            return Err(err);
        }
        let mut entities = self.entities.write().await;
        Ok(mutation::delete(entities.entry(entity).or_default(), id))
    }
}
