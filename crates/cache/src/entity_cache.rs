//! TTL cache keyed by (entity type, filter signature).
//!
//! Lookups never fail: an absent or expired entry is a miss. Expired
//! payloads are retained for a grace window so a caller can fall back to
//! them when the upstream call fails, but `get` never returns them.
//! Invalidation is per entity type and removes entries outright, grace
//! copies included.
//!
//! Each entity type carries a generation that every invalidation bumps. A
//! fetch started before a write reads the generation up front and stores
//! through [`EntityCache::put_if_generation`], which refuses the payload
//! once the generation has moved.

use ledgerbridge_core::{EntityType, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default freshness window: 5 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Longest freshness or grace window the cache accepts.
pub const MAX_CACHE_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn after(from: Instant, by: Duration) -> Instant {
    from.checked_add(by).unwrap_or(from)
}

type CacheKey = (EntityType, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    records: Vec<Record>,
    fetched_at: Instant,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    generations: HashMap<EntityType, u64>,
}

impl CacheState {
    fn generation(&self, entity: EntityType) -> u64 {
        self.generations.get(&entity).copied().unwrap_or(0)
    }

    fn insert(
        &mut self,
        now: Instant,
        ttl: Duration,
        grace: Duration,
        key: CacheKey,
        records: Vec<Record>,
    ) {
        self.entries.retain(|_, e| now < after(e.expires_at, grace));
        self.entries.insert(
            key,
            CacheEntry {
                records,
                fetched_at: now,
                expires_at: after(now, ttl),
            },
        );
    }
}

/// An expired payload still inside the grace window.
#[derive(Debug, Clone)]
pub struct StaleHit {
    pub records: Vec<Record>,
    /// Time since the payload was fetched.
    pub age: Duration,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    /// `hits / total`, or 0.0 before the first lookup.
    pub hit_rate: f64,
    pub entries: usize,
}

/// Process-wide accounting cache.
pub struct EntityCache {
    state: RwLock<CacheState>,
    ttl: Duration,
    grace: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntityCache {
    /// Create a cache with the given freshness window and no grace window.
    /// Windows longer than [`MAX_CACHE_WINDOW`] are clamped.
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl: ttl.min(MAX_CACHE_WINDOW),
            grace: Duration::ZERO,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Keep expired payloads for `grace` past expiry as a failure fallback.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace.min(MAX_CACHE_WINDOW);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh payload for the key, counting a hit or a miss.
    pub fn get(&self, entity: EntityType, signature: &str) -> Option<Vec<Record>> {
        let now = Instant::now();
        let found = self
            .read()
            .entries
            .get(&(entity, signature.to_string()))
            .filter(|e| now < e.expires_at)
            .map(|e| e.records.clone());

        match &found {
            Some(records) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(entity = %entity, signature, rows = records.len(), "Cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(entity = %entity, signature, "Cache miss");
            }
        }
        found
    }

    /// Expired-but-retained payload for the key. Does not touch counters and
    /// returns nothing for an entry that is still fresh.
    pub fn get_stale(&self, entity: EntityType, signature: &str) -> Option<StaleHit> {
        let now = Instant::now();
        self.read()
            .entries
            .get(&(entity, signature.to_string()))
            .filter(|e| now >= e.expires_at && now < after(e.expires_at, self.grace))
            .map(|e| StaleHit {
                records: e.records.clone(),
                age: now.saturating_duration_since(e.fetched_at),
            })
    }

    /// Store a payload, fresh for the cache's TTL.
    pub fn put(&self, entity: EntityType, signature: &str, records: Vec<Record>) {
        let now = Instant::now();
        self.write()
            .insert(now, self.ttl, self.grace, (entity, signature.to_string()), records);
    }

    /// Current invalidation generation of `entity`.
    pub fn generation(&self, entity: EntityType) -> u64 {
        self.read().generation(entity)
    }

    /// Store a payload only if no invalidation of `entity` happened since
    /// `generation` was read. Returns whether the payload was stored.
    pub fn put_if_generation(
        &self,
        entity: EntityType,
        signature: &str,
        generation: u64,
        records: Vec<Record>,
    ) -> bool {
        let now = Instant::now();
        let mut state = self.write();
        let current = state.generation(entity);
        if current != generation {
            debug!(
                entity = %entity,
                signature,
                fetched = generation,
                current,
                "Discarding payload fetched before an invalidation"
            );
            return false;
        }
        state.insert(now, self.ttl, self.grace, (entity, signature.to_string()), records);
        true
    }

    /// Drop every entry of `entity`, whatever its signature, and bump its
    /// generation. Returns how many entries were removed.
    pub fn invalidate(&self, entity: EntityType) -> usize {
        let mut state = self.write();
        *state.generations.entry(entity).or_insert(0) += 1;
        let before = state.entries.len();
        state.entries.retain(|(e, _), _| *e != entity);
        let removed = before - state.entries.len();
        debug!(entity = %entity, removed, "Cache invalidated");
        removed
    }

    /// Drop everything. Counters are kept; every generation moves so that
    /// in-flight fetches do not repopulate the cache.
    pub fn clear(&self) {
        let mut state = self.write();
        state.entries.clear();
        for entity in EntityType::ALL {
            *state.generations.entry(entity).or_insert(0) += 1;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            total,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entries: self.read().entries.len(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
