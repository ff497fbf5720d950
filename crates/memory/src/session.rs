//! Per-session key/value memory with TTL expiry.
//!
//! Each session holds arbitrary JSON values under string keys. Expiry is
//! tracked once per session rather than per key: every `set` refreshes the
//! session's composite expiry to the latest deadline of any write, so keys in
//! the same session live and die together. A session whose expiry has passed
//! is indistinguishable from one that was never created.
//!
//! There is no background sweeper. Writes purge fully expired sessions as a
//! side effect, which keeps the map bounded as long as traffic continues.
//!
//! Per-key lifetimes would need an ordered expiry index (for example a
//! min-heap keyed by deadline); the public contract here would not change.

use ledgerbridge_core::SessionError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default session lifetime: 10 minutes.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Longest lifetime a session can be given, whatever the caller asks for.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `from + by`, with `by` capped at [`MAX_SESSION_TTL`].
fn deadline_after(from: Instant, by: Duration) -> Instant {
    let by = by.min(MAX_SESSION_TTL);
    from.checked_add(by).unwrap_or(from)
}

#[derive(Debug, Clone)]
struct SessionRecord {
    values: HashMap<String, Value>,
    expires_at: Instant,
}

impl SessionRecord {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Metadata about one live session, as reported by [`SessionStore::list_sessions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub key_count: usize,
    /// Seconds until the session expires.
    pub remaining_secs: u64,
    /// The caller's creation marker, if the session stored one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Point-in-time size of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub sessions: usize,
    pub keys: usize,
}

/// Process-wide session memory. Cheap to share behind an `Arc`; every
/// operation takes the internal lock for the duration of one map access.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    default_ttl: Duration,
}

impl SessionStore {
    /// Create a store whose writes default to `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // ── Writes ──

    /// Store `value` under `key`. The session's expiry becomes the later of
    /// its current expiry and `now + ttl`.
    pub fn set(&self, session: &str, key: &str, value: Value, ttl: Option<Duration>) {
        let now = Instant::now();
        let deadline = deadline_after(now, ttl.unwrap_or(self.default_ttl));
        let mut sessions = self.write();

        let purged = Self::purge_locked(&mut sessions, now);
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }

        let record = sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionRecord {
                values: HashMap::new(),
                expires_at: deadline,
            });
        record.values.insert(key.to_string(), value);
        record.expires_at = record.expires_at.max(deadline);
    }

    /// Serialize and store a typed value.
    pub fn set_json<T: Serialize>(
        &self,
        session: &str,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), SessionError> {
        let encoded = serde_json::to_value(value).map_err(|e| SessionError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(session, key, encoded, ttl);
        Ok(())
    }

    // ── Reads ──

    /// The stored value, or `None` if the session or key is absent or the
    /// session has expired.
    pub fn get(&self, session: &str, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.read()
            .get(session)
            .filter(|r| r.is_live(now))
            .and_then(|r| r.values.get(key).cloned())
    }

    /// Like [`get`](Self::get) with a caller-supplied fallback.
    pub fn get_or(&self, session: &str, key: &str, default: Value) -> Value {
        self.get(session, key).unwrap_or(default)
    }

    /// Read and deserialize a typed value. Absence is `Ok(None)`; only a
    /// stored value of the wrong shape is an error.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        session: &str,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self.get(session, key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SessionError::Decode {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// A copy of the session's full live map (empty if absent or expired).
    pub fn get_all(&self, session: &str) -> HashMap<String, Value> {
        let now = Instant::now();
        self.read()
            .get(session)
            .filter(|r| r.is_live(now))
            .map(|r| r.values.clone())
            .unwrap_or_default()
    }

    // ── Lifecycle ──

    /// Remove one session. Returns `true` if a live session was removed.
    pub fn clear(&self, session: &str) -> bool {
        let now = Instant::now();
        self.write()
            .remove(session)
            .is_some_and(|r| r.is_live(now))
    }

    /// Remove every session. Returns how many were held (live or not).
    pub fn clear_all(&self) -> usize {
        let mut sessions = self.write();
        let count = sessions.len();
        sessions.clear();
        count
    }

    /// Push the session's expiry `minutes` further out. Returns `false` if
    /// the session does not exist or has already expired.
    pub fn extend_ttl(&self, session: &str, minutes: u64) -> bool {
        let now = Instant::now();
        match self.write().get_mut(session) {
            Some(record) if record.is_live(now) => {
                let extension = Duration::from_secs(minutes.saturating_mul(60));
                let cap = deadline_after(now, MAX_SESSION_TTL);
                record.expires_at = deadline_after(record.expires_at, extension).min(cap);
                true
            }
            _ => false,
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        Self::purge_locked(&mut self.write(), now)
    }

    // ── Introspection ──

    /// Metadata for every live session, newest first by the value each
    /// session stores under `created_key`. Sessions without a marker sort
    /// last; ties fall back to session id.
    pub fn list_sessions(&self, created_key: &str) -> Vec<SessionInfo> {
        let now = Instant::now();
        let sessions = self.read();
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .filter(|(_, r)| r.is_live(now))
            .map(|(id, r)| SessionInfo {
                session_id: id.clone(),
                key_count: r.values.len(),
                remaining_secs: r.expires_at.saturating_duration_since(now).as_secs(),
                created_at: r.values.get(created_key).and_then(marker_text),
            })
            .collect();

        infos.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        infos
    }

    /// Live session and key counts.
    pub fn stats(&self) -> SessionStats {
        let now = Instant::now();
        self.read()
            .values()
            .filter(|r| r.is_live(now))
            .fold(SessionStats::default(), |mut acc, r| {
                acc.sessions += 1;
                acc.keys += r.values.len();
                acc
            })
    }

    // ── Helpers ──

    fn purge_locked(sessions: &mut HashMap<String, SessionRecord>, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|_, r| r.is_live(now));
        before - sessions.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

fn marker_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
