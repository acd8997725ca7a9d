//! The session store: every live session, keyed by id.
//!
//! # Concurrency note
//!
//! `SessionStore` is shared by every request task through an `Arc`. A
//! single `parking_lot::Mutex` guards the map. The lock is held only for
//! map operations and for cloning data in or out, never across an
//! `.await`: request handling works on its own copy and hands it back
//! with [`SessionStore::persist`].
//!
//! Sessions with different ids never observe each other. Two requests on
//! the same id each get their own copy, and whichever persists last wins.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{SessionConfig, SessionData, SessionId};

/// The outcome of [`SessionStore::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The id the request is now bound to. Differs from the candidate
    /// when the candidate was empty, malformed, or unknown.
    pub session_id: SessionId,

    /// A private copy of the session's data.
    pub data: SessionData,

    /// `true` if the session was allocated by this call.
    pub is_new: bool,
}

struct Entry {
    data: SessionData,
    last_accessed: Instant,
}

impl Entry {
    fn touch(&mut self, now: Instant) {
        // Never move backwards, even if two requests race on the same id.
        self.last_accessed = self.last_accessed.max(now);
    }
}

struct Inner {
    sessions: HashMap<SessionId, Entry>,
    /// Ids given up by `rotate`, with when. Writes to them are dropped
    /// until the sweep forgets them after `max_age`.
    retired: HashMap<SessionId, Instant>,
    last_sweep: Instant,
}

/// In-process session storage.
///
/// ## Lifecycle
///
/// ```text
/// resolve("") ──→ [new, empty] ──→ persist() ──→ resolve(id) ──→ ...
///                      │                                │
///                      ▼ (idle > max_age)               ▼ (logout)
///                 evict_stale()                     rotate()
/// ```
pub struct SessionStore {
    inner: Mutex<Inner>,
    config: SessionConfig,
}

impl SessionStore {
    /// Creates an empty store. The first sweep may run one
    /// `sweep_interval` after construction.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                retired: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Looks up `candidate`, creating a fresh session if it is empty,
    /// malformed, or unknown.
    ///
    /// Never fails: an attacker-controlled string can at worst get itself
    /// a brand-new empty session.
    pub fn resolve(&self, candidate: &str) -> Resolved {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if let Some(id) = SessionId::parse(candidate) {
            if let Some(entry) = inner.sessions.get_mut(&id) {
                entry.touch(now);
                return Resolved {
                    session_id: id,
                    data: entry.data.clone(),
                    is_new: false,
                };
            }
        }

        let session_id = allocate(&mut inner, SessionData::new(), now);
        tracing::debug!(%session_id, "session created");

        Resolved {
            session_id,
            data: SessionData::new(),
            is_new: true,
        }
    }

    /// Replaces the data stored for `session_id`. Returns `false` if the
    /// write was dropped because the id has been rotated away.
    ///
    /// Idempotent. If the session was evicted while the request was in
    /// flight it is recorded again under the same id, so a login that
    /// straddles a sweep doesn't lose its flow state. A rotated id is
    /// never recorded again: a request that was in flight during logout
    /// must not bring the signed-in session back.
    pub fn persist(&self, session_id: &SessionId, data: SessionData) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.retired.contains_key(session_id) {
            tracing::debug!(%session_id, "dropped write to rotated session");
            return false;
        }

        match inner.sessions.get_mut(session_id) {
            Some(entry) => {
                entry.data = data;
                entry.touch(now);
            }
            None => {
                inner.sessions.insert(
                    session_id.clone(),
                    Entry {
                        data,
                        last_accessed: now,
                    },
                );
            }
        }

        tracing::trace!(%session_id, "session persisted");
        true
    }

    /// Moves `data` to a freshly allocated id and retires `old`.
    ///
    /// Used on logout so that a cookie captured before logout no longer
    /// names a live session. Later [`persist`](Self::persist) calls on
    /// `old` are dropped.
    pub fn rotate(&self, old: &SessionId, data: SessionData) -> SessionId {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.sessions.remove(old);
        inner.retired.insert(old.clone(), now);
        let session_id = allocate(&mut inner, data, now);

        tracing::info!(old = %old, new = %session_id, "session rotated");
        session_id
    }

    /// Forgets a session. Returns `true` if it existed.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        self.inner.lock().sessions.remove(session_id).is_some()
    }

    /// Removes every session idle for longer than `max_age`.
    ///
    /// Rate-limited: does nothing (and returns 0) if the previous sweep
    /// ran less than `config.sweep_interval` ago. Safe to call on every
    /// request.
    ///
    /// Returns the number of sessions removed.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if now.duration_since(inner.last_sweep) < self.config.sweep_interval {
            return 0;
        }

        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, entry| now.duration_since(entry.last_accessed) <= max_age);
        inner
            .retired
            .retain(|_, retired_at| now.duration_since(*retired_at) <= max_age);
        inner.last_sweep = now;

        let evicted = before - inner.sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = inner.sessions.len(), "stale sessions evicted");
        }
        evicted
    }

    /// Returns a copy of the data for `session_id` without touching it.
    pub fn get(&self, session_id: &SessionId) -> Option<SessionData> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(|entry| entry.data.clone())
    }

    pub fn last_accessed(&self, session_id: &SessionId) -> Option<Instant> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(|entry| entry.last_accessed)
    }

    /// `true` if `session_id` was rotated away and hasn't been swept yet.
    pub fn is_retired(&self, session_id: &SessionId) -> bool {
        self.inner.lock().retired.contains_key(session_id)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.inner.lock().sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// Inserts `data` under an id that no live or retired session uses.
fn allocate(inner: &mut Inner, data: SessionData, now: Instant) -> SessionId {
    let mut session_id = SessionId::generate();
    while inner.sessions.contains_key(&session_id) || inner.retired.contains_key(&session_id) {
        session_id = SessionId::generate();
    }
    inner.sessions.insert(
        session_id.clone(),
        Entry {
            data,
            last_accessed: now,
        },
    );
    session_id
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionStore`.
    //!
    //! Time-dependent tests run with tokio's clock paused
    //! (`start_paused = true`) and move it with `tokio::time::advance`,
    //! so a 25-hour idle period takes no wall-clock time.

    use serde_json::json;

    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn data(key: &str, value: serde_json::Value) -> SessionData {
        let mut data = SessionData::new();
        data.insert_value(key, value);
        data
    }

    // =====================================================================
    // resolve()
    // =====================================================================

    #[tokio::test]
    async fn test_resolve_empty_candidate_creates_session() {
        let store = SessionStore::default();

        let resolved = store.resolve("");

        assert!(resolved.is_new);
        assert!(resolved.data.is_empty());
        assert!(store.contains(&resolved.session_id));
    }

    #[tokio::test]
    async fn test_resolve_unknown_candidate_creates_fresh_id() {
        let store = SessionStore::default();
        let spoofed = "0123456789abcdef0123456789abcdef";

        let resolved = store.resolve(spoofed);

        assert!(resolved.is_new);
        assert_ne!(resolved.session_id.as_str(), spoofed);
    }

    #[tokio::test]
    async fn test_resolve_garbage_candidate_degrades_to_new() {
        let store = SessionStore::default();

        for candidate in ["../../etc/passwd", "\0", "💥", "f".repeat(10_000).as_str()] {
            let resolved = store.resolve(candidate);
            assert!(resolved.is_new, "{candidate:?} should not match");
        }
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_resolve_known_id_returns_existing_session() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;

        let resolved = store.resolve(id.as_str());

        assert!(!resolved.is_new);
        assert_eq!(resolved.session_id, id);
        assert!(resolved.data.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_returns_private_copy() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;

        let mut copy = store.resolve(id.as_str()).data;
        copy.insert_value("user", json!("mallory"));

        assert_eq!(store.get(&id), Some(SessionData::new()));
    }

    // =====================================================================
    // persist()
    // =====================================================================

    #[tokio::test]
    async fn test_persist_then_resolve_returns_latest_data() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;

        store.persist(&id, data("user", json!("ada")));
        store.persist(&id, data("user", json!("grace")));

        let resolved = store.resolve(id.as_str());
        assert!(!resolved.is_new);
        assert_eq!(resolved.data, data("user", json!("grace")));
    }

    #[tokio::test]
    async fn test_persist_same_data_twice_is_idempotent() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;
        let same = data("k", json!([1, 2, 3]));

        store.persist(&id, same.clone());
        store.persist(&id, same.clone());

        assert_eq!(store.get(&id), Some(same));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_after_removal_restores_under_same_id() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;
        store.remove(&id);

        store.persist(&id, data("auth_flow", json!({ "state": "s" })));

        let resolved = store.resolve(id.as_str());
        assert!(!resolved.is_new);
        assert_eq!(resolved.session_id, id);
    }

    // =====================================================================
    // rotate() / remove()
    // =====================================================================

    #[tokio::test]
    async fn test_rotate_moves_data_and_retires_old_id() {
        let store = SessionStore::default();
        let old = store.resolve("").session_id;

        let new = store.rotate(&old, SessionData::new());

        assert_ne!(old, new);
        assert!(!store.contains(&old));
        assert!(store.contains(&new));
        assert!(store.resolve(old.as_str()).is_new);
    }

    #[tokio::test]
    async fn test_persist_after_rotate_does_not_restore_old_id() {
        let store = SessionStore::default();
        let old = store.resolve("").session_id;
        store.persist(&old, data("user", json!("ada")));

        let new = store.rotate(&old, SessionData::new());
        let written = store.persist(&old, data("user", json!("ada")));

        assert!(!written);
        assert!(!store.contains(&old));
        assert!(store.is_retired(&old));
        assert_eq!(store.get(&new), Some(SessionData::new()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale_forgets_retired_ids_after_max_age() {
        let store = SessionStore::default();
        let old = store.resolve("").session_id;
        store.rotate(&old, SessionData::new());

        tokio::time::advance(25 * HOUR).await;
        store.evict_stale(24 * HOUR);

        assert!(!store.is_retired(&old));
    }

    #[tokio::test]
    async fn test_remove_unknown_returns_false() {
        let store = SessionStore::default();

        assert!(!store.remove(&SessionId::generate()));
    }

    // =====================================================================
    // evict_stale()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale_removes_idle_sessions_after_window() {
        let store = SessionStore::default();
        let idle = store.resolve("").session_id;

        tokio::time::advance(25 * HOUR).await;
        let fresh = store.resolve("").session_id;

        let evicted = store.evict_stale(24 * HOUR);

        assert_eq!(evicted, 1);
        assert!(!store.contains(&idle));
        assert!(store.contains(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale_within_window_is_noop() {
        let store = SessionStore::default();
        store.resolve("");

        tokio::time::advance(Duration::from_secs(30 * 60)).await;

        // Everything is "stale" for a zero max-age, but the sweep hasn't
        // been allowed to run yet.
        assert_eq!(store.evict_stale(Duration::ZERO), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale_rate_limits_back_to_back_sweeps() {
        let store = SessionStore::default();
        tokio::time::advance(2 * HOUR).await;
        assert_eq!(store.evict_stale(24 * HOUR), 0);

        // Second sweep in the same window does nothing even though this
        // session is older than the (tiny) max age.
        store.resolve("");
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.evict_stale(Duration::from_secs(1)), 0);
        assert_eq!(store.len(), 1);

        tokio::time::advance(HOUR).await;
        assert_eq!(store.evict_stale(Duration::from_secs(1)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_refreshes_last_accessed() {
        let store = SessionStore::default();
        let id = store.resolve("").session_id;
        let created = store.last_accessed(&id).unwrap();

        tokio::time::advance(23 * HOUR).await;
        store.resolve(id.as_str());
        tokio::time::advance(2 * HOUR).await;

        assert!(store.last_accessed(&id).unwrap() > created);
        assert_eq!(store.evict_stale(24 * HOUR), 0);
        assert!(store.contains(&id));
    }
}
