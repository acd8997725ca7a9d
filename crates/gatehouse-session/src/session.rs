//! Session types: identifiers, data, and configuration.
//!
//! A "session" is the server's record of one browser across requests. It
//! tracks:
//! - WHO it is (`SessionId`, carried by the signed cookie)
//! - WHAT it knows (`SessionData`: user claims, OAuth flow state, tokens)

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque identifier for a server-side session.
///
/// Always 32 lowercase hex characters (128 bits of randomness). Anything
/// else a client sends is not a session id and is treated as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Length of the hex encoding.
    pub const LEN: usize = 32;

    /// Draws a fresh random identifier.
    ///
    /// 128 bits is enough that a collision between two live sessions is
    /// not a practical concern; the store still re-draws on collision.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Accepts `candidate` only if it is shaped like an id we issue.
    pub fn parse(candidate: &str) -> Option<Self> {
        let well_formed = candidate.len() == Self::LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(candidate.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionData
// ---------------------------------------------------------------------------

/// The key/value bag attached to a session.
///
/// Values are JSON so that any serializable type can be stored, and so
/// that two bags can be compared structurally: the binding middleware
/// decides whether to write a session back by comparing the bag after the
/// handler ran against the snapshot taken before.
///
/// `BTreeMap` keeps equality independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(BTreeMap<String, Value>);

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and decodes the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    /// [`SessionError::Decode`] if the stored JSON doesn't fit `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        self.0
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| {
                    SessionError::Decode {
                        key: key.to_owned(),
                        source,
                    }
                })
            })
            .transpose()
    }

    /// Encodes `value` and stores it under `key`, replacing any previous
    /// value.
    ///
    /// # Errors
    /// [`SessionError::Encode`] if `value` can't be represented as JSON.
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        let json =
            serde_json::to_value(value).map_err(|source| SessionError::Encode {
                key: key.to_owned(),
                source,
            })?;
        self.0.insert(key.to_owned(), json);
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timeouts for session eviction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session may sit idle before the sweep removes it.
    ///
    /// Default: 24 hours, matching the cookie's max-age.
    pub max_age: Duration,

    /// Minimum time between two sweeps. Calls to
    /// [`SessionStore::evict_stale`](crate::SessionStore::evict_stale)
    /// inside this window are no-ops.
    ///
    /// Default: 1 hour.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}
