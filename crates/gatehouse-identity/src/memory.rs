//! In-process identity provider for tests and local development.
//!
//! Behaves like a real provider from the gateway's point of view: login
//! records a `state` nonce and returns an authorization URL, the callback
//! must echo that `state` and present a code the provider knows about.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_session::SessionData;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::provider::{clear_identity, current_user, keys};
use crate::{CallbackParams, IdentityError, IdentityProvider, UserClaims};

#[derive(Debug, Serialize, Deserialize)]
struct MemoryFlow {
    state: String,
}

/// A fake identity provider.
///
/// ```rust
/// use gatehouse_identity::{MemoryIdentityProvider, UserClaims};
///
/// let idp = MemoryIdentityProvider::new()
///     .with_code("good-code", UserClaims::new("oid-1").with_name("Ada"));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryIdentityProvider {
    authorize_url: String,
    codes: HashMap<String, UserClaims>,
    latency: Duration,
    login_available: bool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            authorize_url: "https://idp.test/authorize".to_string(),
            codes: HashMap::new(),
            latency: Duration::ZERO,
            login_available: true,
        }
    }

    /// Accepts `code` at the callback and signs in as `claims`.
    pub fn with_code(mut self, code: impl Into<String>, claims: UserClaims) -> Self {
        self.codes.insert(code.into(), claims);
        self
    }

    /// Delays every provider round-trip, like a slow network would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes [`login`](IdentityProvider::login) fail, as if the provider
    /// couldn't produce an authorization URL.
    pub fn without_login(mut self) -> Self {
        self.login_available = false;
        self
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn login(&self, session: &mut SessionData) -> Result<String, IdentityError> {
        self.round_trip().await;
        if !self.login_available {
            return Err(IdentityError::Provider("authorization endpoint unavailable".into()));
        }

        let state = {
            let bytes: [u8; 16] = rand::rng().random();
            URL_SAFE_NO_PAD.encode(bytes)
        };
        session.insert(keys::FLOW, &MemoryFlow { state: state.clone() })?;

        Ok(format!("{}?state={state}", self.authorize_url))
    }

    async fn complete_login(
        &self,
        session: &mut SessionData,
        params: &CallbackParams,
    ) -> Result<UserClaims, IdentityError> {
        self.round_trip().await;

        let flow: MemoryFlow = session
            .get(keys::FLOW)?
            .ok_or_else(|| IdentityError::Unauthorized("no login in progress".into()))?;
        if params.state() != Some(flow.state.as_str()) {
            return Err(IdentityError::Unauthorized("state mismatch".into()));
        }
        let claims = params
            .code()
            .and_then(|code| self.codes.get(code))
            .cloned()
            .ok_or_else(|| IdentityError::Unauthorized("invalid authorization code".into()))?;

        session.insert(keys::USER, &claims)?;
        session.remove(keys::FLOW);
        Ok(claims)
    }

    fn get_user(&self, session: &SessionData) -> Option<UserClaims> {
        current_user(session)
    }

    fn logout(&self, session: &mut SessionData) {
        clear_identity(session);
    }
}
