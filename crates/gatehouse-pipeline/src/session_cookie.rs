//! The signed session cookie.
//!
//! The cookie carries only the session id, never session data:
//!
//! ```text
//! <session id>.<issued at, unix seconds>.<base64url HMAC-SHA256>
//! ```
//!
//! The MAC covers `<id>.<issued at>`. A cookie that fails verification,
//! is older than its max-age, or doesn't parse is treated as absent.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::{Cookie, SameSite};
use gatehouse_session::SessionId;
use hmac::{Hmac, Mac};
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use sha2::Sha256;

use crate::PipelineError;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// CookieSigner
// ---------------------------------------------------------------------------

/// Signs and verifies cookie payloads with a server-side secret.
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    /// Shortest secret we accept.
    pub const MIN_SECRET_LEN: usize = 32;

    /// # Errors
    /// [`PipelineError::WeakSecret`] if `secret` is shorter than
    /// [`MIN_SECRET_LEN`](Self::MIN_SECRET_LEN) bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, PipelineError> {
        let key = secret.as_ref();
        if key.len() < Self::MIN_SECRET_LEN {
            return Err(PipelineError::WeakSecret {
                min: Self::MIN_SECRET_LEN,
                actual: key.len(),
            });
        }
        Ok(Self { key: key.to_vec() })
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC takes keys of any length, so this can't fail.
        <HmacSha256 as Mac>::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"))
    }

    /// Produces `<payload>.<signature>`.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    /// Returns the payload if `signed` carries a valid signature.
    pub fn verify<'v>(&self, signed: &'v str) -> Option<&'v str> {
        let (payload, signature) = signed.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature).ok()?;
        Some(payload)
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieSigner(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// SessionCookie
// ---------------------------------------------------------------------------

/// Reads and writes the session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    signer: CookieSigner,
    max_age: Duration,
    secure: bool,
}

impl SessionCookie {
    pub const DEFAULT_NAME: &'static str = "gatehouse_session";

    /// A cookie named [`DEFAULT_NAME`](Self::DEFAULT_NAME), 24-hour
    /// max-age, not marked `Secure`.
    pub fn new(signer: CookieSigner) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            signer,
            max_age: Duration::from_secs(24 * 60 * 60),
            secure: false,
        }
    }

    /// # Errors
    /// [`PipelineError::InvalidCookieName`] if `name` is empty or contains
    /// characters not allowed in a cookie name.
    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self, PipelineError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
        if !valid {
            return Err(PipelineError::InvalidCookieName(name));
        }
        self.name = name;
        Ok(self)
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Marks the cookie `Secure` (HTTPS only).
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// The session id carried by the request's cookie, or an empty string
    /// if there is no valid one.
    pub fn read(&self, headers: &HeaderMap) -> String {
        self.read_at(headers, unix_now())
    }

    pub(crate) fn read_at(&self, headers: &HeaderMap, now: u64) -> String {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .filter(|c| c.name() == self.name)
            .find_map(|c| self.decode(c.value_trimmed(), now))
            .unwrap_or_default()
    }

    /// Value for a `Set-Cookie` header binding the client to `session_id`.
    pub fn set_cookie(&self, session_id: &SessionId) -> HeaderValue {
        self.set_cookie_at(session_id, unix_now())
    }

    pub(crate) fn set_cookie_at(&self, session_id: &SessionId, now: u64) -> HeaderValue {
        let value = self.signer.sign(&format!("{session_id}.{now}"));
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let cookie = Cookie::build((self.name.clone(), value))
            .path("/")
            .max_age(cookie::time::Duration::seconds(max_age))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();
        // Name, hex id, digits, and base64url are all header-safe.
        HeaderValue::from_str(&cookie.to_string())
            .unwrap_or_else(|_| unreachable!("cookie is built from header-safe characters"))
    }

    fn decode(&self, value: &str, now: u64) -> Option<String> {
        let payload = self.signer.verify(value)?;
        let (session_id, issued_at) = payload.rsplit_once('.')?;
        let issued_at: u64 = issued_at.parse().ok()?;
        if now.saturating_sub(issued_at) > self.max_age.as_secs() {
            tracing::debug!("session cookie past max-age");
            return None;
        }
        Some(session_id.to_owned())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
