//! OpenID Connect authorization-code flow with PKCE.
//!
//! The flow, as seen from the session:
//!
//! ```text
//! login()            → session[auth_flow] = { state, nonce, verifier }
//!                      browser → <authority>/oauth2/v2.0/authorize?...
//! complete_login()   → check state, POST code + verifier to /token,
//!                      check nonce in the ID token,
//!                      session[user] = claims, session[tokens] = tokens,
//!                      drop session[auth_flow]
//! ```
//!
//! The ID token is read without checking its signature: it comes straight
//! from the token endpoint over TLS, in response to a request we
//! authenticated with the client secret, which OIDC Core 3.1.3.7 allows.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_session::SessionData;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::claims::unix_now;
use crate::provider::{clear_identity, current_user, keys};
use crate::{CallbackParams, IdentityError, IdentityProvider, UserClaims};

/// Scopes every OIDC login asks for on top of the configured ones.
const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Client registration details for the authorization server.
#[derive(Clone)]
pub struct OidcConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Base authority, e.g. `https://login.microsoftonline.com/<tenant>`.
    pub authority: Url,
    /// Where the provider sends the browser back to (our callback route).
    pub redirect_uri: Url,
    /// API scopes requested in addition to `openid profile offline_access`.
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority", &self.authority.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl OidcConfig {
    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        let base = self.authority.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/oauth2/v2.0/{path}"))
            .map_err(|e| IdentityError::InvalidConfig(format!("{path} endpoint: {e}")))
    }

    fn scope(&self) -> String {
        OIDC_SCOPES
            .iter()
            .copied()
            .chain(self.scopes.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// Session-resident state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthFlow {
    state: String,
    nonce: String,
    code_verifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    oid: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
    nonce: Option<String>,
    exp: Option<u64>,
}

// ---------------------------------------------------------------------------
// OidcProvider
// ---------------------------------------------------------------------------

/// [`IdentityProvider`] backed by a real OIDC authorization server.
pub struct OidcProvider {
    config: OidcConfig,
    authorize_endpoint: Url,
    token_endpoint: Url,
    http: reqwest::Client,
}

impl OidcProvider {
    /// # Errors
    /// [`IdentityError::InvalidConfig`] if the authority can't be turned
    /// into endpoint URLs.
    pub fn new(config: OidcConfig) -> Result<Self, IdentityError> {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(
        config: OidcConfig,
        http: reqwest::Client,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            authorize_endpoint: config.endpoint("authorize")?,
            token_endpoint: config.endpoint("token")?,
            config,
            http,
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Exchanges the authorization code for tokens.
    async fn redeem(
        &self,
        code: &str,
        flow: &AuthFlow,
    ) -> Result<TokenResponse, IdentityError> {
        let scope = self.config.scope();
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", flow.code_verifier.as_str()),
            ("scope", scope.as_str()),
        ];

        tracing::info!("exchanging authorization code for tokens");
        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            tracing::info!(
                %status,
                error = %body.error,
                "token endpoint rejected the authorization code"
            );
            return Err(IdentityError::Unauthorized(
                body.error_description
                    .unwrap_or_else(|| format!("token endpoint returned {status}")),
            ));
        }

        Ok(response.json().await?)
    }
}

impl IdentityProvider for OidcProvider {
    async fn login(&self, session: &mut SessionData) -> Result<String, IdentityError> {
        let flow = AuthFlow {
            state: random_token(),
            nonce: random_token(),
            code_verifier: random_token_long(),
        };

        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.config.scope())
            .append_pair("state", &flow.state)
            .append_pair("nonce", &flow.nonce)
            .append_pair("code_challenge", &pkce_challenge(&flow.code_verifier))
            .append_pair("code_challenge_method", "S256");

        session.insert(keys::FLOW, &flow)?;
        tracing::debug!("authorization redirect created");
        Ok(url.into())
    }

    async fn complete_login(
        &self,
        session: &mut SessionData,
        params: &CallbackParams,
    ) -> Result<UserClaims, IdentityError> {
        // Everything is validated against a copy of the flow; the session
        // is only written once the exchange has fully succeeded.
        let flow: AuthFlow = session
            .get(keys::FLOW)?
            .ok_or_else(|| IdentityError::Unauthorized("no login in progress".into()))?;

        if let Some(error) = params.error() {
            return Err(IdentityError::Unauthorized(format!(
                "{error}: {}",
                params.error_description().unwrap_or("login was not completed")
            )));
        }
        if params.state() != Some(flow.state.as_str()) {
            return Err(IdentityError::Unauthorized("state mismatch".into()));
        }
        let code = params
            .code()
            .ok_or_else(|| IdentityError::Unauthorized("missing authorization code".into()))?;

        let tokens = self.redeem(code, &flow).await?;

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| IdentityError::Provider("token response has no id_token".into()))?;
        let id_claims = decode_id_token(id_token)?;
        if id_claims.nonce.as_deref() != Some(flow.nonce.as_str()) {
            return Err(IdentityError::Unauthorized("nonce mismatch".into()));
        }

        let claims = UserClaims {
            subject: id_claims.oid.unwrap_or(id_claims.sub),
            name: id_claims.name,
            preferred_username: id_claims.preferred_username,
            email: id_claims.email,
            expires_at: id_claims.exp,
        };
        let stored = StoredTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_in.map(|secs| unix_now() + secs),
        };

        let mut updated = session.clone();
        updated.insert(keys::USER, &claims)?;
        updated.insert(keys::TOKENS, &stored)?;
        updated.remove(keys::FLOW);
        *session = updated;

        tracing::info!(subject = %claims.subject, "authorization code exchanged");
        Ok(claims)
    }

    fn get_user(&self, session: &SessionData) -> Option<UserClaims> {
        current_user(session)
    }

    fn logout(&self, session: &mut SessionData) {
        clear_identity(session);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 128 random bits, base64url.
fn random_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 256 random bits, base64url (43 chars, inside PKCE's 43..=128 range).
fn random_token_long() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn decode_id_token(token: &str) -> Result<IdTokenClaims, IdentityError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError::Provider("id_token is not a JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdentityError::Provider(format!("id_token payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| IdentityError::Provider(format!("id_token claims: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> OidcConfig {
        OidcConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            authority: Url::parse("https://login.example.com/tenant/").unwrap(),
            redirect_uri: Url::parse("http://localhost:8080/signin").unwrap(),
            scopes: vec!["https://graph.microsoft.com/.default".into()],
        }
    }

    #[test]
    fn test_endpoint_joins_authority_without_double_slash() {
        let url = config().endpoint("token").unwrap();

        assert_eq!(url.as_str(), "https://login.example.com/tenant/oauth2/v2.0/token");
    }

    #[test]
    fn test_pkce_challenge_matches_rfc7636_vector() {
        // RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_decode_id_token_reads_payload() {
        let payload = URL_SAFE_NO_PAD.encode(
            json!({ "sub": "s", "oid": "o", "nonce": "n", "exp": 10 }).to_string(),
        );
        let token = format!("e30.{payload}.sig");

        let claims = decode_id_token(&token).unwrap();

        assert_eq!(claims.oid.as_deref(), Some("o"));
        assert_eq!(claims.nonce.as_deref(), Some("n"));
        assert_eq!(claims.exp, Some(10));
    }

    #[test]
    fn test_decode_id_token_rejects_non_jwt() {
        assert!(matches!(
            decode_id_token("opaque-token"),
            Err(IdentityError::Provider(_))
        ));
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let rendered = format!("{:?}", config());

        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_scope_prepends_oidc_scopes() {
        assert_eq!(
            config().scope(),
            "openid profile offline_access https://graph.microsoft.com/.default"
        );
    }
}
