//! # Configuration
//!
//! Everything comes from the environment (12-factor style), looked up
//! through an [`Environment`] so that secrets loaded at startup fill in
//! whatever the process environment leaves unset.
//!
//! ## Variables
//! - `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`, `AZURE_REDIRECT_URI`: required
//! - `AZURE_TENANT_ID`: required unless `AZURE_AUTHORITY` is set
//! - `AZURE_AUTHORITY`: defaults to `https://login.microsoftonline.com/<tenant>`
//! - `AZURE_SCOPES`: space-separated, default `https://graph.microsoft.com/.default`
//! - `SESSION_SECRET`: required, at least 32 bytes
//! - `HOST` (default `127.0.0.1`), `PORT` (default `8000`)
//! - `PUBLIC_DIR`: where `index.html` lives (default `public`)
//! - `GATEHOUSE_SECURE_COOKIES`, `WEBSITE_SITE_NAME`, `WEBSITE_INSTANCE_ID`:
//!   any of them marks the session cookie `Secure`
//! - `SECRETS_FILE`, `SECRETS_PREFIX`: see [`bootstrap`]
//!
//! `KEY_VAULT_NAME` is not read for configuration. There is no vault
//! client; if it is set without `SECRETS_FILE`, [`bootstrap`] logs a
//! warning and carries on.

use std::path::PathBuf;

use gatehouse_identity::OidcConfig;
use url::Url;

use crate::ConfigError;
use crate::secrets::{Environment, JsonFileSource, SecretReport};

const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Builds the lookup environment for the process.
///
/// 1. Loads `.env` into the process environment if there is one (values
///    already set are kept).
/// 2. If `SECRETS_FILE` is set, loads its secrets under `SECRETS_PREFIX`.
///    Otherwise warns if `KEY_VAULT_NAME` is set, since nothing loads it.
///
/// # Errors
/// [`ConfigError::Secrets`] if `SECRETS_FILE` is set but unreadable.
pub fn bootstrap() -> Result<(Environment, Option<SecretReport>), ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let mut env = Environment::process();
    let report = match env.get("SECRETS_FILE") {
        Some(path) => {
            let source = JsonFileSource::open(&path)?;
            let prefix = env.get("SECRETS_PREFIX").unwrap_or_default();
            Some(env.load_secrets(&source, &prefix))
        }
        None => {
            if let Some(vault) = env.get("KEY_VAULT_NAME") {
                tracing::warn!(
                    %vault,
                    "KEY_VAULT_NAME is set but no vault client is built in; \
                     export the vault to SECRETS_FILE instead"
                );
            }
            None
        }
    };

    Ok((env, report))
}

// ---------------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------------

/// OAuth client registration read from the environment.
#[derive(Clone)]
pub struct IdentityConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authority: Url,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("client_id", &self.client_id)
            .field("authority", &self.authority.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl IdentityConfig {
    /// # Errors
    /// [`ConfigError::Missing`] listing every missing variable, or
    /// [`ConfigError::Invalid`] for a malformed URL.
    pub fn from_env(env: &Environment) -> Result<Self, ConfigError> {
        let mut required = Required::new(env);
        let config = Self::read(env, &mut required);
        required.finish()?;
        config
    }

    fn read(env: &Environment, required: &mut Required<'_>) -> Result<Self, ConfigError> {
        let client_id = required.get("AZURE_CLIENT_ID");
        let client_secret = required.get("AZURE_CLIENT_SECRET");
        let redirect_uri = required.get("AZURE_REDIRECT_URI");
        let authority = match env.get("AZURE_AUTHORITY") {
            Some(authority) => authority,
            None => format!(
                "https://login.microsoftonline.com/{}",
                required.get("AZURE_TENANT_ID")
            ),
        };
        let scopes = env
            .get("AZURE_SCOPES")
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string())
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        if !required.is_complete() {
            // Values are placeholders; finish() reports what's missing.
            return Err(ConfigError::Missing(Vec::new()));
        }

        Ok(Self {
            client_id,
            client_secret,
            authority: parse_url("AZURE_AUTHORITY", &authority)?,
            redirect_uri: parse_url("AZURE_REDIRECT_URI", &redirect_uri)?,
            scopes,
        })
    }

    pub fn oidc(&self) -> OidcConfig {
        OidcConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            authority: self.authority.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Everything the server needs to start.
#[derive(Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub public_dir: PathBuf,
    pub session_secret: String,
    pub secure_cookies: bool,
    pub identity: IdentityConfig,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_dir", &self.public_dir)
            .field("secure_cookies", &self.secure_cookies)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// Reads the full configuration, failing fast with every missing
    /// variable listed at once.
    pub fn from_env(env: &Environment) -> Result<Self, ConfigError> {
        let mut required = Required::new(env);
        let session_secret = required.get("SESSION_SECRET");
        let identity = IdentityConfig::read(env, &mut required);
        required.finish()?;
        let identity = identity?;

        let port = match env.get("PORT") {
            Some(port) => port.parse().map_err(|e| ConfigError::Invalid {
                name: "PORT".into(),
                reason: format!("{e}"),
            })?,
            None => 8000,
        };

        Ok(Self {
            host: env.get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            public_dir: env.get("PUBLIC_DIR").unwrap_or_else(|| "public".into()).into(),
            session_secret,
            secure_cookies: env.is_set("WEBSITE_SITE_NAME")
                || env.is_set("WEBSITE_INSTANCE_ID")
                || env.get("GATEHOUSE_SECURE_COOKIES").as_deref() == Some("1"),
            identity,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Collects required variables, remembering every one that is missing.
struct Required<'e> {
    env: &'e Environment,
    missing: Vec<String>,
}

impl<'e> Required<'e> {
    fn new(env: &'e Environment) -> Self {
        Self {
            env,
            missing: Vec::new(),
        }
    }

    fn get(&mut self, name: &str) -> String {
        self.env.get(name).unwrap_or_else(|| {
            self.missing.push(name.to_string());
            String::new()
        })
    }

    fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    fn finish(self) -> Result<(), ConfigError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(self.missing))
        }
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
