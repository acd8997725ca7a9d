//! Secret bootstrapping.
//!
//! At startup the gateway may pull configuration values from a secret
//! store. Secrets only ever fill gaps: a variable already set in the
//! process environment always wins.
//!
//! Nothing here writes to the process environment. Loaded secrets live
//! in an [`Environment`] overlay that config lookups go through.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::ConfigError;

// ---------------------------------------------------------------------------
// SecretSource
// ---------------------------------------------------------------------------

/// A store of named secrets.
pub trait SecretSource: Send + Sync {
    /// Every secret name the store knows about.
    fn names(&self) -> Vec<String>;

    /// The value of one secret, or `None` if it can't be retrieved.
    fn get(&self, name: &str) -> Option<String>;
}

/// Secrets held in memory. Mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretSource {
    secrets: BTreeMap<String, String>,
}

impl MemorySecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

impl SecretSource for MemorySecretSource {
    fn names(&self) -> Vec<String> {
        self.secrets.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<String> {
        self.secrets.get(name).cloned()
    }
}

/// Secrets read from a flat JSON object on disk, e.g. a file mounted by
/// the platform's secret store:
///
/// ```json
/// { "azure-client-secret": "…", "session-secret": "…" }
/// ```
///
/// Non-string values are listed but can't be retrieved.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    secrets: BTreeMap<String, serde_json::Value>,
}

impl JsonFileSource {
    /// # Errors
    /// [`ConfigError::Secrets`] if the file can't be read or isn't a JSON
    /// object.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let secrets_error = |reason: String| ConfigError::Secrets {
            path: path.clone(),
            reason,
        };

        let text = std::fs::read_to_string(&path).map_err(|e| secrets_error(e.to_string()))?;
        let secrets = serde_json::from_str(&text).map_err(|e| secrets_error(e.to_string()))?;

        Ok(Self { path, secrets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretSource for JsonFileSource {
    fn names(&self) -> Vec<String> {
        self.secrets.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<String> {
        self.secrets.get(name)?.as_str().map(str::to_owned)
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Per-secret outcome of [`Environment::load_secrets`]: `true` if the
/// secret was loaded, `false` if it was skipped (already set, or not
/// retrievable).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretReport {
    results: BTreeMap<String, bool>,
}

impl SecretReport {
    pub fn get(&self, secret_name: &str) -> Option<bool> {
        self.results.get(secret_name).copied()
    }

    /// Names of the secrets that were loaded.
    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, loaded)| **loaded)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Base {
    Process,
    Fixed(HashMap<String, String>),
}

/// Configuration lookup: the base environment first, then loaded secrets.
///
/// Empty values count as unset.
#[derive(Debug, Clone)]
pub struct Environment {
    base: Base,
    overlay: HashMap<String, String>,
}

impl Environment {
    /// Reads the process environment.
    pub fn process() -> Self {
        Self {
            base: Base::Process,
            overlay: HashMap::new(),
        }
    }

    /// A fixed set of variables, isolated from the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            base: Base::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
            overlay: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let base = match &self.base {
            Base::Process => std::env::var(name).ok(),
            Base::Fixed(vars) => vars.get(name).cloned(),
        };
        base.filter(|value| !value.is_empty())
            .or_else(|| self.overlay.get(name).cloned())
            .filter(|value| !value.is_empty())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Copies every secret from `source` into this environment under
    /// `<PREFIX><NAME>`, uppercased with `-` mapped to `_`.
    ///
    /// Names that already resolve are skipped and never overwritten.
    /// Secrets that can't be retrieved are logged and skipped.
    pub fn load_secrets(&mut self, source: &dyn SecretSource, prefix: &str) -> SecretReport {
        let mut report = SecretReport::default();

        for secret_name in source.names() {
            if secret_name.is_empty() {
                continue;
            }
            let var = env_var_name(prefix, &secret_name);

            if self.is_set(&var) {
                tracing::info!(%var, "already set, secret not loaded");
                report.results.insert(secret_name, false);
                continue;
            }

            match source.get(&secret_name) {
                Some(value) => {
                    tracing::info!(%var, "loaded secret");
                    self.overlay.insert(var, value);
                    report.results.insert(secret_name, true);
                }
                None => {
                    tracing::warn!(secret = %secret_name, "failed to retrieve secret");
                    report.results.insert(secret_name, false);
                }
            }
        }

        let loaded: Vec<&str> = report.loaded().collect();
        tracing::info!(loaded = %loaded.join(","), "secrets loaded");
        report
    }
}

fn env_var_name(prefix: &str, secret_name: &str) -> String {
    format!("{prefix}{secret_name}").to_uppercase().replace('-', "_")
}
