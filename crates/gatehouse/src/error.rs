//! Unified error type for the gateway.

use std::path::PathBuf;

use gatehouse_identity::IdentityError;
use gatehouse_pipeline::PipelineError;
use gatehouse_session::SessionError;

/// Startup configuration problems. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variables that are unset (or empty) after secrets were
    /// loaded.
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A variable is set but its value can't be used.
    #[error("invalid {name}: {reason}")]
    Invalid { name: String, reason: String },

    /// The secrets file couldn't be read or parsed.
    #[error("failed to read secrets from {}: {reason}", path.display())]
    Secrets { path: PathBuf, reason: String },
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Binding or serving the listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_every_name() {
        let err = ConfigError::Missing(vec!["AZURE_CLIENT_ID".into(), "SESSION_SECRET".into()]);

        assert_eq!(
            err.to_string(),
            "missing required configuration: AZURE_CLIENT_ID, SESSION_SECRET"
        );
    }

    #[test]
    fn test_from_config_error() {
        let err: GatehouseError = ConfigError::Missing(vec!["PORT".into()]).into();

        assert!(matches!(err, GatehouseError::Config(_)));
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_from_identity_error() {
        let err: GatehouseError = IdentityError::Unauthorized("nope".into()).into();

        assert!(matches!(err, GatehouseError::Identity(_)));
    }

    #[test]
    fn test_from_pipeline_error() {
        let err: GatehouseError = PipelineError::WeakSecret { min: 32, actual: 4 }.into();

        assert!(matches!(err, GatehouseError::Pipeline(_)));
        assert!(err.to_string().contains("32"));
    }
}
