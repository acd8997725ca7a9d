//! Error types for the identity layer.

use gatehouse_session::SessionError;

/// Errors returned by [`IdentityProvider`](crate::IdentityProvider)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider rejected the login, or the callback didn't match the
    /// flow this session started. Surfaced to clients as 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The provider couldn't be reached or answered with something we
    /// couldn't understand.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// The provider configuration is unusable (bad URL, etc.).
    #[error("invalid identity configuration: {0}")]
    InvalidConfig(String),

    /// Flow state in the session couldn't be read or written.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}
