//! Error types for the pipeline layer.

/// Errors raised while assembling the pipeline.
///
/// Per-request failures never show up here: they are turned into
/// redirects or status codes by the interceptors themselves.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The cookie signing secret is too short to be safe.
    #[error("session secret must be at least {min} bytes, got {actual}")]
    WeakSecret { min: usize, actual: usize },

    /// The session cookie name isn't a valid cookie token.
    #[error("invalid session cookie name {0:?}")]
    InvalidCookieName(String),
}
