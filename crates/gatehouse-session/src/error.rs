//! Error types for the session layer.

/// Errors raised while reading or writing typed session values.
///
/// The store itself never fails: unknown or malformed identifiers degrade
/// to a fresh session. Only converting a value to or from JSON can go
/// wrong, and that is a programming error in the caller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The value stored under `key` could not be decoded into the
    /// requested type.
    #[error("session value {key:?} has an unexpected shape: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be encoded as JSON.
    #[error("session value {key:?} could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
