//! Error types for session operations.

use atrium_types::SchemaError;
use thiserror::Error;

/// Errors that can occur while reading or validating a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// One or more required keys are absent or empty.
    #[error("missing session keys: {}", keys.join(", "))]
    MissingKeys { keys: Vec<String> },

    /// A key holds a value that cannot be interpreted.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The session does not satisfy its structural schema.
    #[error("session schema violation: {0}")]
    Schema(#[from] SchemaError),
}

/// Convenience type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
