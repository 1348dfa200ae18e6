use std::time::Duration;

use atrium_session::SessionError;
use atrium_types::{DocumentId, SchemaError};

/// Errors from document store and connection operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation that needs a connection ran before `install()`.
    #[error("'{operation}' requires install() first")]
    NotInstalled { operation: String },

    /// The session names no active project.
    #[error("no active project in session")]
    NoActiveProject,

    /// Reachability probing exhausted its retries.
    #[error("couldn't connect to {url} in less than {:.3}ms (elapsed {:.3}s over {attempts} attempts)",
        timeout.as_secs_f64() * 1000.0, elapsed.as_secs_f64())]
    ConnectionFailed {
        url: String,
        timeout: Duration,
        elapsed: Duration,
        attempts: u32,
    },

    /// The connection dropped. Operations retry this before surfacing it.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// No connector knows how to open this URL.
    #[error("unsupported store scheme: {0}")]
    UnsupportedScheme(String),

    /// The URL could not be parsed.
    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    /// A document failed structural validation before a write.
    #[error("schema validation failed for {}: {source}", id.map(|i| i.to_hex()).unwrap_or_else(|| "<new>".into()))]
    SchemaValidation {
        id: Option<DocumentId>,
        #[source]
        source: SchemaError,
    },

    /// A filter, projection or update document is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A document with this id already exists in the namespace.
    #[error("duplicate document id: {0}")]
    DuplicateId(DocumentId),

    /// The document hierarchy is inconsistent. This is a bug in the data,
    /// not a user error.
    #[error("data integrity violation: {0}")]
    Integrity(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A database server rejected the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// I/O error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session holds an unusable value.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl StoreError {
    /// Returns `true` for conditions worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    pub(crate) fn not_installed(operation: &str) -> Self {
        Self::NotInstalled {
            operation: operation.to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
