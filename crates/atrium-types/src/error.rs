use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Structural validation failures raised by a [`crate::SchemaValidator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The document carries no `schema` field, or it is not a string.
    #[error("document has no schema tag")]
    MissingSchema,

    /// The schema tag does not follow `{root}:{kind}-{major}.{minor}`.
    #[error("malformed schema tag: {0}")]
    Malformed(String),

    /// The schema kind is not known to the validator.
    #[error("unknown schema: {0}")]
    Unknown(String),

    /// A required field is absent.
    #[error("{schema}: missing required field '{field}'")]
    MissingField { schema: String, field: String },

    /// A field is present but has the wrong shape.
    #[error("{schema}: field '{field}' must be {expected}")]
    InvalidField {
        schema: String,
        field: String,
        expected: String,
    },
}
