use thiserror::Error;

/// Errors from parsing or formatting a template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A placeholder names data that is not available.
    #[error("template key '{0}' is missing")]
    MissingKey(String),

    /// The template text itself is broken.
    #[error("malformed template '{template}': {reason}")]
    Malformed { template: String, reason: String },

    /// The format spec after `:` is not supported.
    #[error("invalid format spec '{spec}' for key '{key}'")]
    InvalidFormatSpec { key: String, spec: String },

    /// Objects and arrays cannot be rendered into text.
    #[error("value of '{0}' cannot be formatted")]
    NotFormattable(String),
}

/// Errors from path resolution and workfile scanning.
#[derive(Debug, Error)]
pub enum PathError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The workfile template has no `{version}` placeholder.
    #[error("workfile template '{0}' has no version placeholder")]
    NoVersionPlaceholder(String),

    #[error("no extensions given")]
    NoExtensions,

    #[error("invalid workfile pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for path operations.
pub type PathResult<T> = Result<T, PathError>;
