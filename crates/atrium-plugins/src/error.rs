use std::path::PathBuf;

use thiserror::Error;

/// Errors from plugin registration and discovery.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin was never registered.
    #[error("{category} plugin '{name}' is not registered")]
    NotFound { category: String, name: String },

    /// The path was never registered.
    #[error("plugin path '{}' is not registered", .0.display())]
    PathNotFound(PathBuf),

    /// A plugin module file could not be read or understood.
    #[error("plugin module '{}': {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// A class names a factory nobody registered.
    #[error("class '{class}' uses unknown factory '{factory}'")]
    UnknownFactory { class: String, factory: String },

    /// A factory refused to build a class.
    #[error("factory for class '{class}' failed: {reason}")]
    Factory { class: String, reason: String },

    /// A factory built a plugin of another category than the class declares.
    #[error("class '{class}' is a {expected} but its factory built a {actual}")]
    CategoryMismatch {
        class: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
