use atrium_paths::PathError;
use atrium_plugins::PluginError;
use atrium_session::SessionError;
use atrium_store::StoreError;
use thiserror::Error;

/// Errors from the host context.
#[derive(Debug, Error)]
pub enum HostError {
    /// Required configuration is missing from the session.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `ATRIUM_CONFIG` names a config that is not in the catalog.
    #[error("unknown site config '{0}'")]
    UnknownConfig(String),

    /// An install or uninstall hook failed.
    #[error("{stage} hook failed: {reason}")]
    Hook { stage: String, reason: String },

    /// A plugin's own code failed.
    #[error("plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// The loader cannot handle the representation.
    #[error("loader '{loader}' is incompatible with subset '{subset}'")]
    IncompatibleLoader { loader: String, subset: String },

    /// The loader lacks an optional capability.
    #[error("loader '{loader}' does not support '{operation}'")]
    Unsupported { loader: String, operation: String },

    /// No discovered loader has the container's loader name.
    #[error("no loader named '{0}' was discovered")]
    LoaderNotFound(String),

    /// Every matching creator failed, or none matched.
    #[error("no creator ran for family '{family}'")]
    NoCreatorsRan { family: String },

    #[error("asset '{0}' does not exist in the active project")]
    UnknownAsset(String),

    /// The target representation has no file on disk.
    #[error("representation {0} has no file on disk")]
    RepresentationMissing(String),

    /// Documents that must exist do not. Points at database corruption or
    /// a concurrent writer.
    #[error("data integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plugins(#[from] PluginError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl HostError {
    pub(crate) fn plugin(plugin: &str, err: anyhow::Error) -> Self {
        Self::Plugin {
            plugin: plugin.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn hook(stage: &str, err: anyhow::Error) -> Self {
        Self::Hook {
            stage: stage.to_string(),
            reason: format!("{err:#}"),
        }
    }
}

/// Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;
