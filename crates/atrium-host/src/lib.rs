//! Host integration for Atrium.
//!
//! A [`HostContext`] ties a DCC [`Host`] to the pipeline. Installing it
//! connects the project database, runs the site configuration picked by
//! `ATRIUM_CONFIG` and registers the built-in thumbnail resolvers. Once
//! installed, it drives loaders and creators, moves the session between
//! tasks and announces lifecycle changes on its [`EventBus`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use atrium_host::{DefaultHost, HostContext};
//! use atrium_session::ProcessEnvironment;
//!
//! let context = HostContext::from_environment(Arc::new(ProcessEnvironment), true);
//! context.install(Arc::new(DefaultHost))?;
//! context.update_current_task(Some("anim"), None, Some("maya"))?;
//! context.uninstall();
//! # Ok::<(), atrium_host::HostError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod task;

pub use config::{submodule_candidates, ConfigCatalog, HostHooks, SiteConfig};
pub use context::{ExistencePolicy, HostContext, RepresentationRef};
pub use error::{HostError, HostResult};
pub use events::{EventBus, Subscription};
pub use host::{DefaultHost, Host};
pub use task::{compute_session_changes, SessionChanges};
