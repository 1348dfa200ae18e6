//! Document store boundary and project database connection for Atrium.
//!
//! The pipeline core never talks to a database driver directly. It goes
//! through the [`DocumentStore`] trait, opened by a [`StoreConnector`] from
//! the session's `ATRIUM_DB_URL`, and wrapped by a [`DatabaseConnection`]
//! that scopes every call to the active project.
//!
//! # Modules
//!
//! - [`query`]: filters, sorts, projections and updates
//! - [`traits`]: the [`DocumentStore`] and [`StoreConnector`] contracts
//! - [`memory`]: in-memory backend with fault injection (`memory://`)
//! - [`directory`]: one-JSON-file-per-document backend (`file://`)
//! - [`mongo`]: MongoDB backend (`mongodb://`, `mongodb+srv://`)
//! - [`connector`]: URL scheme dispatch
//! - [`retry`]: probe and operation retry timing
//! - [`config`]: connection settings derived from the session
//! - [`connection`]: [`DatabaseConnection`]
//! - [`error`]: error types

pub mod config;
pub mod connection;
pub mod connector;
pub mod directory;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod query;
pub mod retry;
pub mod traits;

pub use config::ConnectionConfig;
pub use connection::{Cursor, DatabaseConnection, Projects, LOCATE_LEVELS};
pub use connector::UrlConnector;
pub use directory::{DirectoryConnector, DirectoryDocumentStore};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryConnector, InMemoryDocumentStore};
pub use mongo::{MongoConnector, MongoDocumentStore};
pub use query::{Filter, FindOptions, Namespace, Projection, Sort, SortOrder, Update};
pub use retry::RetryPolicy;
pub use traits::{DocumentStore, StoreConnector};
