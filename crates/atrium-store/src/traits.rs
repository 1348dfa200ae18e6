use std::sync::Arc;
use std::time::Duration;

use atrium_types::{Document, DocumentId};
use serde_json::Value;

use crate::error::StoreResult;
use crate::query::{distinct_values, Filter, FindOptions, Namespace, Update};

/// The narrow document store contract the pipeline core relies on.
///
/// All implementations must satisfy these invariants:
/// - A namespace holds heterogeneous documents keyed by `_id`.
/// - `insert` never overwrites: an existing `_id` is a `DuplicateId` error.
/// - `replace_one` and `update_many` never change a document's `_id`.
/// - Transient connectivity problems surface as `StoreError::Disconnected`
///   so callers can retry them. Everything else is terminal.
pub trait DocumentStore: Send + Sync {
    /// Verify the server answers within `timeout`.
    fn ping(&self, timeout: Duration) -> StoreResult<()>;

    /// Collection names in `database`, including system namespaces.
    fn namespaces(&self, database: &str) -> StoreResult<Vec<String>>;

    fn find(&self, ns: &Namespace, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// Insert documents that already carry an `_id`.
    fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<DocumentId>>;

    /// Replace the first match. Returns the number of documents replaced.
    fn replace_one(&self, ns: &Namespace, filter: &Filter, replacement: Document) -> StoreResult<u64>;

    /// Returns the number of documents modified.
    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<u64>;

    /// Returns the number of documents deleted.
    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<u64>;

    /// Remove the namespace and everything in it. Dropping a missing
    /// namespace is not an error.
    fn drop_namespace(&self, ns: &Namespace) -> StoreResult<()>;

    /// Unique values of `field` among matching documents.
    ///
    /// Default implementation runs `find()` and collects locally.
    fn distinct(&self, ns: &Namespace, field: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let docs = self.find(ns, filter, &FindOptions::default())?;
        Ok(distinct_values(&docs, field))
    }

    /// Release client resources. Default is a no-op.
    fn close(&self) {}
}

/// Opens a [`DocumentStore`] for a connection URL.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, url: &str) -> StoreResult<Arc<dyn DocumentStore>>;
}
