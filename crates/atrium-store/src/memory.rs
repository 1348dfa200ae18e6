use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use atrium_types::{Document, DocumentId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::query::{execute, Filter, FindOptions, Namespace, Update};
use crate::traits::{DocumentStore, StoreConnector};

type Collection = Vec<Document>;

/// In-memory document store.
///
/// Intended for tests and embedding. Documents are kept per namespace in
/// insertion order behind a `RwLock` and cloned on read and write.
///
/// The store can simulate an unreliable server: [`set_reachable`] makes
/// every call fail with a transient error, and [`fail_next`] makes only the
/// next `n` calls fail.
///
/// [`set_reachable`]: InMemoryDocumentStore::set_reachable
/// [`fail_next`]: InMemoryDocumentStore::fail_next
pub struct InMemoryDocumentStore {
    databases: RwLock<BTreeMap<String, BTreeMap<String, Collection>>>,
    reachable: AtomicBool,
    pending_failures: AtomicU32,
    pings: AtomicU64,
    calls: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            pending_failures: AtomicU32::new(0),
            pings: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Toggle simulated reachability.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next `n` calls fail with `Disconnected`.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of reachability probes received.
    pub fn ping_count(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of data calls received, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of documents in one namespace.
    pub fn len(&self, ns: &Namespace) -> usize {
        self.databases
            .read()
            .expect("lock poisoned")
            .get(&ns.database)
            .and_then(|db| db.get(&ns.collection))
            .map_or(0, Vec::len)
    }

    /// Create an empty namespace, the way a server does on first write.
    pub fn create_namespace(&self, ns: &Namespace) {
        self.databases
            .write()
            .expect("lock poisoned")
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();
    }

    fn check(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate()
    }

    fn gate(&self) -> StoreResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Disconnected("server unreachable".into()));
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Disconnected("connection reset".into()));
        }
        Ok(())
    }

    fn with_collection<T>(&self, ns: &Namespace, f: impl FnOnce(&mut Collection) -> T) -> T {
        let mut dbs = self.databases.write().expect("lock poisoned");
        let collection = dbs
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();
        f(collection)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn ping(&self, _timeout: Duration) -> StoreResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.gate()
    }

    fn namespaces(&self, database: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let dbs = self.databases.read().expect("lock poisoned");
        Ok(dbs
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn find(&self, ns: &Namespace, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        self.check()?;
        let dbs = self.databases.read().expect("lock poisoned");
        let Some(docs) = dbs.get(&ns.database).and_then(|db| db.get(&ns.collection)) else {
            return Ok(Vec::new());
        };
        Ok(execute(docs, filter, options))
    }

    fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<DocumentId>> {
        self.check()?;
        self.with_collection(ns, |collection| {
            let mut seen: HashSet<DocumentId> = collection.iter().filter_map(Document::id).collect();
            let mut ids = Vec::with_capacity(documents.len());
            for doc in &documents {
                let id = doc
                    .id()
                    .ok_or_else(|| StoreError::InvalidQuery("document has no _id".into()))?;
                if !seen.insert(id) {
                    return Err(StoreError::DuplicateId(id));
                }
                ids.push(id);
            }
            collection.extend(documents);
            debug!(ns = %ns, count = ids.len(), "inserted documents");
            Ok(ids)
        })
    }

    fn replace_one(&self, ns: &Namespace, filter: &Filter, mut replacement: Document) -> StoreResult<u64> {
        self.check()?;
        self.with_collection(ns, |collection| {
            let Some(slot) = collection.iter_mut().find(|d| filter.matches(d)) else {
                return Ok(0);
            };
            if let Some(id) = slot.get("_id").cloned() {
                replacement.insert("_id", id);
            }
            *slot = replacement;
            Ok(1)
        })
    }

    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<u64> {
        self.check()?;
        self.with_collection(ns, |collection| {
            let mut modified = 0;
            for doc in collection.iter_mut().filter(|d| filter.matches(d)) {
                update.apply(doc);
                modified += 1;
            }
            Ok(modified)
        })
    }

    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<u64> {
        self.check()?;
        self.with_collection(ns, |collection| {
            let before = collection.len();
            collection.retain(|d| !filter.matches(d));
            Ok((before - collection.len()) as u64)
        })
    }

    fn drop_namespace(&self, ns: &Namespace) -> StoreResult<()> {
        self.check()?;
        let mut dbs = self.databases.write().expect("lock poisoned");
        if let Some(db) = dbs.get_mut(&ns.database) {
            db.remove(&ns.collection);
        }
        Ok(())
    }
}

/// Resolves `memory://<name>` URLs to shared in-memory stores.
///
/// The same name always yields the same store, so a test can keep a handle
/// to the store a connection will open.
#[derive(Default)]
pub struct InMemoryConnector {
    stores: RwLock<HashMap<String, Arc<InMemoryDocumentStore>>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register `store` under `name`.
    pub fn with_store(self, name: &str, store: Arc<InMemoryDocumentStore>) -> Self {
        self.stores
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), store);
        self
    }

    /// The store registered under `name`, created on first use.
    pub fn store(&self, name: &str) -> Arc<InMemoryDocumentStore> {
        let mut stores = self.stores.write().expect("lock poisoned");
        Arc::clone(stores.entry(name.to_string()).or_default())
    }
}

impl StoreConnector for InMemoryConnector {
    fn connect(&self, url: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        let name = url
            .strip_prefix("memory://")
            .ok_or_else(|| StoreError::UnsupportedScheme(url.to_string()))?;
        let name = name.trim_end_matches('/');
        let name = if name.is_empty() { "default" } else { name };
        let store: Arc<dyn DocumentStore> = self.store(name);
        Ok(store)
    }
}
