use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atrium_types::{Document, DocumentId};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::query::{execute, validate_name, Filter, FindOptions, Namespace, Update};
use crate::traits::{DocumentStore, StoreConnector};

/// Document store kept in a directory tree.
///
/// Layout: `<root>/<database>/<collection>/<id>.json`, one pretty-printed
/// JSON file per document. Useful for small studios, fixtures and offline
/// inspection. Writes go to a temporary file first and are renamed into
/// place. A single mutex serializes writers inside this process; concurrent
/// writers from other processes are not coordinated.
pub struct DirectoryDocumentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryDocumentStore {
    /// Open a store rooted at `root`. The directory is not created; a
    /// missing root makes `ping` fail.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store and create its root directory.
    pub fn create(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::open(root);
        fs::create_dir_all(&store.root)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, ns: &Namespace) -> StoreResult<PathBuf> {
        validate_name("database", &ns.database)?;
        validate_name("collection", &ns.collection)?;
        Ok(self.root.join(&ns.database).join(&ns.collection))
    }

    fn document_path(&self, ns: &Namespace, id: DocumentId) -> StoreResult<PathBuf> {
        Ok(self.collection_dir(ns)?.join(format!("{}.json", id.to_hex())))
    }

    fn reachable(&self) -> StoreResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Disconnected(format!(
                "store root {} is not reachable",
                self.root.display()
            )))
        }
    }

    /// Read every document of a namespace in file-name order.
    fn load(&self, ns: &Namespace) -> StoreResult<Vec<(PathBuf, Document)>> {
        self.reachable()?;
        let dir = self.collection_dir(ns)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(path)?;
            match serde_json::from_slice::<Document>(&bytes) {
                Ok(doc) => out.push((path.to_path_buf(), doc)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable document file");
                }
            }
        }
        Ok(out)
    }

    fn write(&self, path: &Path, document: &Document) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl DocumentStore for DirectoryDocumentStore {
    fn ping(&self, _timeout: Duration) -> StoreResult<()> {
        self.reachable()
    }

    fn namespaces(&self, database: &str) -> StoreResult<Vec<String>> {
        self.reachable()?;
        validate_name("database", database)?;
        let dir = self.root.join(database);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if entry.file_type().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn find(&self, ns: &Namespace, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let docs: Vec<Document> = self.load(ns)?.into_iter().map(|(_, doc)| doc).collect();
        Ok(execute(&docs, filter, options))
    }

    fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<DocumentId>> {
        self.reachable()?;
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut ids = Vec::with_capacity(documents.len());
        for doc in &documents {
            let id = doc
                .id()
                .ok_or_else(|| StoreError::InvalidQuery("document has no _id".into()))?;
            if ids.contains(&id) || self.document_path(ns, id)?.exists() {
                return Err(StoreError::DuplicateId(id));
            }
            ids.push(id);
        }
        for (doc, id) in documents.iter().zip(&ids) {
            self.write(&self.document_path(ns, *id)?, doc)?;
        }
        debug!(ns = %ns, count = ids.len(), root = %self.root.display(), "inserted documents");
        Ok(ids)
    }

    fn replace_one(&self, ns: &Namespace, filter: &Filter, mut replacement: Document) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let Some((path, current)) = self.load(ns)?.into_iter().find(|(_, d)| filter.matches(d)) else {
            return Ok(0);
        };
        if let Some(id) = current.get("_id").cloned() {
            replacement.insert("_id", id);
        }
        self.write(&path, &replacement)?;
        Ok(1)
    }

    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut modified = 0;
        for (path, mut doc) in self.load(ns)? {
            if filter.matches(&doc) {
                update.apply(&mut doc);
                self.write(&path, &doc)?;
                modified += 1;
            }
        }
        Ok(modified)
    }

    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut deleted = 0;
        for (path, doc) in self.load(ns)? {
            if filter.matches(&doc) {
                fs::remove_file(&path)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn drop_namespace(&self, ns: &Namespace) -> StoreResult<()> {
        self.reachable()?;
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let dir = self.collection_dir(ns)?;
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Resolves `file:///<root>` URLs to [`DirectoryDocumentStore`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryConnector;

impl StoreConnector for DirectoryConnector {
    fn connect(&self, url: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| StoreError::UnsupportedScheme(url.to_string()))?;
        if path.is_empty() {
            return Err(StoreError::InvalidUrl(url.to_string()));
        }
        Ok(Arc::new(DirectoryDocumentStore::open(path)))
    }
}
