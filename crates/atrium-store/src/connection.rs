//! The project-scoped database connection.
//!
//! A [`DatabaseConnection`] binds one store client to the session's active
//! project. It is lazily installed, survives transient disconnects by
//! retrying, and validates every document it inserts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use atrium_session::{keys, Environment, ProcessEnvironment, Session, SharedSession};
use atrium_types::{Document, DocumentId, DocumentType, SchemaValidator, StructuralValidator, VersionRef};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::connector::UrlConnector;
use crate::error::{StoreError, StoreResult};
use crate::query::{ensure_id, validate_name, Filter, FindOptions, Namespace, Projection, Sort, Update};
use crate::retry::RetryPolicy;
use crate::traits::{DocumentStore, StoreConnector};

/// Hierarchy levels addressed by [`DatabaseConnection::locate`].
pub const LOCATE_LEVELS: [&str; 5] = ["project", "asset", "subset", "version", "representation"];

struct Installed {
    store: Arc<dyn DocumentStore>,
    config: ConnectionConfig,
}

/// Lazily established, auto-reconnecting connection to a project database.
///
/// States: uninstalled until [`install`] succeeds, installed afterwards.
/// While installed the server may become unreachable; operations then
/// retry transient disconnects before giving up. [`uninstall`] always
/// returns to the uninstalled state.
///
/// All CRUD operations are scoped to the collection named by the session's
/// active project.
///
/// [`install`]: DatabaseConnection::install
/// [`uninstall`]: DatabaseConnection::uninstall
pub struct DatabaseConnection {
    id: Uuid,
    session: SharedSession,
    env: Arc<dyn Environment>,
    connector: Arc<dyn StoreConnector>,
    validator: Arc<dyn SchemaValidator>,
    retry: RetryPolicy,
    auto_install: bool,
    state: Mutex<Option<Installed>>,
}

impl DatabaseConnection {
    pub fn new(session: SharedSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            env: Arc::new(ProcessEnvironment),
            connector: Arc::new(UrlConnector::new()),
            validator: Arc::new(StructuralValidator),
            retry: RetryPolicy::default(),
            auto_install: false,
            state: Mutex::new(None),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn StoreConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Install transparently on first use instead of failing with
    /// `NotInstalled`.
    pub fn with_auto_install(mut self, auto_install: bool) -> Self {
        self.auto_install = auto_install;
        self
    }

    /// Instance id for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Where environment variables are read from.
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.env
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().expect("lock poisoned").is_some()
    }

    /// Settings of the live connection, if installed.
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.state
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|installed| installed.config.clone())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Connect to the configured store.
    ///
    /// Idempotent: an installed connection returns immediately without
    /// probing. With `update_from_environment`, context keys are re-read
    /// from the environment first.
    pub fn install(&self, update_from_environment: bool) -> StoreResult<()> {
        if update_from_environment {
            let context = Session::from_environment(self.env.as_ref(), false, true);
            self.session
                .write()
                .expect("session lock poisoned")
                .merge(&context);
        }

        let mut state = self.state.lock().expect("lock poisoned");
        if state.is_some() {
            debug!(connection = %self.id, "already installed");
            return Ok(());
        }

        let config = {
            let session = self.session.read().expect("session lock poisoned");
            ConnectionConfig::from_session(&session, self.retry.clone())?
        };
        let store = self.connector.connect(&config.url)?;
        self.probe(store.as_ref(), &config)?;

        info!(
            connection = %self.id,
            url = %config.url,
            database = %config.database,
            "database connection installed"
        );
        *state = Some(Installed { store, config });
        Ok(())
    }

    fn probe(&self, store: &dyn DocumentStore, config: &ConnectionConfig) -> StoreResult<()> {
        let started = Instant::now();
        let attempts = config.retry.install_attempts.max(1);
        let mut timeout = config.timeout;
        for attempt in 0..attempts {
            timeout = config.retry.probe_timeout(config.timeout, attempt);
            match store.ping(timeout) {
                Ok(()) => {
                    debug!(
                        url = %config.url,
                        attempt = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "store reachable"
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        url = %config.url,
                        attempt = attempt + 1,
                        timeout_ms = timeout.as_millis() as u64,
                        error = %err,
                        "store not reachable"
                    );
                    if attempt + 1 < attempts && !config.retry.install_delay.is_zero() {
                        thread::sleep(config.retry.install_delay);
                    }
                }
            }
        }
        Err(StoreError::ConnectionFailed {
            url: config.url.clone(),
            timeout,
            elapsed: started.elapsed(),
            attempts,
        })
    }

    /// Close the client. Safe to call when never installed.
    pub fn uninstall(&self) {
        if let Some(installed) = self.state.lock().expect("lock poisoned").take() {
            installed.store.close();
            info!(connection = %self.id, url = %installed.config.url, "database connection uninstalled");
        }
    }

    fn installed(&self, operation: &str) -> StoreResult<(Arc<dyn DocumentStore>, String)> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if let Some(installed) = state.as_ref() {
                return Ok((Arc::clone(&installed.store), installed.config.database.clone()));
            }
        }
        if !self.auto_install {
            return Err(StoreError::not_installed(operation));
        }
        debug!(connection = %self.id, operation, "auto-installing");
        self.install(false)?;
        let state = self.state.lock().expect("lock poisoned");
        state
            .as_ref()
            .map(|installed| (Arc::clone(&installed.store), installed.config.database.clone()))
            .ok_or_else(|| StoreError::not_installed(operation))
    }

    /// Name of the active project.
    pub fn active_project(&self) -> StoreResult<String> {
        self.installed("active_project")?;
        self.session
            .read()
            .expect("session lock poisoned")
            .non_empty(keys::PROJECT)
            .map(str::to_string)
            .ok_or(StoreError::NoActiveProject)
    }

    fn scoped(&self, operation: &str) -> StoreResult<(Arc<dyn DocumentStore>, Namespace)> {
        let (store, database) = self.installed(operation)?;
        let project = self.active_project()?;
        Ok((store, Namespace::checked(database, project)?))
    }

    fn validate(&self, document: &Document) -> StoreResult<()> {
        self.validator
            .validate(document.as_map())
            .map_err(|source| StoreError::SchemaValidation {
                id: document.id(),
                source,
            })
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    pub fn find(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Cursor> {
        let (store, ns) = self.scoped("find")?;
        let docs = self.retry.run("find", || store.find(&ns, filter, options))?;
        Ok(Cursor {
            inner: docs.into_iter(),
        })
    }

    pub fn find_one(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Option<Document>> {
        let options = options.clone().with_limit(1);
        Ok(self.find(filter, &options)?.next())
    }

    pub fn find_by_id(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        self.find_one(&Filter::by_id(id), &FindOptions::default())
    }

    /// Validate and insert one document, assigning an `_id` if missing.
    pub fn insert_one(&self, mut document: Document) -> StoreResult<DocumentId> {
        let (store, ns) = self.scoped("insert_one")?;
        let id = ensure_id(&mut document);
        self.validate(&document)?;
        let batch = vec![document];
        self.retry.run("insert_one", || store.insert(&ns, batch.clone()))?;
        debug!(ns = %ns, id = %id, "inserted document");
        Ok(id)
    }

    /// Validate every document, then insert them together. Nothing is
    /// written if any document fails validation.
    pub fn insert_many(&self, mut documents: Vec<Document>) -> StoreResult<Vec<DocumentId>> {
        let (store, ns) = self.scoped("insert_many")?;
        for document in &mut documents {
            ensure_id(document);
            self.validate(document)?;
        }
        self.retry
            .run("insert_many", || store.insert(&ns, documents.clone()))
    }

    pub fn replace_one(&self, filter: &Filter, replacement: Document) -> StoreResult<u64> {
        let (store, ns) = self.scoped("replace_one")?;
        self.retry
            .run("replace_one", || store.replace_one(&ns, filter, replacement.clone()))
    }

    pub fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let (store, ns) = self.scoped("update_many")?;
        self.retry
            .run("update_many", || store.update_many(&ns, filter, update))
    }

    pub fn distinct(&self, field: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let (store, ns) = self.scoped("distinct")?;
        self.retry.run("distinct", || store.distinct(&ns, field, filter))
    }

    pub fn delete_many(&self, filter: &Filter) -> StoreResult<u64> {
        let (store, ns) = self.scoped("delete_many")?;
        self.retry.run("delete_many", || store.delete_many(&ns, filter))
    }

    /// Drop the active project's collection.
    pub fn drop(&self) -> StoreResult<()> {
        let (store, ns) = self.scoped("drop")?;
        self.retry.run("drop", || store.drop_namespace(&ns))?;
        warn!(ns = %ns, "dropped project collection");
        Ok(())
    }

    /// Upsert by `_id`: replace the stored document when it exists,
    /// otherwise run a validated insert.
    pub fn save(&self, document: Document) -> StoreResult<DocumentId> {
        if let Some(id) = document.id() {
            if self.replace_one(&Filter::by_id(id), document.clone())? > 0 {
                return Ok(id);
            }
        }
        self.insert_one(document)
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Every project in the database, one per collection.
    ///
    /// System collections and collections without a project document are
    /// skipped. Project documents are fetched as the iterator advances.
    pub fn projects(&self) -> StoreResult<Projects> {
        let (store, database) = self.installed("projects")?;
        validate_name("database", &database)?;
        let names = self.retry.run("namespaces", || store.namespaces(&database))?;
        Ok(Projects {
            store,
            database,
            retry: self.retry.clone(),
            names: names.into_iter(),
        })
    }

    /// Replace a hero version's `data` with that of its target version.
    /// Other documents are left untouched.
    pub fn resolve_version_data(&self, document: &mut Document) -> StoreResult<()> {
        if document.doc_type() != Some(DocumentType::HeroVersion) {
            return Ok(());
        }
        let id = document.id();
        let Some(VersionRef::Hero { target }) = document.version_ref() else {
            return Err(StoreError::Integrity(format!(
                "hero version {} has no valid version_id",
                describe(id)
            )));
        };
        let target_doc = self.find_by_id(target)?.ok_or_else(|| {
            StoreError::Integrity(format!(
                "hero version {} points at missing version {target}",
                describe(id)
            ))
        })?;
        document.set_data(target_doc.get("data").cloned().unwrap_or(Value::Null));
        Ok(())
    }

    /// Ancestors of `document`, nearest parent first.
    ///
    /// Hero versions come back with their target's data. A dangling parent
    /// reference or a cycle is an integrity error.
    pub fn parenthood(&self, document: &Document) -> StoreResult<Vec<Document>> {
        let mut ancestors = Vec::new();
        let mut visited: HashSet<DocumentId> = document.id().into_iter().collect();
        let mut child = document.id();
        let mut next = document.parent();

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                return Err(StoreError::Integrity(format!(
                    "parent cycle detected at {parent_id}"
                )));
            }
            let mut parent = self.find_by_id(parent_id)?.ok_or_else(|| {
                StoreError::Integrity(format!(
                    "{} references missing parent {parent_id}",
                    describe(child)
                ))
            })?;
            self.resolve_version_data(&mut parent)?;
            child = Some(parent_id);
            next = parent.parent();
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// Resolve `[project, asset, subset, version, representation]` names
    /// top-down to the id of the last component.
    ///
    /// A version of `null` or `-1` selects the latest version. Returns
    /// `None` as soon as a level does not resolve. Shorter paths are
    /// allowed and resolve to the last given level.
    pub fn locate(&self, path: &[Value]) -> StoreResult<Option<DocumentId>> {
        if path.len() > LOCATE_LEVELS.len() {
            return Err(StoreError::InvalidQuery(format!(
                "locate takes at most {} components, got {}",
                LOCATE_LEVELS.len(),
                path.len()
            )));
        }

        let mut parent: Option<DocumentId> = None;
        for (level, component) in LOCATE_LEVELS.iter().zip(path) {
            let latest = *level == "version" && (component.is_null() || component.as_i64() == Some(-1));
            let mut filter = Filter::eq("type", *level).and("parent", parent.map_or(Value::Null, Value::from));
            let mut options = FindOptions::default().with_projection(Projection::include(["_id"]));
            if latest {
                options.sort = Sort::descending("name");
            } else {
                filter = filter.and("name", component.clone());
            }
            match self.find_one(&filter, &options)?.and_then(|doc| doc.id()) {
                Some(id) => parent = Some(id),
                None => return Ok(None),
            }
        }
        Ok(parent)
    }
}

fn describe(id: Option<DocumentId>) -> String {
    id.map_or_else(|| "<unsaved document>".to_string(), |id| id.to_hex())
}

/// Documents returned by [`DatabaseConnection::find`].
#[derive(Debug)]
pub struct Cursor {
    inner: std::vec::IntoIter<Document>,
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// Lazy iterator over project documents, see
/// [`DatabaseConnection::projects`].
pub struct Projects {
    store: Arc<dyn DocumentStore>,
    database: String,
    retry: RetryPolicy,
    names: std::vec::IntoIter<String>,
}

impl Iterator for Projects {
    type Item = StoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        for name in self.names.by_ref() {
            if Namespace::is_system(&name) {
                continue;
            }
            let ns = match Namespace::checked(self.database.clone(), name) {
                Ok(ns) => ns,
                Err(err) => {
                    warn!(error = %err, "skipping collection");
                    continue;
                }
            };
            let filter = Filter::eq("type", "project");
            let options = FindOptions::default().with_limit(1);
            let store = &self.store;
            match self.retry.run("projects", || store.find(&ns, &filter, &options)) {
                Ok(docs) => match docs.into_iter().next() {
                    Some(project) => return Some(Ok(project)),
                    None => debug!(ns = %ns, "collection has no project document"),
                },
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}
