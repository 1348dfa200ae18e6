use std::path::Path;
use std::sync::{Arc, Mutex};

use atrium_paths::{get_representation_path, normalize_path_str};
use atrium_plugins::{
    is_compatible_loader, BinaryThumbnail, Category, Creator, CreatorInstance, Loader, PluginClass,
    PluginRegistry, RepresentationContext, TemplateThumbnail,
};
use atrium_session::{keys, Environment, ProcessEnvironment, Session, SharedSession};
use atrium_store::{DatabaseConnection, Filter, FindOptions, RetryPolicy, Sort, StoreConnector};
use atrium_types::{Container, Document, DocumentId, VersionSelector};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigCatalog, HostHooks, SiteConfig};
use crate::error::{HostError, HostResult};
use crate::events::EventBus;
use crate::host::{DefaultHost, Host};
use crate::task::{compute_session_changes, SessionChanges};

/// Whether `update` and `switch` insist on the target file existing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExistencePolicy {
    /// Hand the representation to the loader as is.
    #[default]
    Skip,
    /// Fail with `RepresentationMissing` when no file resolves on disk.
    Require,
}

/// A representation given by id or as a fetched document.
#[derive(Clone, Debug, PartialEq)]
pub enum RepresentationRef {
    Id(DocumentId),
    Document(Document),
}

impl From<DocumentId> for RepresentationRef {
    fn from(id: DocumentId) -> Self {
        Self::Id(id)
    }
}

impl From<Document> for RepresentationRef {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

impl From<&Document> for RepresentationRef {
    fn from(document: &Document) -> Self {
        Self::Document(document.clone())
    }
}

#[derive(Default)]
struct HostState {
    installed: bool,
    host: Option<Arc<dyn Host>>,
    config: Option<Arc<dyn SiteConfig>>,
    config_host: Option<Arc<dyn HostHooks>>,
    root: Option<String>,
}

/// Everything a host integration needs, owned in one place: the session,
/// the project database connection, the plugin registry and the event bus.
///
/// ```text
/// uninstalled --install(host)--> installed --uninstall()--> uninstalled
/// ```
///
/// Installing twice is a no-op, as is uninstalling an uninstalled context.
pub struct HostContext {
    id: Uuid,
    session: SharedSession,
    env: Arc<dyn Environment>,
    dbcon: DatabaseConnection,
    registry: PluginRegistry,
    catalog: ConfigCatalog,
    events: EventBus,
    existence: ExistencePolicy,
    default_plugins: [PluginClass; 2],
    state: Mutex<HostState>,
}

impl HostContext {
    pub fn new(session: Session) -> Self {
        let session = session.into_shared();
        Self {
            id: Uuid::new_v4(),
            dbcon: DatabaseConnection::new(Arc::clone(&session)),
            session,
            env: Arc::new(ProcessEnvironment),
            registry: PluginRegistry::new(),
            catalog: ConfigCatalog::new(),
            events: EventBus::new(),
            existence: ExistencePolicy::default(),
            default_plugins: [
                PluginClass::ThumbnailResolver(Arc::new(BinaryThumbnail)),
                PluginClass::ThumbnailResolver(Arc::new(TemplateThumbnail)),
            ],
            state: Mutex::new(HostState::default()),
        }
    }

    /// A context whose session is read from `env`. Context keys are only
    /// read with `include_context`.
    pub fn from_environment(env: Arc<dyn Environment>, include_context: bool) -> Self {
        let session = Session::from_environment(env.as_ref(), true, include_context);
        Self::new(session).with_environment(env)
    }

    /// Environment mirrored by session changes. Also used by the database
    /// connection.
    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.dbcon = self.dbcon.with_environment(Arc::clone(&env));
        self.env = env;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn StoreConnector>) -> Self {
        self.dbcon = self.dbcon.with_connector(connector);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.dbcon = self.dbcon.with_retry_policy(retry);
        self
    }

    pub fn with_catalog(mut self, catalog: ConfigCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_existence_policy(mut self, policy: ExistencePolicy) -> Self {
        self.existence = policy;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// A copy of the current session.
    pub fn session_snapshot(&self) -> Session {
        self.session.read().expect("session lock poisoned").clone()
    }

    pub fn dbcon(&self) -> &DatabaseConnection {
        &self.dbcon
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn catalog(&self) -> &ConfigCatalog {
        &self.catalog
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().expect("state lock poisoned").installed
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Install `host`: connect the database, run the host, host module and
    /// site config install hooks, and register the default thumbnail
    /// resolvers.
    pub fn install(&self, host: Arc<dyn Host>) -> HostResult<()> {
        if self.is_installed() {
            debug!(context = %self.id, "already installed");
            return Ok(());
        }
        let host_name = host.name().to_string();
        self.events.emit("before_install", &json!({ "host": host_name }));

        let session = self.session_snapshot();
        if let Err(err) = session.validate() {
            warn!(error = %err, "session does not validate");
        }

        self.dbcon.install(false)?;

        let missing = session.missing(&[keys::PROJECT, keys::ASSET]);
        if !missing.is_empty() {
            warn!(missing = ?missing, "missing session keys on install");
        }
        if let Some(project) = session.non_empty(keys::PROJECT) {
            info!(project, "active project");
        }

        let (config, config_host) = match self.run_install_hooks(&session, &host) {
            Ok(installed) => installed,
            Err(err) => {
                self.dbcon.uninstall();
                return Err(err);
            }
        };

        {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.installed = true;
            state.host = Some(host);
            state.config = Some(config);
            state.config_host = config_host;
        }
        info!(context = %self.id, host = %host_name, "installed");
        self.events.emit("after_install", &json!({ "host": host_name }));
        Ok(())
    }

    fn run_install_hooks(
        &self,
        session: &Session,
        host: &Arc<dyn Host>,
    ) -> HostResult<(Arc<dyn SiteConfig>, Option<Arc<dyn HostHooks>>)> {
        let config_name = session.non_empty(keys::CONFIG).ok_or_else(|| {
            HostError::Configuration(format!("{} is not set, no site config to install", keys::CONFIG))
        })?;
        let config = self
            .catalog
            .config(config_name)
            .ok_or_else(|| HostError::UnknownConfig(config_name.to_string()))?;
        info!(config = config_name, "found site config");

        host.install().map_err(|err| HostError::hook("host install", err))?;

        let config_host = match self.catalog.find_submodule(config_name, host.name()) {
            Some((module, hooks)) => {
                info!(module = %module, "installing host module");
                hooks
                    .install()
                    .map_err(|err| HostError::hook(&format!("{module} install"), err))?;
                Some(hooks)
            }
            None => {
                warn!(config = config_name, host = host.name(), "site config has no host module");
                None
            }
        };

        for plugin in &self.default_plugins {
            self.registry.register_plugin(plugin.clone());
        }

        config
            .install()
            .map_err(|err| HostError::hook("config install", err))?;
        Ok((config, config_host))
    }

    /// Undo [`install`](Self::install) in reverse order. Hook failures are
    /// logged and teardown continues.
    pub fn uninstall(&self) {
        let (host, config, config_host) = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if !state.installed {
                debug!(context = %self.id, "not installed");
                return;
            }
            state.installed = false;
            (state.host.take(), state.config.take(), state.config_host.take())
        };
        let host_name = host.as_ref().map(|h| h.name().to_string()).unwrap_or_default();
        self.events.emit("before_uninstall", &json!({ "host": host_name }));

        if let Some(hooks) = config_host {
            if let Err(err) = hooks.uninstall() {
                error!(error = %format!("{err:#}"), "host module uninstall failed");
            }
        }
        if let Some(host) = &host {
            if let Err(err) = host.uninstall() {
                error!(host = host.name(), error = %format!("{err:#}"), "host uninstall failed");
            }
        }
        if let Some(config) = config {
            if let Err(err) = config.uninstall() {
                error!(error = %format!("{err:#}"), "config uninstall failed");
            }
        }

        self.dbcon.uninstall();
        info!(context = %self.id, host = %host_name, "uninstalled");
        self.events.emit("after_uninstall", &json!({ "host": host_name }));
    }

    /// The installed host, or [`DefaultHost`].
    pub fn registered_host(&self) -> Arc<dyn Host> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .host
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultHost))
    }

    pub fn registered_config(&self) -> Option<Arc<dyn SiteConfig>> {
        self.state.lock().expect("state lock poisoned").config.clone()
    }

    /// Containers in the host's scene.
    pub fn ls(&self) -> Vec<Container> {
        self.registered_host().ls()
    }

    pub fn register_root(&self, root: impl Into<String>) {
        let root = root.into();
        info!(root = %root, "registering root");
        self.state.lock().expect("state lock poisoned").root = Some(root);
    }

    /// The registered root, else the session's `ATRIUM_PROJECTS`.
    pub fn registered_root(&self) -> Option<String> {
        let registered = self.state.lock().expect("state lock poisoned").root.clone();
        registered.or_else(|| {
            self.session
                .read()
                .expect("session lock poisoned")
                .non_empty(keys::PROJECTS)
                .map(normalize_path_str)
        })
    }

    pub fn discover(&self, category: Category) -> Vec<PluginClass> {
        self.registry.discover(category)
    }

    // -----------------------------------------------------------------------
    // Representations
    // -----------------------------------------------------------------------

    /// A representation with its version, subset, asset and project.
    pub fn get_representation_context(
        &self,
        representation: impl Into<RepresentationRef>,
    ) -> HostResult<RepresentationContext> {
        let representation = match representation.into() {
            RepresentationRef::Id(id) => self
                .dbcon
                .find_by_id(id)?
                .ok_or_else(|| HostError::Integrity(format!("representation {id} does not exist")))?,
            RepresentationRef::Document(document) => document,
        };
        let parents = self.dbcon.parenthood(&representation)?;
        let [version, subset, asset, project]: [Document; 4] = parents.try_into().map_err(|parents: Vec<Document>| {
            HostError::Integrity(format!(
                "representation {} has {} ancestors, expected 4",
                describe(&representation),
                parents.len()
            ))
        })?;
        Ok(RepresentationContext {
            project,
            asset,
            subset,
            version,
            representation,
        })
    }

    fn check_exists(&self, representation: &Document) -> HostResult<()> {
        if self.existence == ExistencePolicy::Skip {
            return Ok(());
        }
        let root = self.registered_root();
        match get_representation_path(representation, root.as_deref(), &self.dbcon) {
            Some(path) if Path::new(&path).exists() => Ok(()),
            _ => Err(HostError::RepresentationMissing(describe(representation))),
        }
    }

    // -----------------------------------------------------------------------
    // Plugins
    // -----------------------------------------------------------------------

    /// Run `creator` for a new instance, inside the host's selection guard
    /// when the creator asks for it.
    pub fn create(
        &self,
        creator: &Arc<dyn Creator>,
        name: &str,
        asset: &str,
        family: &str,
        options: Map<String, Value>,
        data: Map<String, Value>,
    ) -> HostResult<Value> {
        let mut instance = CreatorInstance::new(name, asset, family, options, data);
        let marker = self
            .session
            .read()
            .expect("session lock poisoned")
            .non_empty(keys::INSTANCE_ID)
            .map(str::to_string);
        if let Some(marker) = marker {
            instance = instance.with_marker(&marker);
        }

        info!(creator = creator.name(), subset = name, "creating instance");
        let host = self.registered_host();
        let result = if creator.maintain_selection() {
            let mut outcome = None;
            host.maintained_selection(&mut || outcome = Some(creator.process(&instance)));
            outcome.unwrap_or_else(|| {
                Err(anyhow::anyhow!("host '{}' never ran the creator", host.name()))
            })
        } else {
            creator.process(&instance)
        };
        result.map_err(|err| HostError::plugin(creator.name(), err))
    }

    /// Run every discovered creator of `family`. Failures are logged; the
    /// last created instance is returned.
    pub fn create_all(
        &self,
        name: &str,
        asset: &str,
        family: &str,
        options: Map<String, Value>,
        data: Map<String, Value>,
    ) -> HostResult<Value> {
        let mut last = None;
        for creator in self.registry.creators() {
            if creator.family() != family {
                continue;
            }
            match self.create(&creator, name, asset, family, options.clone(), data.clone()) {
                Ok(instance) => last = Some(instance),
                Err(err) => error!(creator = creator.name(), error = %err, "creator failed"),
            }
        }
        last.ok_or_else(|| HostError::NoCreatorsRan {
            family: family.to_string(),
        })
    }

    /// Load a representation with `loader`. `name` defaults to the subset
    /// name.
    pub fn load(
        &self,
        loader: &Arc<dyn Loader>,
        representation: impl Into<RepresentationRef>,
        namespace: Option<&str>,
        name: Option<&str>,
        options: Map<String, Value>,
    ) -> HostResult<Value> {
        let context = self.get_representation_context(representation)?;
        let subset_name = context.subset.name().unwrap_or_default().to_string();
        if !is_compatible_loader(loader.as_ref(), &context) {
            return Err(HostError::IncompatibleLoader {
                loader: loader.name().to_string(),
                subset: subset_name,
            });
        }
        let name = name.unwrap_or(&subset_name);
        info!(
            loader = loader.name(),
            asset = context.asset.name().unwrap_or_default(),
            "loading"
        );
        loader
            .load(&context, name, namespace, &options)
            .map_err(|err| HostError::plugin(loader.name(), err))
    }

    fn container_loader(&self, container: &Container) -> HostResult<Arc<dyn Loader>> {
        self.registry
            .loaders()
            .into_iter()
            .find(|loader| loader.name() == container.loader)
            .ok_or_else(|| HostError::LoaderNotFound(container.loader.clone()))
    }

    /// Move `container` to another version of its subset, keeping the
    /// representation name. Returns the new representation.
    pub fn update(&self, container: &Container, version: VersionSelector) -> HostResult<Document> {
        let current = self.dbcon.find_by_id(container.representation)?.ok_or_else(|| {
            HostError::Integrity(format!(
                "container '{}' points at missing representation {}",
                container.name, container.representation
            ))
        })?;
        let parents = self.dbcon.parenthood(&current)?;
        let subset_id = parents.get(1).and_then(Document::id).ok_or_else(|| {
            HostError::Integrity(format!("representation {} has no subset", describe(&current)))
        })?;

        let versions = Filter::eq("parent", subset_id);
        let new_version = match version {
            VersionSelector::Latest => self.dbcon.find_one(
                &versions.and("type", "version"),
                &FindOptions::sorted(Sort::descending("name")),
            )?,
            VersionSelector::Number(number) => self.dbcon.find_one(
                &versions.and("type", "version").and("name", number),
                &FindOptions::default(),
            )?,
            VersionSelector::Hero => self.dbcon.find_one(
                &versions.and("type", json!({ "$in": ["hero_version", "master_version"] })),
                &FindOptions::default(),
            )?,
        }
        .ok_or_else(|| {
            HostError::Integrity(format!("subset {subset_id} has no version matching {version:?}"))
        })?;
        let version_id = new_version
            .id()
            .ok_or_else(|| HostError::Integrity("version document without _id".into()))?;

        let rep_name = current.name_value().cloned().unwrap_or(Value::Null);
        let new_representation = self
            .dbcon
            .find_one(
                &Filter::eq("type", "representation")
                    .and("parent", version_id)
                    .and("name", rep_name),
                &FindOptions::default(),
            )?
            .ok_or_else(|| {
                HostError::Integrity(format!(
                    "version {version_id} has no '{}' representation",
                    current.name().unwrap_or_default()
                ))
            })?;

        self.check_exists(&new_representation)?;
        let loader = self.container_loader(container)?;
        loader
            .update(container, &new_representation)
            .map_err(|err| HostError::plugin(loader.name(), err))?;
        Ok(new_representation)
    }

    /// Point `container` at the representation `representation`. The
    /// container's loader must support switching.
    pub fn switch(&self, container: &Container, representation: DocumentId) -> HostResult<Document> {
        let loader = self.container_loader(container)?;
        if !loader.supports_switch() {
            return Err(HostError::Unsupported {
                loader: loader.label().unwrap_or_else(|| loader.name().to_string()),
                operation: "switch".into(),
            });
        }

        let new_representation = self
            .dbcon
            .find_one(
                &Filter::by_id(representation).and("type", "representation"),
                &FindOptions::default(),
            )?
            .ok_or_else(|| HostError::Integrity(format!("representation {representation} does not exist")))?;
        let context = self.get_representation_context(&new_representation)?;
        if !is_compatible_loader(loader.as_ref(), &context) {
            return Err(HostError::IncompatibleLoader {
                loader: loader.name().to_string(),
                subset: context.subset.name().unwrap_or_default().to_string(),
            });
        }

        self.check_exists(&new_representation)?;
        loader
            .switch(container, &new_representation)
            .map_err(|err| HostError::plugin(loader.name(), err))?;
        Ok(new_representation)
    }

    /// Remove `container` through the loader that created it.
    pub fn remove(&self, container: &Container) -> HostResult<bool> {
        let loader = self.container_loader(container)?;
        loader
            .remove(container)
            .map_err(|err| HostError::plugin(loader.name(), err))
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Move the session to another task, asset or application. Changed keys
    /// are mirrored into the environment and announced as `taskChanged`.
    pub fn update_current_task(
        &self,
        task: Option<&str>,
        asset: Option<&str>,
        app: Option<&str>,
    ) -> HostResult<SessionChanges> {
        let session = self.session_snapshot();
        let root = self.registered_root();
        let changes = compute_session_changes(
            &session,
            &self.dbcon,
            self.env.as_ref(),
            root.as_deref(),
            task,
            asset,
            app,
        )?;
        if changes.is_empty() {
            return Ok(changes);
        }

        self.session
            .write()
            .expect("session lock poisoned")
            .update(changes.clone(), self.env.as_ref());

        let payload: Map<String, Value> = changes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().map_or(Value::Null, Value::from)))
            .collect();
        self.events.emit("taskChanged", &Value::Object(payload));
        Ok(changes)
    }

    // -----------------------------------------------------------------------
    // Thumbnails
    // -----------------------------------------------------------------------

    /// Bytes of the thumbnail `entity`, from the first resolver (lowest
    /// priority first) that serves `thumbnail_type` and returns data.
    pub fn get_thumbnail_binary(&self, entity: &Document, thumbnail_type: &str) -> Option<Vec<u8>> {
        let mut resolvers = self.registry.thumbnail_resolvers();
        resolvers.sort_by_key(|resolver| resolver.priority());
        let session = self.session_snapshot();

        for resolver in resolvers.iter().filter(|r| r.accepts(thumbnail_type)) {
            match resolver.process(entity, thumbnail_type, &session) {
                Ok(Some(bytes)) if !bytes.is_empty() => return Some(bytes),
                Ok(_) => {}
                Err(err) => {
                    error!(resolver = resolver.name(), error = %format!("{err:#}"), "thumbnail resolver failed");
                }
            }
        }
        None
    }
}

fn describe(document: &Document) -> String {
    document
        .id()
        .map_or_else(|| "<unsaved>".to_string(), |id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_plugins::ThumbnailResolver;
    use atrium_session::MapEnvironment;
    use atrium_store::{InMemoryConnector, InMemoryDocumentStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    // ----- fixtures -----

    struct RecordingHost {
        log: Log,
        containers: Vec<Container>,
    }

    impl Host for RecordingHost {
        fn name(&self) -> &str {
            "maya"
        }

        fn ls(&self) -> Vec<Container> {
            self.containers.clone()
        }

        fn install(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("host.install".into());
            Ok(())
        }

        fn uninstall(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("host.uninstall".into());
            Ok(())
        }

        fn maintained_selection(&self, body: &mut dyn FnMut()) {
            self.log.lock().unwrap().push("select.save".into());
            body();
            self.log.lock().unwrap().push("select.restore".into());
        }
    }

    struct RecordingConfig {
        log: Log,
        fail_install: bool,
    }

    impl SiteConfig for RecordingConfig {
        fn install(&self) -> anyhow::Result<()> {
            if self.fail_install {
                anyhow::bail!("site config refused");
            }
            self.log.lock().unwrap().push("config.install".into());
            Ok(())
        }

        fn uninstall(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("config.uninstall".into());
            anyhow::bail!("teardown hiccup")
        }
    }

    struct RecordingHooks {
        log: Log,
    }

    impl HostHooks for RecordingHooks {
        fn install(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("hooks.install".into());
            Ok(())
        }

        fn uninstall(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("hooks.uninstall".into());
            Ok(())
        }
    }

    struct RecordingLoader {
        name: &'static str,
        switchable: bool,
        log: Log,
    }

    impl Loader for RecordingLoader {
        fn name(&self) -> &str {
            self.name
        }

        fn families(&self) -> Vec<String> {
            vec!["model".into()]
        }

        fn representations(&self) -> Vec<String> {
            vec!["ma".into()]
        }

        fn label(&self) -> Option<String> {
            Some(format!("{} (label)", self.name))
        }

        fn load(
            &self,
            context: &RepresentationContext,
            name: &str,
            namespace: Option<&str>,
            _options: &Map<String, Value>,
        ) -> anyhow::Result<Value> {
            Ok(json!({
                "name": name,
                "namespace": namespace,
                "version": context.version.name_value(),
            }))
        }

        fn update(&self, container: &Container, representation: &Document) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("update {} -> {}", container.name, describe(representation)));
            Ok(())
        }

        fn remove(&self, container: &Container) -> anyhow::Result<bool> {
            self.log.lock().unwrap().push(format!("remove {}", container.name));
            Ok(true)
        }

        fn supports_switch(&self) -> bool {
            self.switchable
        }

        fn switch(&self, container: &Container, representation: &Document) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("switch {} -> {}", container.name, describe(representation)));
            Ok(())
        }
    }

    struct ModelCreator {
        name: &'static str,
        fails: bool,
        log: Log,
    }

    impl Creator for ModelCreator {
        fn name(&self) -> &str {
            self.name
        }

        fn family(&self) -> &str {
            "model"
        }

        fn process(&self, instance: &CreatorInstance) -> anyhow::Result<Value> {
            self.log.lock().unwrap().push(format!("{}.process", self.name));
            if self.fails {
                anyhow::bail!("nothing selected");
            }
            Ok(Value::Object(instance.data().clone()))
        }
    }

    struct StaticThumbnail;

    impl ThumbnailResolver for StaticThumbnail {
        fn name(&self) -> &str {
            "StaticThumbnail"
        }

        fn priority(&self) -> i64 {
            10
        }

        fn thumbnail_types(&self) -> Vec<String> {
            vec!["thumbnail".into()]
        }

        fn process(&self, _: &Document, _: &str, _: &Session) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(Some(b"static".to_vec()))
        }
    }

    fn session() -> Session {
        [
            (keys::DB_URL, "memory://studio"),
            (keys::DB, "avalon"),
            (keys::PROJECT, "hulk"),
            (keys::PROJECTS, "/projects"),
            (keys::CONFIG, "studio"),
            (keys::TIMEOUT, "50"),
            (keys::USER, "bruce"),
        ]
        .into_iter()
        .collect()
    }

    struct Fixture {
        context: HostContext,
        env: Arc<MapEnvironment>,
        log: Log,
    }

    fn fixture_with(session: Session, fail_config: bool) -> Fixture {
        let log: Log = Arc::default();
        let env = Arc::new(MapEnvironment::new());
        let store = Arc::new(InMemoryDocumentStore::new());
        let catalog = ConfigCatalog::new()
            .with_config(
                "studio",
                Arc::new(RecordingConfig {
                    log: Arc::clone(&log),
                    fail_install: fail_config,
                }),
            )
            .with_host_module("studio.hosts.maya", Arc::new(RecordingHooks { log: Arc::clone(&log) }));
        let context = HostContext::new(session)
            .with_environment(Arc::clone(&env) as Arc<dyn Environment>)
            .with_connector(Arc::new(InMemoryConnector::new().with_store("studio", store)))
            .with_retry_policy(RetryPolicy::immediate())
            .with_catalog(catalog);
        Fixture { context, env, log }
    }

    fn fixture() -> Fixture {
        fixture_with(session(), false)
    }

    fn host(log: &Log) -> Arc<dyn Host> {
        Arc::new(RecordingHost {
            log: Arc::clone(log),
            containers: Vec::new(),
        })
    }

    fn installed() -> Fixture {
        let fixture = fixture();
        fixture.context.install(host(&fixture.log)).unwrap();
        fixture.log.lock().unwrap().clear();
        fixture
    }

    struct Chain {
        versions: Vec<Document>,
        hero: Document,
        representations: Vec<Document>,
        hero_representation: Document,
    }

    fn seed(context: &HostContext) -> Chain {
        let project = Document::project("hulk").with("data", json!({"code": "hlk"}));
        let asset = Document::asset("bruce", project.id().unwrap())
            .with_data(json!({"parents": ["characters"]}))
            .with("silo", "assets");
        let subset = Document::subset("modelDefault", asset.id().unwrap())
            .with_data(json!({"families": ["model"]}));
        let versions: Vec<Document> = (1..=3)
            .map(|n| Document::version(n, subset.id().unwrap()).with_data(json!({"comment": format!("v{n}")})))
            .collect();
        let hero = Document::hero_version(subset.id().unwrap(), versions[1].id().unwrap());
        let representations: Vec<Document> = versions
            .iter()
            .map(|v| Document::representation("ma", v.id().unwrap()))
            .collect();
        let hero_representation = Document::representation("ma", hero.id().unwrap());

        let mut documents = vec![project, asset, subset, hero.clone(), hero_representation.clone()];
        documents.extend(versions.iter().cloned());
        documents.extend(representations.iter().cloned());
        context.dbcon().insert_many(documents).unwrap();

        Chain {
            versions,
            hero,
            representations,
            hero_representation,
        }
    }

    fn register_loader(context: &HostContext, log: &Log, switchable: bool) -> Arc<dyn Loader> {
        let loader: Arc<dyn Loader> = Arc::new(RecordingLoader {
            name: "ModelLoader",
            switchable,
            log: Arc::clone(log),
        });
        context.registry().register_plugin(PluginClass::Loader(Arc::clone(&loader)));
        loader
    }

    fn container_for(representation: &Document) -> Container {
        Container::new("bruce_01", "ModelLoader", representation.id().unwrap()).with_object_name("bruce_01_CON")
    }

    // ----- lifecycle -----

    #[test]
    fn install_runs_hooks_in_order() {
        let fixture = fixture();
        fixture.context.install(host(&fixture.log)).unwrap();

        assert!(fixture.context.is_installed());
        assert!(fixture.context.dbcon().is_installed());
        assert_eq!(entries(&fixture.log), ["host.install", "hooks.install", "config.install"]);
        assert_eq!(fixture.context.registered_host().name(), "maya");
        assert!(fixture.context.registered_config().is_some());
    }

    #[test]
    fn install_twice_is_a_noop() {
        let fixture = installed();
        fixture.context.install(host(&fixture.log)).unwrap();
        assert!(entries(&fixture.log).is_empty());
    }

    #[test]
    fn uninstall_reverses_install_and_survives_hook_errors() {
        let fixture = installed();
        fixture.context.uninstall();

        assert_eq!(
            entries(&fixture.log),
            ["hooks.uninstall", "host.uninstall", "config.uninstall"]
        );
        assert!(!fixture.context.is_installed());
        assert!(!fixture.context.dbcon().is_installed());
        assert_eq!(fixture.context.registered_host().name(), "default");

        fixture.context.uninstall();
        assert_eq!(entries(&fixture.log).len(), 3);
    }

    #[test]
    fn install_requires_a_config() {
        let mut session = session();
        session.remove(keys::CONFIG);
        let fixture = fixture_with(session, false);

        let err = fixture.context.install(host(&fixture.log)).unwrap_err();
        assert!(matches!(err, HostError::Configuration(_)));
        assert!(!fixture.context.is_installed());
        assert!(!fixture.context.dbcon().is_installed());
        assert!(entries(&fixture.log).is_empty());
    }

    #[test]
    fn install_rejects_unknown_config() {
        let mut session = session();
        session.set(keys::CONFIG, "elsewhere");
        let fixture = fixture_with(session, false);

        let err = fixture.context.install(host(&fixture.log)).unwrap_err();
        assert!(matches!(err, HostError::UnknownConfig(name) if name == "elsewhere"));
    }

    #[test]
    fn failing_config_install_rolls_back() {
        let fixture = fixture_with(session(), true);
        let err = fixture.context.install(host(&fixture.log)).unwrap_err();

        assert!(matches!(err, HostError::Hook { .. }));
        assert!(!fixture.context.is_installed());
        assert!(!fixture.context.dbcon().is_installed());
    }

    #[test]
    fn default_resolvers_register_once() {
        let fixture = installed();
        fixture.context.uninstall();
        fixture.context.install(host(&fixture.log)).unwrap();

        let resolvers = fixture.context.registry().registered_plugins(Category::ThumbnailResolver);
        assert_eq!(resolvers.len(), 2);
    }

    #[test]
    fn install_emits_events() {
        let fixture = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        let before_count = Arc::clone(&seen);
        let after_seen: Log = Arc::default();
        let after_sink = Arc::clone(&after_seen);
        let _before = fixture.context.events().before("install", move |_| {
            before_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let _after = fixture.context.events().after("install", move |args| {
            after_sink.lock().unwrap().push(args["host"].as_str().unwrap_or_default().to_string());
            Ok(())
        });

        fixture.context.install(host(&fixture.log)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(entries(&after_seen), ["maya"]);
    }

    #[test]
    fn ls_asks_the_host() {
        let fixture = fixture();
        assert!(fixture.context.ls().is_empty());

        let rep = DocumentId::new();
        let host = Arc::new(RecordingHost {
            log: Arc::clone(&fixture.log),
            containers: vec![Container::new("bruce_01", "ModelLoader", rep)],
        });
        fixture.context.install(host).unwrap();
        assert_eq!(fixture.context.ls().len(), 1);
    }

    #[test]
    fn registered_root_falls_back_to_projects() {
        let fixture = fixture();
        assert_eq!(fixture.context.registered_root().as_deref(), Some("/projects"));

        fixture.context.register_root("/mnt/show");
        assert_eq!(fixture.context.registered_root().as_deref(), Some("/mnt/show"));
    }

    // ----- representations -----

    #[test]
    fn representation_context_by_id_and_document() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        let rep = &chain.representations[0];

        let by_id = fixture.context.get_representation_context(rep.id().unwrap()).unwrap();
        let by_doc = fixture.context.get_representation_context(rep).unwrap();
        assert_eq!(by_id, by_doc);
        assert_eq!(by_id.subset.name(), Some("modelDefault"));
        assert_eq!(by_id.project.name(), Some("hulk"));
        assert_eq!(by_id.version.id(), chain.versions[0].id());
    }

    #[test]
    fn missing_representation_is_an_integrity_error() {
        let fixture = installed();
        let err = fixture.context.get_representation_context(DocumentId::new()).unwrap_err();
        assert!(matches!(err, HostError::Integrity(_)));
    }

    #[test]
    fn hero_context_carries_target_data() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        let context = fixture.context.get_representation_context(&chain.hero_representation).unwrap();
        assert_eq!(context.version.id(), chain.hero.id());
        assert_eq!(context.version.data_field("comment"), Some(&json!("v2")));
    }

    // ----- loaders -----

    #[test]
    fn load_defaults_name_to_subset() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        let loader = register_loader(&fixture.context, &fixture.log, false);

        let loaded = fixture
            .context
            .load(&loader, chain.representations[2].id().unwrap(), Some("bruce_01"), None, Map::new())
            .unwrap();
        assert_eq!(loaded["name"], "modelDefault");
        assert_eq!(loaded["namespace"], "bruce_01");
        assert_eq!(loaded["version"], 3);
    }

    #[test]
    fn load_rejects_incompatible_representation() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        let loader = register_loader(&fixture.context, &fixture.log, false);
        let abc = Document::representation("abc", chain.versions[0].id().unwrap());
        fixture.context.dbcon().insert_one(abc.clone()).unwrap();

        let err = fixture.context.load(&loader, &abc, None, None, Map::new()).unwrap_err();
        assert!(matches!(err, HostError::IncompatibleLoader { subset, .. } if subset == "modelDefault"));
    }

    #[test]
    fn update_to_latest_number_and_hero() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, false);
        let container = container_for(&chain.representations[0]);

        let latest = fixture.context.update(&container, VersionSelector::Latest).unwrap();
        assert_eq!(latest.id(), chain.representations[2].id());

        let second = fixture.context.update(&container, VersionSelector::Number(2)).unwrap();
        assert_eq!(second.id(), chain.representations[1].id());

        let hero = fixture.context.update(&container, VersionSelector::Hero).unwrap();
        assert_eq!(hero.id(), chain.hero_representation.id());

        assert_eq!(entries(&fixture.log).len(), 3);
        assert!(entries(&fixture.log)[0].starts_with("update bruce_01 -> "));
    }

    #[test]
    fn update_to_missing_version_fails() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, false);
        let container = container_for(&chain.representations[0]);

        let err = fixture.context.update(&container, VersionSelector::Number(9)).unwrap_err();
        assert!(matches!(err, HostError::Integrity(_)));
        assert!(entries(&fixture.log).is_empty());
    }

    #[test]
    fn update_requires_existing_file_when_asked() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, false);
        let context = fixture.context.with_existence_policy(ExistencePolicy::Require);
        let container = container_for(&chain.representations[0]);

        let err = context.update(&container, VersionSelector::Latest).unwrap_err();
        assert!(matches!(err, HostError::RepresentationMissing(_)));
    }

    #[test]
    fn update_with_required_file_on_disk() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, false);
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bruce_model_v003.ma");
        std::fs::write(&file, b"//Maya ASCII").unwrap();

        let mut latest = chain.representations[2].clone();
        latest.set_data(json!({"path": file.to_string_lossy()}));
        fixture.context.dbcon().save(latest).unwrap();

        let context = fixture.context.with_existence_policy(ExistencePolicy::Require);
        let container = container_for(&chain.representations[0]);
        let updated = context.update(&container, VersionSelector::Latest).unwrap();
        assert_eq!(updated.id(), chain.representations[2].id());
    }

    #[test]
    fn switch_needs_a_switching_loader() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, false);
        let container = container_for(&chain.representations[0]);

        let err = fixture
            .context
            .switch(&container, chain.representations[1].id().unwrap())
            .unwrap_err();
        assert!(matches!(err, HostError::Unsupported { loader, .. } if loader == "ModelLoader (label)"));
    }

    #[test]
    fn switch_hands_over_the_new_representation() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        register_loader(&fixture.context, &fixture.log, true);
        let container = container_for(&chain.representations[0]);

        let switched = fixture
            .context
            .switch(&container, chain.representations[1].id().unwrap())
            .unwrap();
        assert_eq!(switched.id(), chain.representations[1].id());
        assert_eq!(entries(&fixture.log).len(), 1);
    }

    #[test]
    fn remove_goes_through_the_containers_loader() {
        let fixture = installed();
        let chain = seed(&fixture.context);
        let container = container_for(&chain.representations[0]);

        let err = fixture.context.remove(&container).unwrap_err();
        assert!(matches!(err, HostError::LoaderNotFound(name) if name == "ModelLoader"));

        register_loader(&fixture.context, &fixture.log, false);
        assert!(fixture.context.remove(&container).unwrap());
        assert_eq!(entries(&fixture.log), ["remove bruce_01"]);
    }

    // ----- creators -----

    #[test]
    fn create_runs_inside_selection_guard() {
        let fixture = installed();
        let creator: Arc<dyn Creator> = Arc::new(ModelCreator {
            name: "CreateModel",
            fails: false,
            log: Arc::clone(&fixture.log),
        });

        let mut data = Map::new();
        data.insert("variant".into(), json!("main"));
        let instance = fixture
            .context
            .create(&creator, "modelMain", "bruce", "model", Map::new(), data)
            .unwrap();

        assert_eq!(
            entries(&fixture.log),
            ["select.save", "CreateModel.process", "select.restore"]
        );
        assert_eq!(instance["id"], "atrium.instance");
        assert_eq!(instance["subset"], "modelMain");
        assert_eq!(instance["variant"], "main");
    }

    #[test]
    fn create_all_returns_last_success() {
        let fixture = installed();
        for (name, fails) in [("CreateA", false), ("CreateB", true)] {
            fixture.context.registry().register_plugin(PluginClass::Creator(Arc::new(ModelCreator {
                name,
                fails,
                log: Arc::clone(&fixture.log),
            })));
        }

        let instance = fixture
            .context
            .create_all("modelMain", "bruce", "model", Map::new(), Map::new())
            .unwrap();
        assert_eq!(instance["family"], "model");

        let err = fixture
            .context
            .create_all("rigMain", "bruce", "rig", Map::new(), Map::new())
            .unwrap_err();
        assert!(matches!(err, HostError::NoCreatorsRan { family } if family == "rig"));
    }

    // ----- session -----

    #[test]
    fn task_change_updates_session_env_and_workdir() {
        let fixture = installed();
        seed(&fixture.context);
        let project = fixture
            .context
            .dbcon()
            .find_one(&Filter::eq("type", "project"), &FindOptions::default())
            .unwrap()
            .unwrap();
        let mut project = project;
        project.insert(
            "config",
            json!({"template": {"work": "{root}/{project[name]}/{hierarchy}/{asset}/work/{task}/{app}"}}),
        );
        fixture.context.dbcon().save(project).unwrap();

        let events: Log = Arc::default();
        let sink = Arc::clone(&events);
        let _sub = fixture.context.events().on("taskChanged", move |args| {
            sink.lock().unwrap().push(args.to_string());
            Ok(())
        });

        let changes = fixture
            .context
            .update_current_task(Some("anim"), Some("bruce"), Some("maya"))
            .unwrap();
        let workdir = "/projects/hulk/characters/bruce/work/anim/maya";
        assert_eq!(changes[keys::WORKDIR].as_deref(), Some(workdir));
        assert_eq!(changes[keys::SILO].as_deref(), Some("assets"));

        let session = fixture.context.session_snapshot();
        assert_eq!(session.get(keys::TASK), Some("anim"));
        assert_eq!(session.get(keys::WORKDIR), Some(workdir));
        assert_eq!(fixture.env.var(keys::WORKDIR).as_deref(), Some(workdir));
        assert_eq!(entries(&events).len(), 1);

        let again = fixture
            .context
            .update_current_task(Some("anim"), Some("bruce"), Some("maya"))
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(entries(&events).len(), 1);
    }

    #[test]
    fn asset_without_silo_unsets_it() {
        let mut session = session();
        session.remove(keys::USER);
        let fixture = fixture_with(session, false);
        fixture.context.install(host(&fixture.log)).unwrap();
        fixture.env.set_var("USER", "banner");
        seed(&fixture.context);

        let dbcon = fixture.context.dbcon();
        let mut project = dbcon
            .find_one(&Filter::eq("type", "project"), &FindOptions::default())
            .unwrap()
            .unwrap();
        project.insert("config", json!({"template": {"work": "{root}/{user}/{asset}/{task}"}}));
        dbcon.save(project.clone()).unwrap();
        dbcon.insert_one(Document::asset("betty", project.id().unwrap())).unwrap();

        let first = fixture
            .context
            .update_current_task(Some("anim"), Some("bruce"), None)
            .unwrap();
        assert_eq!(first[keys::SILO].as_deref(), Some("assets"));
        assert_eq!(first[keys::HIERARCHY].as_deref(), Some("characters"));
        assert_eq!(first[keys::WORKDIR].as_deref(), Some("/projects/banner/bruce/anim"));
        assert_eq!(fixture.env.var(keys::SILO).as_deref(), Some("assets"));

        let second = fixture
            .context
            .update_current_task(None, Some("betty"), None)
            .unwrap();
        assert_eq!(second.get(keys::SILO), Some(&None));
        assert_eq!(second.get(keys::HIERARCHY), Some(&None));
        assert_eq!(fixture.env.var(keys::SILO), None);
        let session = fixture.context.session_snapshot();
        assert_eq!(session.get(keys::SILO), None);
        assert_eq!(session.get(keys::WORKDIR), Some("/projects/banner/betty/anim"));
    }

    #[test]
    fn task_change_to_unknown_asset_fails() {
        let fixture = installed();
        seed(&fixture.context);
        let err = fixture
            .context
            .update_current_task(None, Some("betty"), None)
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownAsset(name) if name == "betty"));
        assert_eq!(fixture.context.session_snapshot().get(keys::ASSET), None);
    }

    // ----- thumbnails -----

    #[test]
    fn thumbnails_resolve_by_priority_and_type() {
        let fixture = installed();
        fixture
            .context
            .registry()
            .register_plugin(PluginClass::ThumbnailResolver(Arc::new(StaticThumbnail)));
        let entity = Document::new().with_data(json!({"binary_data": "ff00"}));

        assert_eq!(
            fixture.context.get_thumbnail_binary(&entity, "thumbnail"),
            Some(b"static".to_vec())
        );
        assert_eq!(
            fixture.context.get_thumbnail_binary(&entity, "icon"),
            Some(vec![0xff, 0x00])
        );
        assert_eq!(fixture.context.get_thumbnail_binary(&Document::new(), "icon"), None);
    }
}
