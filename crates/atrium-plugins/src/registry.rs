use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use atrium_paths::normalize_path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{PluginError, PluginResult};
use crate::manifest::{self, ClassSpec};
use crate::traits::{
    Action, Category, Creator, InventoryAction, Loader, PluginClass, ThumbnailResolver,
};

/// Builds a plugin from a class declared in a plugin module.
pub type Factory = Arc<dyn Fn(&ClassSpec) -> anyhow::Result<PluginClass> + Send + Sync>;

/// Registered plugins, plugin paths and factories, per category.
///
/// Discovery scans every registered path of a category for plugin modules
/// (`*.toml`, skipping names starting with `_` or `.`), builds each
/// concrete class of that category through its factory, then adds the
/// explicitly registered plugins. Later definitions replace earlier ones
/// with the same name. The result is sorted by name and cached.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<Category, Vec<PluginClass>>>,
    paths: RwLock<BTreeMap<Category, Vec<PathBuf>>>,
    factories: RwLock<HashMap<String, Factory>>,
    discovered: RwLock<BTreeMap<Category, Vec<PluginClass>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- explicit registrations -------------------------------------------

    /// Register `plugin`. Registering the same plugin twice is a no-op.
    pub fn register_plugin(&self, plugin: PluginClass) {
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        let list = plugins.entry(plugin.category()).or_default();
        if list.iter().any(|p| p.same_plugin(&plugin)) {
            return;
        }
        debug!(category = %plugin.category(), name = plugin.name(), "registered plugin");
        list.push(plugin);
    }

    pub fn deregister_plugin(&self, plugin: &PluginClass) -> PluginResult<()> {
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        let list = plugins.entry(plugin.category()).or_default();
        let before = list.len();
        list.retain(|p| !p.same_plugin(plugin));
        if list.len() == before {
            return Err(PluginError::NotFound {
                category: plugin.category().to_string(),
                name: plugin.name().to_string(),
            });
        }
        Ok(())
    }

    /// Explicitly registered plugins of `category`, in registration order.
    pub fn registered_plugins(&self, category: Category) -> Vec<PluginClass> {
        self.plugins
            .read()
            .expect("registry lock poisoned")
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    // -- paths -------------------------------------------------------------

    /// Register a directory to scan for `category` plugins. The path is
    /// normalized first; registering it again is a no-op. Returns the
    /// normalized path.
    pub fn register_plugin_path(&self, category: Category, path: impl AsRef<Path>) -> PathBuf {
        let path = normalize_path(path.as_ref());
        let mut paths = self.paths.write().expect("registry lock poisoned");
        let list = paths.entry(category).or_default();
        if !list.contains(&path) {
            debug!(category = %category, path = %path.display(), "registered plugin path");
            list.push(path.clone());
        }
        path
    }

    pub fn deregister_plugin_path(&self, category: Category, path: impl AsRef<Path>) -> PluginResult<()> {
        let path = normalize_path(path.as_ref());
        let mut paths = self.paths.write().expect("registry lock poisoned");
        let list = paths.entry(category).or_default();
        match list.iter().position(|p| *p == path) {
            Some(idx) => {
                list.remove(idx);
                Ok(())
            }
            None => Err(PluginError::PathNotFound(path)),
        }
    }

    /// A copy of every registered path, per category.
    pub fn registered_plugin_paths(&self) -> BTreeMap<Category, Vec<PathBuf>> {
        self.paths.read().expect("registry lock poisoned").clone()
    }

    // -- factories ---------------------------------------------------------

    /// Make `name` usable as `factory = "name"` in plugin modules.
    pub fn register_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ClassSpec) -> anyhow::Result<PluginClass> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_string(), Arc::new(factory));
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    // -- discovery ---------------------------------------------------------

    fn plugins_from_module(&self, path: &Path, category: Category) -> PluginResult<Vec<PluginClass>> {
        let specs = manifest::load_module(path)?;
        let factories = self.factories.read().expect("registry lock poisoned");

        let mut plugins = Vec::new();
        for spec in specs.iter().filter(|s| s.inherits(category.as_str())) {
            let Some(factory_name) = spec.factory() else {
                debug!(class = spec.name(), "skipping abstract class");
                continue;
            };
            let factory = factories
                .get(factory_name)
                .ok_or_else(|| PluginError::UnknownFactory {
                    class: spec.name().to_string(),
                    factory: factory_name.to_string(),
                })?;
            let plugin = factory(spec).map_err(|err| PluginError::Factory {
                class: spec.name().to_string(),
                reason: format!("{err:#}"),
            })?;
            if plugin.category() != category {
                return Err(PluginError::CategoryMismatch {
                    class: spec.name().to_string(),
                    expected: category.to_string(),
                    actual: plugin.category().to_string(),
                });
            }
            plugins.push(plugin);
        }
        Ok(plugins)
    }

    fn scan_path(&self, dir: &Path, category: Category, found: &mut BTreeMap<String, PluginClass>) {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "plugin path is not a directory");
            return;
        }
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok);
        for entry in entries {
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('_') || name.starts_with('.') {
                continue;
            }
            if !entry.file_type().is_file() || entry.path().extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            match self.plugins_from_module(entry.path(), category) {
                Ok(plugins) => {
                    for plugin in plugins {
                        insert_discovered(found, plugin);
                    }
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "skipping plugin module");
                }
            }
        }
    }

    /// Find every plugin of `category`, sorted by name.
    pub fn discover(&self, category: Category) -> Vec<PluginClass> {
        let paths = self
            .paths
            .read()
            .expect("registry lock poisoned")
            .get(&category)
            .cloned()
            .unwrap_or_default();

        let mut found = BTreeMap::new();
        for dir in &paths {
            self.scan_path(dir, category, &mut found);
        }
        for plugin in self.registered_plugins(category) {
            insert_discovered(&mut found, plugin);
        }

        let plugins: Vec<PluginClass> = found.into_values().collect();
        info!(category = %category, count = plugins.len(), "discovered plugins");
        self.discovered
            .write()
            .expect("registry lock poisoned")
            .insert(category, plugins.clone());
        plugins
    }

    /// Result of the last [`discover`](Self::discover) for `category`.
    pub fn last_discovered(&self, category: Category) -> Vec<PluginClass> {
        self.discovered
            .read()
            .expect("registry lock poisoned")
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    pub fn loaders(&self) -> Vec<Arc<dyn Loader>> {
        self.discover(Category::Loader)
            .iter()
            .filter_map(|p| p.as_loader().cloned())
            .collect()
    }

    pub fn creators(&self) -> Vec<Arc<dyn Creator>> {
        self.discover(Category::Creator)
            .iter()
            .filter_map(|p| p.as_creator().cloned())
            .collect()
    }

    pub fn actions(&self) -> Vec<Arc<dyn Action>> {
        self.discover(Category::Action)
            .iter()
            .filter_map(|p| p.as_action().cloned())
            .collect()
    }

    pub fn inventory_actions(&self) -> Vec<Arc<dyn InventoryAction>> {
        self.discover(Category::InventoryAction)
            .iter()
            .filter_map(|p| p.as_inventory_action().cloned())
            .collect()
    }

    pub fn thumbnail_resolvers(&self) -> Vec<Arc<dyn ThumbnailResolver>> {
        self.discover(Category::ThumbnailResolver)
            .iter()
            .filter_map(|p| p.as_thumbnail_resolver().cloned())
            .collect()
    }
}

fn insert_discovered(found: &mut BTreeMap<String, PluginClass>, plugin: PluginClass) {
    let name = plugin.name().to_string();
    if let Some(previous) = found.insert(name.clone(), plugin) {
        warn!(name = %name, category = %previous.category(), "plugin replaced by a later definition");
    }
}
