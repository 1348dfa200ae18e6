//! Site configuration modules.
//!
//! A studio ships its configuration as a [`SiteConfig`], registered under a
//! dotted module name in a [`ConfigCatalog`]. `ATRIUM_CONFIG` picks one at
//! install time. Host specific setup lives in [`HostHooks`] registered under
//! a name derived from the config and host names.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// A studio configuration.
pub trait SiteConfig: Send + Sync {
    fn install(&self) -> anyhow::Result<()>;

    fn uninstall(&self) -> anyhow::Result<()>;
}

/// Optional per-host setup from a site config.
pub trait HostHooks: Send + Sync {
    fn install(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn uninstall(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Module names searched for the hooks of `host` in `config`, in order.
pub fn submodule_candidates(config: &str, host: &str) -> [String; 3] {
    [
        format!("{config}.hosts.{host}.api"),
        format!("{config}.hosts.{host}"),
        format!("{config}.{host}"),
    ]
}

/// Site configs and host hook modules known to the application.
#[derive(Clone, Default)]
pub struct ConfigCatalog {
    configs: BTreeMap<String, Arc<dyn SiteConfig>>,
    modules: BTreeMap<String, Arc<dyn HostHooks>>,
}

impl ConfigCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, name: &str, config: Arc<dyn SiteConfig>) -> Self {
        self.register_config(name, config);
        self
    }

    pub fn with_host_module(mut self, name: &str, hooks: Arc<dyn HostHooks>) -> Self {
        self.register_host_module(name, hooks);
        self
    }

    pub fn register_config(&mut self, name: &str, config: Arc<dyn SiteConfig>) {
        self.configs.insert(name.to_string(), config);
    }

    pub fn register_host_module(&mut self, name: &str, hooks: Arc<dyn HostHooks>) {
        self.modules.insert(name.to_string(), hooks);
    }

    pub fn config(&self, name: &str) -> Option<Arc<dyn SiteConfig>> {
        self.configs.get(name).cloned()
    }

    pub fn config_names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// First registered module among [`submodule_candidates`].
    pub fn find_submodule(&self, config: &str, host: &str) -> Option<(String, Arc<dyn HostHooks>)> {
        for candidate in submodule_candidates(config, host) {
            if let Some(hooks) = self.modules.get(&candidate) {
                return Some((candidate, Arc::clone(hooks)));
            }
            debug!(module = %candidate, "host module not found");
        }
        None
    }
}

impl fmt::Debug for ConfigCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCatalog")
            .field("configs", &self.configs.keys().collect::<Vec<_>>())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl SiteConfig for Noop {
        fn install(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn uninstall(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl HostHooks for Noop {}

    #[test]
    fn candidates_follow_naming_convention() {
        assert_eq!(
            submodule_candidates("studio", "maya"),
            ["studio.hosts.maya.api", "studio.hosts.maya", "studio.maya"]
        );
    }

    #[test]
    fn most_specific_module_wins() {
        let catalog = ConfigCatalog::new()
            .with_config("studio", Arc::new(Noop))
            .with_host_module("studio.maya", Arc::new(Noop))
            .with_host_module("studio.hosts.maya", Arc::new(Noop));

        let (name, _) = catalog.find_submodule("studio", "maya").unwrap();
        assert_eq!(name, "studio.hosts.maya");
        assert!(catalog.find_submodule("studio", "nuke").is_none());
        assert!(catalog.config("studio").is_some());
        assert_eq!(catalog.config_names().collect::<Vec<_>>(), ["studio"]);
    }
}
