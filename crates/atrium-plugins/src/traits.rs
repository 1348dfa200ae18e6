use std::fmt;
use std::sync::Arc;

use atrium_session::{keys, Session};
use atrium_types::{Container, Document};
use serde_json::{Map, Value};

use crate::compat::RepresentationContext;
use crate::instance::CreatorInstance;

/// The plugin kinds discovery understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Loader,
    Creator,
    Action,
    InventoryAction,
    ThumbnailResolver,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Loader,
        Category::Creator,
        Category::Action,
        Category::InventoryAction,
        Category::ThumbnailResolver,
    ];

    /// Base class name used in plugin modules.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loader => "Loader",
            Self::Creator => "Creator",
            Self::Action => "Action",
            Self::InventoryAction => "InventoryAction",
            Self::ThumbnailResolver => "ThumbnailResolver",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Brings published representations into a host scene.
pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    /// Families this loader accepts. `"*"` accepts any family.
    fn families(&self) -> Vec<String>;

    /// Representation names this loader accepts. `"*"` accepts any.
    fn representations(&self) -> Vec<String>;

    fn label(&self) -> Option<String> {
        None
    }

    fn order(&self) -> i64 {
        0
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn color(&self) -> Option<String> {
        None
    }

    fn tool_tip(&self) -> Option<String> {
        None
    }

    /// Load the representation described by `context` and return whatever
    /// the host uses to refer to the result.
    fn load(
        &self,
        context: &RepresentationContext,
        name: &str,
        namespace: Option<&str>,
        options: &Map<String, Value>,
    ) -> anyhow::Result<Value>;

    /// Point `container` at `representation`, usually another version.
    fn update(&self, container: &Container, representation: &Document) -> anyhow::Result<()>;

    /// Remove the loaded content. Returns whether anything was removed.
    fn remove(&self, container: &Container) -> anyhow::Result<bool>;

    fn supports_switch(&self) -> bool {
        false
    }

    /// Point `container` at a different representation. Only called when
    /// [`supports_switch`](Self::supports_switch) is true.
    fn switch(&self, container: &Container, representation: &Document) -> anyhow::Result<()> {
        let _ = (container, representation);
        anyhow::bail!("loader '{}' does not support switching", self.name())
    }
}

/// Creates publishable instances in a host scene.
pub trait Creator: Send + Sync {
    fn name(&self) -> &str;

    fn family(&self) -> &str;

    fn label(&self) -> Option<String> {
        None
    }

    /// Suggested subset names.
    fn defaults(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run `process` inside the host's selection guard.
    fn maintain_selection(&self) -> bool {
        true
    }

    fn process(&self, instance: &CreatorInstance) -> anyhow::Result<Value>;
}

/// A launcher action for the current context.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn label(&self) -> Option<String> {
        None
    }

    fn order(&self) -> i64 {
        0
    }

    /// Defaults to requiring project, asset and task.
    fn is_compatible(&self, session: &Session) -> bool {
        [keys::PROJECT, keys::ASSET, keys::TASK]
            .iter()
            .all(|key| session.non_empty(key).is_some())
    }

    fn process(&self, session: &Session) -> anyhow::Result<()>;
}

/// An action on loaded containers.
pub trait InventoryAction: Send + Sync {
    fn name(&self) -> &str;

    fn label(&self) -> Option<String> {
        None
    }

    fn order(&self) -> i64 {
        0
    }

    /// Defaults to requiring a host object behind the container.
    fn is_compatible(&self, container: &Container) -> bool {
        container
            .object_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    fn process(&self, containers: &[Container]) -> anyhow::Result<()>;
}

/// Produces thumbnail bytes for a thumbnail document.
pub trait ThumbnailResolver: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i64 {
        100
    }

    /// Thumbnail types served. `"*"` serves every type.
    fn thumbnail_types(&self) -> Vec<String> {
        vec!["*".to_string()]
    }

    fn accepts(&self, thumbnail_type: &str) -> bool {
        self.thumbnail_types()
            .iter()
            .any(|t| t == "*" || t == thumbnail_type)
    }

    fn process(
        &self,
        entity: &Document,
        thumbnail_type: &str,
        session: &Session,
    ) -> anyhow::Result<Option<Vec<u8>>>;
}

/// A registered or discovered plugin.
#[derive(Clone)]
pub enum PluginClass {
    Loader(Arc<dyn Loader>),
    Creator(Arc<dyn Creator>),
    Action(Arc<dyn Action>),
    InventoryAction(Arc<dyn InventoryAction>),
    ThumbnailResolver(Arc<dyn ThumbnailResolver>),
}

impl PluginClass {
    pub fn category(&self) -> Category {
        match self {
            Self::Loader(_) => Category::Loader,
            Self::Creator(_) => Category::Creator,
            Self::Action(_) => Category::Action,
            Self::InventoryAction(_) => Category::InventoryAction,
            Self::ThumbnailResolver(_) => Category::ThumbnailResolver,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Loader(p) => p.name(),
            Self::Creator(p) => p.name(),
            Self::Action(p) => p.name(),
            Self::InventoryAction(p) => p.name(),
            Self::ThumbnailResolver(p) => p.name(),
        }
    }

    fn data_ptr(&self) -> *const () {
        match self {
            Self::Loader(p) => Arc::as_ptr(p) as *const (),
            Self::Creator(p) => Arc::as_ptr(p) as *const (),
            Self::Action(p) => Arc::as_ptr(p) as *const (),
            Self::InventoryAction(p) => Arc::as_ptr(p) as *const (),
            Self::ThumbnailResolver(p) => Arc::as_ptr(p) as *const (),
        }
    }

    /// Identity comparison: both wrap the same allocation.
    pub fn same_plugin(&self, other: &PluginClass) -> bool {
        self.category() == other.category() && self.data_ptr() == other.data_ptr()
    }

    pub fn as_loader(&self) -> Option<&Arc<dyn Loader>> {
        match self {
            Self::Loader(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_creator(&self) -> Option<&Arc<dyn Creator>> {
        match self {
            Self::Creator(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&Arc<dyn Action>> {
        match self {
            Self::Action(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_inventory_action(&self) -> Option<&Arc<dyn InventoryAction>> {
        match self {
            Self::InventoryAction(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_thumbnail_resolver(&self) -> Option<&Arc<dyn ThumbnailResolver>> {
        match self {
            Self::ThumbnailResolver(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for PluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClass")
            .field("category", &self.category())
            .field("name", &self.name())
            .finish()
    }
}

impl From<Arc<dyn Loader>> for PluginClass {
    fn from(p: Arc<dyn Loader>) -> Self {
        Self::Loader(p)
    }
}

impl From<Arc<dyn Creator>> for PluginClass {
    fn from(p: Arc<dyn Creator>) -> Self {
        Self::Creator(p)
    }
}

impl From<Arc<dyn Action>> for PluginClass {
    fn from(p: Arc<dyn Action>) -> Self {
        Self::Action(p)
    }
}

impl From<Arc<dyn InventoryAction>> for PluginClass {
    fn from(p: Arc<dyn InventoryAction>) -> Self {
        Self::InventoryAction(p)
    }
}

impl From<Arc<dyn ThumbnailResolver>> for PluginClass {
    fn from(p: Arc<dyn ThumbnailResolver>) -> Self {
        Self::ThumbnailResolver(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    impl Action for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn process(&self, _session: &Session) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl InventoryAction for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn process(&self, _containers: &[Container]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("Publisher"), None);
    }

    #[test]
    fn identity_is_by_allocation() {
        let a: Arc<dyn Action> = Arc::new(Noop("Open"));
        let b: Arc<dyn Action> = Arc::new(Noop("Open"));
        let pa = PluginClass::from(Arc::clone(&a));
        assert!(pa.same_plugin(&PluginClass::from(a)));
        assert!(!pa.same_plugin(&PluginClass::from(b)));
    }

    #[test]
    fn default_action_compatibility_needs_full_context() {
        let action = Noop("Open");
        let mut session: Session = [(keys::PROJECT, "hulk"), (keys::ASSET, "bruce")]
            .into_iter()
            .collect();
        assert!(!Action::is_compatible(&action, &session));
        session.set(keys::TASK, "anim");
        assert!(Action::is_compatible(&action, &session));
    }

    #[test]
    fn default_inventory_compatibility_needs_object_name() {
        let action = Noop("Select");
        let container = Container::new("bruce_01", "ModelLoader", atrium_types::DocumentId::new());
        assert!(!InventoryAction::is_compatible(&action, &container));
        assert!(InventoryAction::is_compatible(
            &action,
            &container.with_object_name("bruce_01_CON")
        ));
    }
}
