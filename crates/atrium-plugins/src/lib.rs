//! Plugins for Atrium.
//!
//! Plugins are trait objects. A plugin can be registered directly, or
//! declared as a class in a TOML plugin module found on a registered
//! plugin path. Module classes are turned into plugins by factories the
//! embedding application registers by name at startup.
//!
//! # Plugin kinds
//!
//! - [`Loader`] -- loads published representations into a host
//! - [`Creator`] -- creates publishable instances
//! - [`Action`] -- launcher actions for the current context
//! - [`InventoryAction`] -- actions on loaded containers
//! - [`ThumbnailResolver`] -- thumbnail bytes for thumbnail documents
//!
//! # Modules
//!
//! - [`traits`] -- plugin traits, [`Category`] and [`PluginClass`]
//! - [`manifest`] -- plugin module parsing and class inheritance
//! - [`registry`] -- [`PluginRegistry`] and discovery
//! - [`compat`] -- loader compatibility with a representation
//! - [`instance`] -- [`CreatorInstance`]
//! - [`thumbnail`] -- built-in thumbnail resolvers
//! - [`error`] -- error types

pub mod compat;
pub mod error;
pub mod instance;
pub mod manifest;
pub mod registry;
pub mod thumbnail;
pub mod traits;

pub use compat::{is_compatible_loader, loaders_from_representation, RepresentationContext};
pub use error::{PluginError, PluginResult};
pub use instance::CreatorInstance;
pub use manifest::ClassSpec;
pub use registry::{Factory, PluginRegistry};
pub use thumbnail::{BinaryThumbnail, TemplateThumbnail};
pub use traits::{
    Action, Category, Creator, InventoryAction, Loader, PluginClass, ThumbnailResolver,
};
