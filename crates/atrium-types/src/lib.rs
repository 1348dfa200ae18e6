//! Foundation types for Atrium.
//!
//! Every other Atrium crate depends on `atrium-types`. The crate describes
//! the documents stored in a project database and the small records hosts
//! leave behind in their scenes; it never talks to a store itself.
//!
//! # Key Types
//!
//! - [`DocumentId`]: 12-byte store identifier rendered as hex
//! - [`Document`]: a self-describing JSON record with typed accessors
//! - [`DocumentType`]: the `type` discriminator of the hierarchy
//!   `project → asset → subset → version → representation`
//! - [`VersionRef`]: a regular version or a hero version pointing at one
//! - [`Container`]: provenance record for content loaded into a host
//! - [`SchemaValidator`]: the `validate(document)` contract used before writes

pub mod container;
pub mod document;
pub mod error;
pub mod id;
pub mod schema;

pub use container::Container;
pub use document::{Document, DocumentType, VersionRef, VersionSelector};
pub use error::{SchemaError, TypeError};
pub use id::DocumentId;
pub use schema::{SchemaValidator, SchemaVersion, StructuralValidator};
