//! Path handling for Atrium.
//!
//! Templates turn document and session data into file system paths. This
//! crate formats them, resolves a representation document back to its file
//! and finds the latest workfile in a work directory.
//!
//! # Modules
//!
//! - [`template`] -- `{key}` placeholders, format specs and `<optional>` groups
//! - [`representation`] -- representation document to file path
//! - [`workfile`] -- latest workfile lookup by version
//! - [`error`] -- error types

pub mod error;
pub mod representation;
pub mod template;
pub mod workfile;

use std::path::{Component, Path, PathBuf};

pub use error::{PathError, PathResult, TemplateError};
pub use representation::get_representation_path;
pub use template::{format, format_strict, Field, FormatSpec, Template};
pub use workfile::{last_workfile, last_workfile_with_version, WorkfileQuery};

/// Lexically normalize `path`: drop `.` components, fold `name/..` pairs and
/// repeated separators. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// [`normalize_path`] on a string.
pub fn normalize_path_str(path: &str) -> String {
    normalize_path(Path::new(path)).to_string_lossy().into_owned()
}
