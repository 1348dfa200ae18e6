use std::sync::Arc;

use atrium_types::{Document, SchemaVersion};
use serde_json::{json, Value};

use crate::traits::Loader;

/// A representation together with all of its ancestors.
#[derive(Clone, Debug, PartialEq)]
pub struct RepresentationContext {
    pub project: Document,
    pub asset: Document,
    pub subset: Document,
    pub version: Document,
    pub representation: Document,
}

impl RepresentationContext {
    /// `{project: {name, code}, asset, subset, version, representation}`.
    pub fn to_value(&self) -> Value {
        json!({
            "project": {
                "name": self.project.name_value().cloned().unwrap_or(Value::Null),
                "code": self.project.data_field("code").cloned().unwrap_or(Value::Null),
            },
            "asset": self.asset.as_map(),
            "subset": self.subset.as_map(),
            "version": self.version.as_map(),
            "representation": self.representation.as_map(),
        })
    }

    /// Families of the published content.
    ///
    /// Subsets from schema 3 on carry `data.families`; older data keeps
    /// them on the version, as a list or a single `family`.
    pub fn families(&self) -> Vec<String> {
        let subset_major = self.subset.schema().map(SchemaVersion::of).map(|v| v.major);
        let source = if subset_major.is_some_and(|major| major >= 3) {
            self.subset.data_field("families")
        } else {
            self.version
                .data_field("families")
                .or_else(|| self.version.data_field("family"))
        };
        match source {
            Some(Value::String(family)) => vec![family.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn accepts(declared: &[String], candidates: &[&str]) -> bool {
    declared
        .iter()
        .any(|d| d == "*" || candidates.iter().any(|c| d == c))
}

/// Whether `loader` can load the representation in `context`: one of its
/// families must match the content's families and one of its
/// representation names the representation's name. `"*"` matches anything.
pub fn is_compatible_loader(loader: &dyn Loader, context: &RepresentationContext) -> bool {
    let families = context.families();
    let families: Vec<&str> = families.iter().map(String::as_str).collect();
    let representation = context.representation.name().unwrap_or_default();

    accepts(&loader.families(), &families) && accepts(&loader.representations(), &[representation])
}

/// The loaders in `loaders` compatible with `context`, order kept.
pub fn loaders_from_representation(
    loaders: &[Arc<dyn Loader>],
    context: &RepresentationContext,
) -> Vec<Arc<dyn Loader>> {
    loaders
        .iter()
        .filter(|loader| is_compatible_loader(loader.as_ref(), context))
        .cloned()
        .collect()
}
