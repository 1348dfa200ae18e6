//! Plugin module files.
//!
//! A plugin module is a TOML file holding `[[class]]` tables:
//!
//! ```toml
//! [[class]]
//! name = "MayaLoader"
//! bases = ["Loader"]
//! factory = "maya.reference"
//! representations = ["ma", "mb"]
//!
//! [[class]]
//! name = "ModelLoader"
//! bases = ["MayaLoader"]
//! families = ["model"]
//! label = "Reference model"
//! ```
//!
//! Bases naming another class in the same module are resolved
//! transitively; a class inherits `factory` and every other attribute from
//! its bases, earlier bases winning over later ones and its own keys
//! winning over all of them. Bases that are not in the module (such as
//! `Loader`) only contribute their name to the lineage.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{PluginError, PluginResult};

#[derive(Debug, Deserialize)]
struct ModuleFile {
    #[serde(default, rename = "class")]
    classes: Vec<RawClass>,
}

#[derive(Debug, Deserialize)]
struct RawClass {
    name: String,
    #[serde(default)]
    bases: Vec<String>,
    #[serde(default)]
    factory: Option<String>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

/// A class from a plugin module with its inheritance resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSpec {
    name: String,
    module: PathBuf,
    bases: Vec<String>,
    lineage: Vec<String>,
    factory: Option<String>,
    attributes: Map<String, Value>,
}

impl ClassSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the class was declared in.
    pub fn module(&self) -> &Path {
        &self.module
    }

    /// Bases as declared.
    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    /// Every ancestor name, nearest first.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    pub fn inherits(&self, base: &str) -> bool {
        self.lineage.iter().any(|b| b == base)
    }

    /// `None` for abstract classes.
    pub fn factory(&self) -> Option<&str> {
        self.factory.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn i64_attr(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(Value::as_i64)
    }

    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        self.attr(key).and_then(Value::as_bool)
    }

    /// A list of strings. A single string counts as a one-item list.
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.attr(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

struct Resolved {
    lineage: Vec<String>,
    factory: Option<String>,
    attributes: Map<String, Value>,
}

fn resolve(
    name: &str,
    raw: &HashMap<&str, &RawClass>,
    done: &mut HashMap<String, Resolved>,
    visiting: &mut HashSet<String>,
) -> Result<(), String> {
    if done.contains_key(name) {
        return Ok(());
    }
    if !visiting.insert(name.to_string()) {
        return Err(format!("inheritance cycle through class '{name}'"));
    }
    let class = raw[name];

    for base in &class.bases {
        if raw.contains_key(base.as_str()) {
            resolve(base, raw, done, visiting)?;
        }
    }

    let mut lineage = Vec::new();
    let mut factory = None;
    let mut attributes = Map::new();
    for base in &class.bases {
        if !lineage.contains(base) {
            lineage.push(base.clone());
        }
        if let Some(parent) = done.get(base.as_str()) {
            for ancestor in &parent.lineage {
                if !lineage.contains(ancestor) {
                    lineage.push(ancestor.clone());
                }
            }
            if factory.is_none() {
                factory = parent.factory.clone();
            }
        }
    }
    for base in class.bases.iter().rev() {
        if let Some(parent) = done.get(base.as_str()) {
            attributes.extend(parent.attributes.clone());
        }
    }
    attributes.extend(class.attributes.clone());
    if class.factory.is_some() {
        factory = class.factory.clone();
    }

    visiting.remove(name);
    done.insert(
        name.to_string(),
        Resolved {
            lineage,
            factory,
            attributes,
        },
    );
    Ok(())
}

/// Parse a plugin module and resolve every class in declaration order.
pub fn parse_module(path: &Path, content: &str) -> PluginResult<Vec<ClassSpec>> {
    let manifest_error = |reason: String| PluginError::Manifest {
        path: path.to_path_buf(),
        reason,
    };
    let module: ModuleFile = toml::from_str(content).map_err(|e| manifest_error(e.to_string()))?;

    let mut raw: HashMap<&str, &RawClass> = HashMap::new();
    for class in &module.classes {
        if raw.insert(class.name.as_str(), class).is_some() {
            return Err(manifest_error(format!("class '{}' is defined twice", class.name)));
        }
    }

    let mut done = HashMap::new();
    let mut visiting = HashSet::new();
    for class in &module.classes {
        resolve(&class.name, &raw, &mut done, &mut visiting).map_err(manifest_error)?;
    }

    Ok(module
        .classes
        .iter()
        .filter_map(|class| {
            let resolved = done.remove(class.name.as_str())?;
            Some(ClassSpec {
                name: class.name.clone(),
                module: path.to_path_buf(),
                bases: class.bases.clone(),
                lineage: resolved.lineage,
                factory: resolved.factory,
                attributes: resolved.attributes,
            })
        })
        .collect())
}

/// Read and parse a plugin module file.
pub fn load_module(path: &Path) -> PluginResult<Vec<ClassSpec>> {
    let content = std::fs::read_to_string(path).map_err(|e| PluginError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_module(path, &content)
}
