use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::id::DocumentId;

// ---------------------------------------------------------------------------
// DocumentType
// ---------------------------------------------------------------------------

/// The `type` discriminator of a stored document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Project,
    Asset,
    Subset,
    Version,
    /// Pointer-like version that always resolves to another version's data.
    /// Also accepts the legacy spelling `master_version`.
    HeroVersion,
    Representation,
    Thumbnail,
    /// Any other type tag; the store does not restrict the vocabulary.
    Other(String),
}

impl DocumentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Project => "project",
            Self::Asset => "asset",
            Self::Subset => "subset",
            Self::Version => "version",
            Self::HeroVersion => "hero_version",
            Self::Representation => "representation",
            Self::Thumbnail => "thumbnail",
            Self::Other(other) => other,
        }
    }

    /// Parse a type tag. Unknown tags become [`DocumentType::Other`].
    pub fn parse(tag: &str) -> Self {
        match tag {
            "project" => Self::Project,
            "asset" => Self::Asset,
            "subset" => Self::Subset,
            "version" => Self::Version,
            "hero_version" | "master_version" => Self::HeroVersion,
            "representation" => Self::Representation,
            "thumbnail" => Self::Thumbnail,
            other => Self::Other(other.to_string()),
        }
    }

    /// Default schema tag for newly built documents of this type.
    pub fn default_schema(&self) -> String {
        let version = match self {
            Self::Project => "2.0",
            Self::Asset | Self::Subset | Self::Version => "3.0",
            Self::HeroVersion => "1.0",
            Self::Representation => "2.0",
            Self::Thumbnail => "1.0",
            Self::Other(_) => "1.0",
        };
        format!("atrium-core:{}-{version}", self.as_str())
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TypeError::UnknownDocumentType(s.to_string()));
        }
        Ok(Self::parse(s))
    }
}

// ---------------------------------------------------------------------------
// VersionRef / VersionSelector
// ---------------------------------------------------------------------------

/// What a version-like document stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionRef {
    /// An ordinary, immutable version with a numeric name.
    Regular { name: i64 },
    /// A hero version; its data always comes from `target` at read time.
    Hero { target: DocumentId },
}

/// Which version an update should move a container to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersionSelector {
    /// Highest version number under the subset.
    #[default]
    Latest,
    /// A specific version number.
    Number(i64),
    /// The subset's hero version.
    Hero,
}

impl From<i64> for VersionSelector {
    fn from(value: i64) -> Self {
        if value < 0 {
            Self::Latest
        } else {
            Self::Number(value)
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A self-describing record in a project database.
///
/// Documents are free-form JSON objects. The hierarchy only relies on a few
/// well-known fields: `_id`, `type`, `name`, `parent`, `schema` and `data`.
/// Accessors return `None` when a field is missing or has the wrong shape;
/// the store never rejects unknown fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document of `doc_type` with a fresh id, default schema and an
    /// empty `data` payload.
    pub fn typed(doc_type: DocumentType, name: impl Into<Value>, parent: Option<DocumentId>) -> Self {
        let mut map = Map::new();
        map.insert("_id".into(), DocumentId::new().into());
        map.insert("schema".into(), Value::String(doc_type.default_schema()));
        map.insert("type".into(), Value::String(doc_type.as_str().to_string()));
        map.insert("name".into(), name.into());
        map.insert(
            "parent".into(),
            parent.map(Value::from).unwrap_or(Value::Null),
        );
        map.insert("data".into(), Value::Object(Map::new()));
        Self(map)
    }

    /// A project document. Projects have no parent.
    pub fn project(name: &str) -> Self {
        let mut doc = Self::typed(DocumentType::Project, name, None);
        doc.insert("config", Value::Object(Map::new()));
        doc
    }

    pub fn asset(name: &str, parent: DocumentId) -> Self {
        Self::typed(DocumentType::Asset, name, Some(parent))
    }

    pub fn subset(name: &str, parent: DocumentId) -> Self {
        Self::typed(DocumentType::Subset, name, Some(parent))
    }

    pub fn version(name: i64, parent: DocumentId) -> Self {
        Self::typed(DocumentType::Version, name, Some(parent))
    }

    /// A hero version under `parent` pointing at the version `target`.
    pub fn hero_version(parent: DocumentId, target: DocumentId) -> Self {
        let mut doc = Self::typed(DocumentType::HeroVersion, Value::Null, Some(parent));
        doc.0.remove("name");
        doc.insert("version_id", target);
        doc
    }

    pub fn representation(name: &str, parent: DocumentId) -> Self {
        Self::typed(DocumentType::Representation, name, Some(parent))
    }

    /// Builder-style replacement of the `data` payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.0.insert("data".into(), data);
        self
    }

    /// Builder-style insertion of an arbitrary top-level field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Convert from a JSON value. Fails unless the value is an object.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(TypeError::NotAnObject),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a dotted path such as `data.template`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.to_string(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `_id` field, if present and well-formed.
    pub fn id(&self) -> Option<DocumentId> {
        self.0.get("_id").and_then(Value::as_str).and_then(|s| s.parse().ok())
    }

    pub fn doc_type(&self) -> Option<DocumentType> {
        self.0
            .get("type")
            .and_then(Value::as_str)
            .map(DocumentType::parse)
    }

    /// The `parent` reference. `null` and a missing field both mean "no parent".
    pub fn parent(&self) -> Option<DocumentId> {
        self.0
            .get("parent")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// The `name` field as a string. Version names are numbers; see
    /// [`Document::name_value`] and [`Document::version_ref`].
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn name_value(&self) -> Option<&Value> {
        self.0.get("name")
    }

    pub fn schema(&self) -> Option<&str> {
        self.0.get("schema").and_then(Value::as_str)
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.0.get("data").and_then(Value::as_object)
    }

    /// A field of the `data` payload.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data().and_then(|data| data.get(key))
    }

    /// Mutable access to `data`, creating an empty object when absent.
    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("data was just normalized to an object"),
        }
    }

    pub fn set_data(&mut self, data: Value) {
        self.0.insert("data".into(), data);
    }

    /// Interpret this document as a version reference.
    ///
    /// Returns `None` for documents that are neither versions nor hero
    /// versions, or whose key fields are malformed.
    pub fn version_ref(&self) -> Option<VersionRef> {
        match self.doc_type()? {
            DocumentType::Version => Some(VersionRef::Regular {
                name: self.0.get("name")?.as_i64()?,
            }),
            DocumentType::HeroVersion => Some(VersionRef::Hero {
                target: self.0.get("version_id")?.as_str()?.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Resolve a dotted path (`a.b.c`) inside a JSON object.
pub fn lookup_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(inner) => inner.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
