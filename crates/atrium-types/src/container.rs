use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::id::DocumentId;

/// Schema tag written into new containers.
pub const CONTAINER_SCHEMA: &str = "atrium-core:container-2.0";

/// Default marker identifying container records inside host scenes.
pub const CONTAINER_ID: &str = "atrium.container";

/// Provenance record a loader leaves inside a host scene.
///
/// Containers never live in the database. A host enumerates them through
/// `ls()`, and `update`/`switch`/`remove` use `loader` and `representation`
/// to find their way back to the plugin and the published document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Marker string, normally the session's container id key.
    #[serde(default = "default_marker")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Name of the loader plugin that produced this container.
    pub loader: String,
    /// Representation the loaded content came from.
    pub representation: DocumentId,
    /// Host-side node or layer holding the content.
    #[serde(rename = "objectName", default)]
    pub object_name: Option<String>,
    /// Host-specific extras are kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_schema() -> String {
    CONTAINER_SCHEMA.to_string()
}

fn default_marker() -> String {
    CONTAINER_ID.to_string()
}

impl Container {
    pub fn new(name: impl Into<String>, loader: impl Into<String>, representation: DocumentId) -> Self {
        Self {
            schema: default_schema(),
            id: default_marker(),
            name: name.into(),
            namespace: None,
            loader: loader.into(),
            representation,
            object_name: None,
            extra: Map::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_object_name(mut self, object_name: impl Into<String>) -> Self {
        self.object_name = Some(object_name.into());
        self
    }

    /// Parse a container from the JSON a host adapter imprinted.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        serde_json::from_value(value).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
