//! Structural validation of documents and sessions.
//!
//! The database only relies on a narrow `validate(document)` contract. The
//! [`SchemaValidator`] trait is that contract; [`StructuralValidator`] is the
//! built-in implementation that checks the `schema` tag and the fields each
//! document kind cannot live without. Full JSON-schema validation can be
//! plugged in by implementing the trait.

use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Major/minor version parsed from a schema tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    /// Extract the version from a tag such as `atrium-core:subset-3.0`.
    ///
    /// Tags that do not follow `{root}:{kind}-{major}.{minor}` yield `0.0`
    /// rather than an error, so old or foreign documents stay readable.
    pub fn of(tag: &str) -> Self {
        parse_tag(tag)
            .map(|(_, _, version)| version)
            .unwrap_or(Self { major: 0, minor: 0 })
    }
}

/// Split a schema tag into `(root, kind, version)`.
pub fn parse_tag(tag: &str) -> Option<(&str, &str, SchemaVersion)> {
    let (root, rest) = tag.split_once(':')?;
    if root.is_empty() {
        return None;
    }
    let (kind, version) = rest.rsplit_once('-')?;
    if kind.is_empty() {
        return None;
    }
    let (major, minor) = version.split_once('.')?;
    Some((
        root,
        kind,
        SchemaVersion {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        },
    ))
}

/// The `validate(document)` contract used before writes.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Map<String, Value>) -> Result<(), SchemaError>;
}

/// Required-field checks keyed by the kind part of the schema tag.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy)]
enum Shape {
    String,
    Integer,
    Object,
    Any,
}

impl Shape {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Object => "an object",
            Self::Any => "present",
        }
    }
}

fn required_fields(kind: &str) -> Option<&'static [(&'static str, Shape)]> {
    use Shape::*;
    let fields: &'static [(&'static str, Shape)] = match kind {
        "project" => &[("name", String), ("type", String), ("data", Object), ("config", Object)],
        "asset" => &[("name", String), ("type", String), ("parent", String), ("data", Object)],
        "subset" => &[("name", String), ("type", String), ("parent", String), ("data", Object)],
        "version" => &[("name", Integer), ("type", String), ("parent", String), ("data", Object)],
        "hero_version" | "master_version" => {
            &[("type", String), ("parent", String), ("version_id", String)]
        }
        "representation" => &[("name", String), ("type", String), ("parent", String), ("data", Object)],
        "thumbnail" => &[("type", String), ("data", Object)],
        "container" => &[("id", String), ("name", String), ("loader", String), ("representation", Any)],
        "session" => &[],
        _ => return None,
    };
    Some(fields)
}

impl SchemaValidator for StructuralValidator {
    fn validate(&self, document: &Map<String, Value>) -> Result<(), SchemaError> {
        let tag = document
            .get("schema")
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingSchema)?;
        let (_, kind, _) = parse_tag(tag).ok_or_else(|| SchemaError::Malformed(tag.to_string()))?;
        let fields = required_fields(kind).ok_or_else(|| SchemaError::Unknown(tag.to_string()))?;

        for (field, shape) in fields {
            let value = document.get(*field).ok_or_else(|| SchemaError::MissingField {
                schema: tag.to_string(),
                field: field.to_string(),
            })?;
            if !shape.accepts(value) {
                return Err(SchemaError::InvalidField {
                    schema: tag.to_string(),
                    field: field.to_string(),
                    expected: shape.describe().to_string(),
                });
            }
        }

        // The type tag must agree with the schema kind.
        if let Some(doc_type) = document.get("type").and_then(Value::as_str) {
            let agrees = doc_type == kind
                || matches!(
                    (doc_type, kind),
                    ("master_version", "hero_version") | ("hero_version", "master_version")
                );
            if !agrees {
                return Err(SchemaError::InvalidField {
                    schema: tag.to_string(),
                    field: "type".into(),
                    expected: format!("\"{kind}\""),
                });
            }
        }

        if kind == "session" {
            for (key, value) in document {
                if !value.is_string() {
                    return Err(SchemaError::InvalidField {
                        schema: tag.to_string(),
                        field: key.clone(),
                        expected: Shape::String.describe().to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
