//! The query contract shared by every backend.
//!
//! Filters, sorts, projections and updates follow the shape of a document
//! store query language: a filter is a JSON object mapping dotted field
//! paths either to a literal (equality) or to an operator object such as
//! `{"$in": [...]}`. Backends that keep documents locally evaluate these
//! with [`execute`]; remote backends may translate them instead.

use std::cmp::Ordering;

use atrium_types::document::lookup_path;
use atrium_types::{Document, DocumentId};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A `database.collection` pair. One collection per project.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Like [`new`](Self::new), but rejects names that could escape a
    /// file-backed store or address another database.
    pub fn checked(database: impl Into<String>, collection: impl Into<String>) -> StoreResult<Self> {
        let ns = Self::new(database, collection);
        validate_name("database", &ns.database)?;
        validate_name("collection", &ns.collection)?;
        Ok(ns)
    }

    /// Internal namespaces such as `system.indexes` never hold projects.
    pub fn is_system(collection: &str) -> bool {
        collection.starts_with("system.")
    }
}

const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '\0', '$'];

/// Check a database or collection name.
///
/// Rejects empty names, path separators, `..` and a leading `.`.
pub fn validate_name(kind: &str, name: &str) -> StoreResult<()> {
    let invalid = |reason: String| StoreError::InvalidQuery(format!("invalid {kind} name '{name}': {reason}"));

    if name.is_empty() {
        return Err(invalid("name cannot be empty".into()));
    }
    for ch in FORBIDDEN_NAME_CHARS {
        if name.contains(*ch) {
            return Err(invalid(format!("contains forbidden character: {ch:?}")));
        }
    }
    if name.contains("..") {
        return Err(invalid("cannot contain '..'".into()));
    }
    if name.starts_with('.') {
        return Err(invalid("cannot start with '.'".into()));
    }
    Ok(())
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

const FILTER_OPERATORS: &[&str] = &["$eq", "$ne", "$in", "$nin", "$exists", "$gt", "$gte", "$lt", "$lte"];

/// A selection predicate over documents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    /// The empty filter matches every document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// `{field: value}`.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new().and(field, value)
    }

    /// `{"_id": id}`.
    pub fn by_id(id: DocumentId) -> Self {
        Self::eq("_id", id)
    }

    /// Add a condition. A later condition on the same field replaces the
    /// earlier one.
    pub fn and(mut self, field: &str, condition: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), condition.into());
        self
    }

    /// Parse a filter object, rejecting unknown operators.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        let Value::Object(map) = value else {
            return Err(StoreError::InvalidQuery("filter must be an object".into()));
        };
        for (field, condition) in &map {
            if let Some(ops) = operator_object(condition) {
                for op in ops.keys() {
                    if !FILTER_OPERATORS.contains(&op.as_str()) {
                        return Err(StoreError::InvalidQuery(format!(
                            "unknown operator '{op}' on field '{field}'"
                        )));
                    }
                }
            }
        }
        Ok(Self(map))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns `true` if `document` satisfies every condition.
    pub fn matches(&self, document: &Document) -> bool {
        self.0.iter().all(|(field, condition)| {
            let actual = lookup_path(document.as_map(), field);
            match operator_object(condition) {
                Some(ops) => ops.iter().all(|(op, operand)| apply_operator(op, operand, actual)),
                None => equals(actual, condition),
            }
        })
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// An object whose keys all start with `$` is an operator object.
fn operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn apply_operator(op: &str, operand: &Value, actual: Option<&Value>) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(actual, item))),
        "$nin" => operand
            .as_array()
            .map_or(true, |items| !items.iter().any(|item| equals(actual, item))),
        "$exists" => {
            let wanted = operand.as_bool().unwrap_or(true);
            actual.is_some() == wanted
        }
        "$gt" => ordered(actual, operand, |o| o == Ordering::Greater),
        "$gte" => ordered(actual, operand, |o| o != Ordering::Less),
        "$lt" => ordered(actual, operand, |o| o == Ordering::Less),
        "$lte" => ordered(actual, operand, |o| o != Ordering::Greater),
        _ => false,
    }
}

/// Equality with store semantics: `null` matches a missing field, and a
/// scalar matches an array field containing it.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Range comparisons only hold between values of the same kind.
fn ordered(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if type_rank(actual) != type_rank(operand) {
        return false;
    }
    accept(compare_values(actual, operand))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values used for sorting.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Sort / Projection / FindOptions
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered sort keys. Earlier keys take precedence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort(Vec<(String, SortOrder)>);

impl Sort {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn ascending(field: &str) -> Self {
        Self::new().then(field, SortOrder::Ascending)
    }

    pub fn descending(field: &str) -> Self {
        Self::new().then(field, SortOrder::Descending)
    }

    pub fn then(mut self, field: &str, order: SortOrder) -> Self {
        self.0.push((field.to_string(), order));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `{field: 1 | -1, ...}` in key order.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (field, order) in &self.0 {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            out.insert(field.clone(), Value::from(direction));
        }
        Value::Object(out)
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, order) in &self.0 {
            let left = lookup_path(a.as_map(), field).unwrap_or(&Value::Null);
            let right = lookup_path(b.as_map(), field).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Fields to keep in returned documents. `_id` is always kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection(Vec<String>);

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// `{field: 1, ...}`.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|f| (f.clone(), Value::from(1))).collect())
    }

    pub fn apply(&self, document: &Document) -> Document {
        let mut out = Map::new();
        if let Some(id) = document.get("_id") {
            out.insert("_id".into(), id.clone());
        }
        for field in &self.0 {
            if let Some(value) = lookup_path(document.as_map(), field) {
                set_path(&mut out, field, value.clone());
            }
        }
        Document::from(out)
    }
}

/// Options for `find`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Sort,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(sort: Sort) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Evaluate a query over an in-process document sequence.
///
/// Sorting is stable, so documents with equal keys keep the order in which
/// the backend yielded them.
pub fn execute<'a, I>(documents: I, filter: &Filter, options: &FindOptions) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut hits: Vec<&Document> = documents.into_iter().filter(|d| filter.matches(d)).collect();
    if !options.sort.is_empty() {
        hits.sort_by(|a, b| options.sort.compare(a, b));
    }
    let limit = options.limit.unwrap_or(usize::MAX);
    hits.into_iter()
        .skip(options.skip)
        .take(limit)
        .map(|doc| match &options.projection {
            Some(projection) => projection.apply(doc),
            None => doc.clone(),
        })
        .collect()
}

/// Unique values of `field` across `documents`, flattening arrays.
pub fn distinct_values<'a, I>(documents: I, field: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut out: Vec<Value> = Vec::new();
    let mut push = |value: &Value| {
        if !out.iter().any(|seen| values_equal(seen, value)) {
            out.push(value.clone());
        }
    };
    for doc in documents {
        match lookup_path(doc.as_map(), field) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// A modification applied by `update_many`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    set: Map<String, Value>,
    unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{"$set": {field: value}}`.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.insert(field.to_string(), value.into());
        self
    }

    /// `{"$unset": {field: ""}}`.
    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    /// Parse an update document with `$set` and `$unset` sections.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        let Value::Object(map) = value else {
            return Err(StoreError::InvalidQuery("update must be an object".into()));
        };
        let mut update = Self::new();
        for (op, fields) in map {
            let Value::Object(fields) = fields else {
                return Err(StoreError::InvalidQuery(format!("'{op}' takes an object")));
            };
            match op.as_str() {
                "$set" => update.set.extend(fields),
                "$unset" => update.unset.extend(fields.into_iter().map(|(k, _)| k)),
                other => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unsupported update operator '{other}'"
                    )))
                }
            }
        }
        if update.set.contains_key("_id") || update.unset.iter().any(|f| f == "_id") {
            return Err(StoreError::InvalidQuery("'_id' is immutable".into()));
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// The `{"$set": ..., "$unset": ...}` form. Empty sections are left out.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if !self.set.is_empty() {
            out.insert("$set".into(), Value::Object(self.set.clone()));
        }
        if !self.unset.is_empty() {
            let fields = self.unset.iter().map(|f| (f.clone(), Value::from(""))).collect();
            out.insert("$unset".into(), Value::Object(fields));
        }
        Value::Object(out)
    }

    /// Apply in place. `$set` runs before `$unset`.
    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.set {
            set_path(document.as_map_mut(), field, value.clone());
        }
        for field in &self.unset {
            unset_path(document.as_map_mut(), field);
        }
    }
}

fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(map: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            map.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = map.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

/// Give `document` an `_id` if it has none and return it.
pub fn ensure_id(document: &mut Document) -> DocumentId {
    match document.id() {
        Some(id) => id,
        None => {
            let id = DocumentId::new();
            document.insert("_id", id);
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    // ----- Filter -----

    #[test]
    fn literal_equality_and_null_matches_missing() {
        let d = doc(json!({"type": "asset", "parent": null}));
        assert!(Filter::eq("type", "asset").matches(&d));
        assert!(!Filter::eq("type", "subset").matches(&d));
        assert!(Filter::eq("parent", Value::Null).matches(&d));
        assert!(Filter::eq("missing", Value::Null).matches(&d));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let d = doc(json!({"data": {"families": ["model", "rig"], "frame": 1001}}));
        assert!(Filter::eq("data.frame", 1001).matches(&d));
        assert!(Filter::eq("data.frame", 1001.0).matches(&d));
        // a scalar matches an array containing it
        assert!(Filter::eq("data.families", "rig").matches(&d));
        assert!(!Filter::eq("data.families", "anim").matches(&d));
    }

    #[test]
    fn operators() {
        let d = doc(json!({"name": 3, "type": "version"}));
        let cases = [
            (json!({"name": {"$gt": 2}}), true),
            (json!({"name": {"$gte": 3, "$lt": 4}}), true),
            (json!({"name": {"$lte": 2}}), false),
            (json!({"type": {"$in": ["version", "hero_version"]}}), true),
            (json!({"type": {"$nin": ["version"]}}), false),
            (json!({"type": {"$ne": "subset"}}), true),
            (json!({"data": {"$exists": false}}), true),
            (json!({"name": {"$exists": true}}), true),
            (json!({"name": {"$gt": "a"}}), false),
        ];
        for (filter, expected) in cases {
            let filter = Filter::from_value(filter.clone()).unwrap();
            assert_eq!(filter.matches(&d), expected, "{filter:?}");
        }
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(matches!(
            Filter::from_value(json!({"name": {"$regex": "^b"}})),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(Filter::from_value(json!([1])).is_err());
    }

    #[test]
    fn plain_object_literal_is_equality() {
        let d = doc(json!({"context": {"asset": "bruce"}}));
        assert!(Filter::eq("context", json!({"asset": "bruce"})).matches(&d));
    }

    // ----- execute -----

    #[test]
    fn sort_skip_limit_and_projection() {
        let docs: Vec<Document> = (1..=5)
            .map(|n| doc(json!({"_id": DocumentId::new().to_hex(), "name": n, "type": "version", "data": {"n": n}})))
            .collect();
        let options = FindOptions::sorted(Sort::descending("name"))
            .with_limit(2)
            .with_projection(Projection::include(["name"]));
        let out = execute(&docs, &Filter::eq("type", "version"), &options);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("name"), Some(&json!(5)));
        assert_eq!(out[1].get("name"), Some(&json!(4)));
        assert!(out[0].get("_id").is_some());
        assert!(out[0].get("data").is_none());
    }

    #[test]
    fn missing_sort_field_sorts_first() {
        let docs = vec![doc(json!({"name": "b"})), doc(json!({})), doc(json!({"name": "a"}))];
        let out = execute(&docs, &Filter::new(), &FindOptions::sorted(Sort::ascending("name")));
        let names: Vec<_> = out.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec![None, Some("a"), Some("b")]);
    }

    #[test]
    fn distinct_flattens_arrays() {
        let docs = vec![
            doc(json!({"data": {"families": ["model", "rig"]}})),
            doc(json!({"data": {"families": ["rig", "anim"]}})),
            doc(json!({})),
        ];
        assert_eq!(
            distinct_values(&docs, "data.families"),
            vec![json!("model"), json!("rig"), json!("anim")]
        );
    }

    // ----- Update -----

    #[test]
    fn update_sets_and_unsets_nested_fields() {
        let mut d = doc(json!({"data": {"a": 1, "b": 2}}));
        Update::new().set("data.c", 3).unset("data.a").apply(&mut d);
        assert_eq!(d.get("data"), Some(&json!({"b": 2, "c": 3})));
    }

    #[test]
    fn update_from_value_rejects_id_and_unknown_ops() {
        assert!(Update::from_value(json!({"$set": {"_id": "x"}})).is_err());
        assert!(Update::from_value(json!({"$inc": {"n": 1}})).is_err());
        let update = Update::from_value(json!({"$set": {"data.x": 1}, "$unset": {"old": ""}})).unwrap();
        assert!(!update.is_empty());
    }

    #[test]
    fn ensure_id_keeps_existing() {
        let id = DocumentId::new();
        let mut d = Document::new().with("_id", id);
        assert_eq!(ensure_id(&mut d), id);
        let mut fresh = Document::new();
        let assigned = ensure_id(&mut fresh);
        assert_eq!(fresh.id(), Some(assigned));
    }

    #[test]
    fn system_namespaces() {
        assert!(Namespace::is_system("system.indexes"));
        assert!(!Namespace::is_system("hulk"));
        assert_eq!(Namespace::new("avalon", "hulk").to_string(), "avalon.hulk");
    }

    #[test]
    fn namespace_names_cannot_escape() {
        assert!(Namespace::checked("avalon", "hulk").is_ok());
        assert!(Namespace::checked("avalon", "hulk.v2").is_ok());
        for bad in ["", "..", "../other", "a/b", "a\\b", ".hidden", "x..y"] {
            assert!(
                matches!(Namespace::checked("avalon", bad), Err(StoreError::InvalidQuery(_))),
                "collection {bad:?} should be rejected"
            );
            assert!(
                matches!(Namespace::checked(bad, "hulk"), Err(StoreError::InvalidQuery(_))),
                "database {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn wire_forms() {
        let sort = Sort::descending("name").then("data.order", SortOrder::Ascending);
        assert_eq!(sort.to_value(), json!({"name": -1, "data.order": 1}));
        assert_eq!(Projection::include(["name", "data"]).to_value(), json!({"name": 1, "data": 1}));

        let update = Update::new().set("data.label", "Bruce").unset("data.tmp");
        assert_eq!(update.to_value(), json!({"$set": {"data.label": "Bruce"}, "$unset": {"data.tmp": ""}}));
        assert_eq!(Update::new().to_value(), json!({}));
    }
}
