//! MongoDB backend for `mongodb://` and `mongodb+srv://` URLs.
//!
//! Queries are handed to the server as-is: a [`Filter`] is already in the
//! server's query language. Documents travel as BSON. Top-level `_id` and
//! `parent` strings that hold a 24-character hex id become object ids on
//! the way out and come back as hex strings, so stored hierarchies stay
//! compatible with other tools reading the same database.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atrium_types::{Document, DocumentId};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::FindOptions as MongoFindOptions;
use mongodb::sync::{Client, Collection};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::query::{validate_name, Filter, FindOptions, Namespace, Update};
use crate::traits::{DocumentStore, StoreConnector};

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Fields whose string values are object ids on the server.
const ID_FIELDS: &[&str] = &["_id", "parent"];

/// A [`DocumentStore`] backed by a MongoDB deployment.
///
/// The client connects lazily. Server selection failures and network errors
/// surface as [`StoreError::Disconnected`], so the connection's retry policy
/// applies to them. Add `serverSelectionTimeoutMS` to the URL to bound how
/// long a single operation waits for an unreachable server.
pub struct MongoDocumentStore {
    client: Client,
}

impl MongoDocumentStore {
    /// Parse `url` and build a client. No server is contacted yet.
    pub fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(url).map_err(|err| match err.kind.as_ref() {
            ErrorKind::InvalidArgument { message, .. } => StoreError::InvalidUrl(format!("{url}: {message}")),
            _ => map_error(err),
        })?;
        Ok(Self { client })
    }

    fn collection(&self, ns: &Namespace) -> StoreResult<Collection<BsonDocument>> {
        validate_name("database", &ns.database)?;
        validate_name("collection", &ns.collection)?;
        Ok(self.client.database(&ns.database).collection(&ns.collection))
    }
}

impl DocumentStore for MongoDocumentStore {
    fn ping(&self, timeout: Duration) -> StoreResult<()> {
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = client.database("admin").run_command(doc! { "ping": 1 }, None);
            let _ = tx.send(result);
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result.map(|_| ()).map_err(map_error),
            Err(_) => Err(StoreError::Disconnected(format!(
                "no reply to ping within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn namespaces(&self, database: &str) -> StoreResult<Vec<String>> {
        validate_name("database", database)?;
        let mut names = self
            .client
            .database(database)
            .list_collection_names(None)
            .map_err(map_error)?;
        names.sort();
        Ok(names)
    }

    fn find(&self, ns: &Namespace, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let collection = self.collection(ns)?;
        let mut wire = MongoFindOptions::default();
        if !options.sort.is_empty() {
            wire.sort = Some(to_bson_document(&as_object(options.sort.to_value())));
        }
        if let Some(projection) = &options.projection {
            wire.projection = Some(to_bson_document(&as_object(projection.to_value())));
        }
        if options.skip > 0 {
            wire.skip = Some(options.skip as u64);
        }
        if let Some(limit) = options.limit {
            wire.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = collection
            .find(to_bson_document(filter.as_map()), wire)
            .map_err(map_error)?;
        let mut out = Vec::new();
        for item in cursor {
            out.push(Document::from(from_bson_document(item.map_err(map_error)?)));
        }
        debug!(ns = %ns, count = out.len(), "find");
        Ok(out)
    }

    fn insert(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<DocumentId>> {
        let collection = self.collection(ns)?;
        let mut ids = Vec::with_capacity(documents.len());
        for doc in &documents {
            let id = doc
                .id()
                .ok_or_else(|| StoreError::InvalidQuery("document has no _id".into()))?;
            if ids.contains(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            ids.push(id);
        }
        for (doc, id) in documents.iter().zip(&ids) {
            collection
                .insert_one(to_bson_document(doc.as_map()), None)
                .map_err(|err| match error_code(&err) {
                    Some(DUPLICATE_KEY) => StoreError::DuplicateId(*id),
                    _ => map_error(err),
                })?;
        }
        Ok(ids)
    }

    fn replace_one(&self, ns: &Namespace, filter: &Filter, replacement: Document) -> StoreResult<u64> {
        let collection = self.collection(ns)?;
        let mut body = replacement.into_value();
        if let Value::Object(map) = &mut body {
            map.remove("_id");
        }
        let result = collection
            .replace_one(to_bson_document(filter.as_map()), to_bson_document(&as_object(body)), None)
            .map_err(map_error)?;
        Ok(result.matched_count)
    }

    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<u64> {
        if update.is_empty() {
            return Ok(0);
        }
        let collection = self.collection(ns)?;
        let result = collection
            .update_many(
                to_bson_document(filter.as_map()),
                to_bson_document(&as_object(update.to_value())),
                None,
            )
            .map_err(map_error)?;
        Ok(result.modified_count)
    }

    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<u64> {
        let collection = self.collection(ns)?;
        let result = collection
            .delete_many(to_bson_document(filter.as_map()), None)
            .map_err(map_error)?;
        Ok(result.deleted_count)
    }

    fn drop_namespace(&self, ns: &Namespace) -> StoreResult<()> {
        let collection = self.collection(ns)?;
        match collection.drop(None) {
            Ok(()) => Ok(()),
            Err(err) if error_code(&err) == Some(NAMESPACE_NOT_FOUND) => Ok(()),
            Err(err) => Err(map_error(err)),
        }
    }

    fn distinct(&self, ns: &Namespace, field: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collection = self.collection(ns)?;
        let values = collection
            .distinct(field, to_bson_document(filter.as_map()), None)
            .map_err(map_error)?;
        Ok(values.into_iter().map(from_bson).collect())
    }
}

/// Opens [`MongoDocumentStore`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct MongoConnector;

impl StoreConnector for MongoConnector {
    fn connect(&self, url: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        Ok(Arc::new(MongoDocumentStore::connect(url)?))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

fn error_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// Unreachable servers and dropped sockets are transient, the rest is not.
pub(crate) fn map_error(err: MongoError) -> StoreError {
    let message = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::Disconnected(message),
        ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => StoreError::Serialization(message),
        ErrorKind::InvalidArgument { .. } => StoreError::InvalidQuery(message),
        _ => {
            warn!(error = %message, "database server error");
            StoreError::Backend(message)
        }
    }
}

// ---------------------------------------------------------------------------
// JSON <-> BSON
// ---------------------------------------------------------------------------

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn to_bson_document(map: &Map<String, Value>) -> BsonDocument {
    object_to_bson(None, map)
}

/// Operator keys (`$in`, `$set`, ...) pass the enclosing field name down so
/// `{"_id": {"$in": [...]}}` and `{"$set": {"parent": ...}}` convert ids too.
fn object_to_bson(field: Option<&str>, map: &Map<String, Value>) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (key, value) in map {
        let field = if key.starts_with('$') { field } else { Some(key.as_str()) };
        out.insert(key.clone(), to_bson(field, value));
    }
    out
}

fn to_bson(field: Option<&str>, value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) if field.is_some_and(|f| ID_FIELDS.contains(&f)) => match ObjectId::parse_str(s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s.clone()),
        },
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(|v| to_bson(field, v)).collect()),
        Value::Object(map) => Bson::Document(object_to_bson(field, map)),
    }
}

fn from_bson_document(doc: BsonDocument) -> Map<String, Value> {
    doc.into_iter().map(|(k, v)| (k, from_bson(v))).collect()
}

fn from_bson(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(doc) => Value::Object(from_bson_document(doc)),
        other => other.into_relaxed_extjson(),
    }
}
