use std::sync::Arc;

use crate::directory::DirectoryConnector;
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryConnector;
use crate::mongo::MongoConnector;
use crate::traits::{DocumentStore, StoreConnector};

/// The scheme part of a connection URL, e.g. `mongodb` or `file`.
pub fn scheme(url: &str) -> StoreResult<&str> {
    let (scheme, _) = url
        .split_once("://")
        .ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
        return Err(StoreError::InvalidUrl(url.to_string()));
    }
    Ok(scheme)
}

/// Dispatches on the URL scheme.
///
/// `mongodb://`, `mongodb+srv://`, `memory://` and `file://` are built in.
/// Applications register further schemes, or replace a built-in one, with
/// [`with_scheme`].
///
/// [`with_scheme`]: UrlConnector::with_scheme
pub struct UrlConnector {
    memory: Arc<InMemoryConnector>,
    extra: Vec<(String, Arc<dyn StoreConnector>)>,
}

impl UrlConnector {
    pub fn new() -> Self {
        Self {
            memory: Arc::new(InMemoryConnector::new()),
            extra: Vec::new(),
        }
    }

    /// Use `memory` for `memory://` URLs, so callers can share stores.
    pub fn with_memory(mut self, memory: Arc<InMemoryConnector>) -> Self {
        self.memory = memory;
        self
    }

    /// Route `scheme://` URLs to `connector`. Later registrations win.
    pub fn with_scheme(mut self, scheme: &str, connector: Arc<dyn StoreConnector>) -> Self {
        self.extra.insert(0, (scheme.to_string(), connector));
        self
    }
}

impl Default for UrlConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConnector for UrlConnector {
    fn connect(&self, url: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        let scheme = scheme(url)?;
        if let Some((_, connector)) = self.extra.iter().find(|(s, _)| s == scheme) {
            return connector.connect(url);
        }
        match scheme {
            "memory" => self.memory.connect(url),
            "file" => DirectoryConnector.connect(url),
            "mongodb" | "mongodb+srv" => MongoConnector.connect(url),
            other => Err(StoreError::UnsupportedScheme(other.to_string())),
        }
    }
}
