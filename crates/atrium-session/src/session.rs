use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use atrium_types::{SchemaValidator, StructuralValidator};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::env::{Environment, ProcessEnvironment};
use crate::error::{Result, SessionError};
use crate::keys;

/// Schema tag stamped on every session.
pub const SESSION_SCHEMA: &str = "atrium-core:session-2.0";

/// A session shared between the host context and its database connection.
pub type SharedSession = Arc<RwLock<Session>>;

/// Process-wide configuration derived from the environment.
///
/// The session is an ordered map of string keys to string values. It always
/// carries a `schema` entry. Validation is best-effort: a session that fails
/// its schema is logged and still used, so partially configured environments
/// keep working.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    values: BTreeMap<String, String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An empty session carrying only its schema tag.
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        values.insert("schema".to_string(), SESSION_SCHEMA.to_string());
        Self { values }
    }

    /// Build a session from the documented key table.
    ///
    /// Context keys resolve to an empty string when unset. Global keys fall
    /// back to their documented default, and keys whose default is `None`
    /// are omitted unless the environment sets them. Keys outside the table
    /// are never read.
    pub fn from_environment(
        env: &dyn Environment,
        include_global: bool,
        include_context: bool,
    ) -> Self {
        let mut session = Self::new();

        if include_context {
            for key in keys::CONTEXT_KEYS {
                let value = env.var(key).unwrap_or_default();
                session.values.insert(key.to_string(), value);
            }
        }

        if include_global {
            for (key, default) in keys::GLOBAL_KEYS {
                let value = env
                    .var(key)
                    .filter(|v| !v.is_empty())
                    .or_else(|| default.map(str::to_string));
                if let Some(value) = value {
                    session.values.insert(key.to_string(), value);
                }
            }
        }

        if let Err(err) = session.validate() {
            warn!(error = %err, "session failed validation");
        }
        debug!(keys = session.values.len(), "session read from environment");
        session
    }

    /// [`Session::from_environment`] against the real process environment.
    pub fn from_process_environment(include_global: bool, include_context: bool) -> Self {
        Self::from_environment(&ProcessEnvironment, include_global, include_context)
    }

    /// Wrap into a [`SharedSession`].
    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key`, treating an empty string as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a value without touching the environment.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Remove a value without touching the environment.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if key == "schema" {
            return None;
        }
        self.values.remove(key)
    }

    /// Merge `changes` in place and mirror them into `env`.
    ///
    /// `Some(value)` sets both the session entry and the environment
    /// variable. `None` removes the session entry and unsets the variable.
    /// Host adapters rely on this mirroring to see context switches.
    pub fn update<I, K>(&mut self, changes: I, env: &dyn Environment)
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        for (key, value) in changes {
            let key = key.into();
            match value {
                Some(value) => {
                    env.set_var(&key, &value);
                    self.values.insert(key, value);
                }
                None => {
                    env.remove_var(&key);
                    self.remove(&key);
                }
            }
        }
    }

    /// Merge another session's entries, overwriting existing keys.
    pub fn merge(&mut self, other: &Session) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Keys from `required` that are missing or empty.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|key| self.non_empty(key).is_none())
            .map(|key| key.to_string())
            .collect()
    }

    /// Fail with [`SessionError::MissingKeys`] unless all keys are set.
    pub fn require(&self, required: &[&str]) -> Result<()> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::MissingKeys { keys: missing })
        }
    }

    /// The connection timeout from `ATRIUM_TIMEOUT` (milliseconds).
    pub fn timeout(&self) -> Result<Duration> {
        let raw = self
            .get(keys::TIMEOUT)
            .or_else(|| keys::default_for(keys::TIMEOUT))
            .unwrap_or("1000");
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| SessionError::InvalidValue {
                key: keys::TIMEOUT.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Check the session against its structural schema.
    pub fn validate(&self) -> Result<()> {
        StructuralValidator.validate(&self.to_json())?;
        Ok(())
    }

    /// The session as a JSON object.
    pub fn to_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Session {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut session = Self::new();
        for (key, value) in iter {
            session.set(key, value);
        }
        session
    }
}
