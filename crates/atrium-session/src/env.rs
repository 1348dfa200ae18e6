//! Access to environment variables.
//!
//! Sessions read their values from, and mirror their changes back into, an
//! [`Environment`]. Production code uses [`ProcessEnvironment`]; tests use a
//! private [`MapEnvironment`] so they never race on the real process table.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// A mutable table of environment variables.
pub trait Environment: Send + Sync {
    /// Read a variable. Unset and non-unicode variables are `None`.
    fn var(&self, key: &str) -> Option<String>;

    fn set_var(&self, key: &str, value: &str);

    fn remove_var(&self, key: &str);
}

/// The real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set_var(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn remove_var(&self, key: &str) {
        std::env::remove_var(key);
    }
}

/// The login name from `USER`, falling back to `USERNAME`.
pub fn login_name(env: &dyn Environment) -> Option<String> {
    ["USER", "USERNAME"]
        .into_iter()
        .filter_map(|key| env.var(key))
        .find(|name| !name.is_empty())
}

/// In-memory environment for tests and embedding.
#[derive(Debug, Default)]
pub struct MapEnvironment {
    vars: RwLock<BTreeMap<String, String>>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(self, key: &str, value: &str) -> Self {
        self.set_var(key, value);
        self
    }

    /// Copy of all variables.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.read().expect("environment lock poisoned").clone()
    }
}

impl Environment for MapEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .read()
            .expect("environment lock poisoned")
            .get(key)
            .cloned()
    }

    fn set_var(&self, key: &str, value: &str) {
        self.vars
            .write()
            .expect("environment lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove_var(&self, key: &str) {
        self.vars
            .write()
            .expect("environment lock poisoned")
            .remove(key);
    }
}
