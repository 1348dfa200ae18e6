//! In-process event bus.
//!
//! The bus only keeps weak references to callbacks. A subscription lives as
//! long as the [`Subscription`] handle returned by [`EventBus::on`]; drop
//! the handle and the callback silently stops firing.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, error};

type Callback = dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync;

/// Keeps a callback subscribed.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    event: String,
    callback: Arc<Callback>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("event", &self.event).finish()
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Weak<Callback>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` on every `event` while the returned handle lives.
    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: Arc<Callback> = Arc::new(callback);
        self.subscribers
            .write()
            .expect("event lock poisoned")
            .entry(event.to_string())
            .or_default()
            .push(Arc::downgrade(&callback));
        Subscription {
            event: event.to_string(),
            callback,
        }
    }

    /// Subscribe to `before_{event}`.
    pub fn before<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(&format!("before_{event}"), callback)
    }

    /// Subscribe to `after_{event}`.
    pub fn after<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(&format!("after_{event}"), callback)
    }

    /// Remove a subscription before its handle is dropped.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut subscribers = self.subscribers.write().expect("event lock poisoned");
        if let Some(list) = subscribers.get_mut(&subscription.event) {
            let target = Arc::downgrade(&subscription.callback);
            list.retain(|weak| !weak.ptr_eq(&target));
        }
    }

    /// Live subscribers of `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .read()
            .expect("event lock poisoned")
            .get(event)
            .map_or(0, |list| list.iter().filter(|w| w.strong_count() > 0).count())
    }

    /// Call every live subscriber of `event` with `args`.
    ///
    /// A callback that errors or panics is logged and the rest still run.
    /// Returns how many callbacks ran without failing.
    pub fn emit(&self, event: &str, args: &Value) -> usize {
        let live: Vec<Arc<Callback>> = {
            let mut subscribers = self.subscribers.write().expect("event lock poisoned");
            let Some(list) = subscribers.get_mut(event) else {
                return 0;
            };
            list.retain(|weak| weak.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        debug!(event, subscribers = live.len(), "emitting event");

        let mut succeeded = 0;
        for callback in live {
            match catch_unwind(AssertUnwindSafe(|| callback(args))) {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(err)) => error!(event, error = %format!("{err:#}"), "event callback failed"),
                Err(_) => error!(event, "event callback panicked"),
            }
        }
        succeeded
    }
}
