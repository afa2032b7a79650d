//! Named hooks used as extension points.
//!
//! The control point publishes `upnp.device_added` and `upnp.device_removed`;
//! [`CallableService`](crate::services::callable) exposes any hook over SOAP.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEVICE_ADDED: &str = "upnp.device_added";
pub const DEVICE_REMOVED: &str = "upnp.device_removed";

pub type HookFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

#[derive(Default, Clone)]
pub struct HookBus {
    hooks: Arc<RwLock<HashMap<String, Vec<HookFn>>>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, hook: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Drops every callback registered under `name`.
    pub fn unregister(&self, name: &str) -> bool {
        self.hooks.write().remove(name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.hooks.read().contains_key(name)
    }

    /// Calls every callback of `name` in registration order and returns the
    /// result of the last one. An error from any callback stops the chain.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, String> {
        let hooks = match self.hooks.read().get(name) {
            Some(hooks) => hooks.clone(),
            None => return Err(format!("no hook registered for '{}'", name)),
        };

        let mut result = Value::Null;
        for hook in hooks {
            result = hook(args.clone())?;
        }
        Ok(result)
    }

    /// Fire-and-forget notification; missing hooks and errors are only logged.
    pub fn publish(&self, name: &str, args: Value) {
        if !self.is_registered(name) {
            return;
        }
        match self.call(name, args) {
            Ok(_) => debug!(hook = name, "hook notified"),
            Err(e) => warn!(hook = name, "hook failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_call_returns_last_result() {
        let bus = HookBus::new();
        bus.register("echo", |v| Ok(json!({"first": v})));
        bus.register("echo", |v| Ok(json!({"second": v})));

        assert_eq!(bus.call("echo", json!(1)).unwrap(), json!({"second": 1}));
    }

    #[test]
    fn test_missing_hook() {
        let bus = HookBus::new();
        assert!(bus.call("nope", Value::Null).is_err());
        bus.register("x", |_| Ok(Value::Null));
        assert!(bus.unregister("x"));
        assert!(!bus.is_registered("x"));
    }

    #[test]
    fn test_publish_counts() {
        let bus = HookBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.register(DEVICE_ADDED, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        bus.publish(DEVICE_ADDED, json!({"usn": "uuid:1"}));
        bus.publish(DEVICE_REMOVED, json!({"usn": "uuid:1"}));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
