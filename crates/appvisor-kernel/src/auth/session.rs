use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::traits::SessionStorage;

/// Process-local session storage, the default `storage` implementation.
///
/// The default factory hands every context of a kernel the same instance,
/// so it models a single client. Hosts serving several clients register
/// their own `storage` implementation keyed by the client's session id.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl SessionStorage for MemorySession {
    fn read(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn write(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }

    fn destroy(&self) {
        self.values.write().clear();
    }
}
