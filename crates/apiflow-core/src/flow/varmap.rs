//! Run-scoped variable store shared by expressions, scripts and nodes.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

/// Reserved key. Expressions see the whole map under it, so both `token`
/// and `var.token` resolve. Loops also store their current iteration under
/// it, and those fields (`index`, `key`, `value`) are merged on top.
pub const VAR_ALIAS: &str = "var";

/// Shared, cloneable handle to a run's variables.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    // A panic while holding the lock cannot leave a Map half-written, so
    // a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Set `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().shift_remove(key)
    }

    /// Put back a value saved from [`VarMap::set`]: `None` removes the key.
    pub fn restore(&self, key: &str, previous: Option<Value>) {
        match previous {
            Some(v) => {
                self.set(key, v);
            }
            None => {
                self.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.read().clone()
    }

    /// Entries at top level plus [`VAR_ALIAS`] pointing at the whole map,
    /// with the innermost loop binding merged over it.
    pub fn expression_context(&self) -> Value {
        let mut alias = self.snapshot();
        let binding = alias.shift_remove(VAR_ALIAS);
        let mut ctx = alias.clone();
        if let Some(Value::Object(fields)) = binding {
            alias.extend(fields);
        }
        ctx.insert(VAR_ALIAS.to_string(), Value::Object(alias));
        Value::Object(ctx)
    }
}
