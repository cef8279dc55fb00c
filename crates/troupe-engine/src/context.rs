//! The shared variable store threaded through every step.
//!
//! Every operation takes the lock once, so a single read/modify/write (such as
//! pushing onto a list) is atomic. Nothing orders writes from steps that do not
//! depend on each other: when two of them write the same key the last writer wins.

use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct ContextStore {
  inner: Arc<RwLock<Map<String, Value>>>,
}

impl ContextStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_map(map: Map<String, Value>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(map)),
    }
  }

  /// A point-in-time copy for template rendering.
  pub fn snapshot(&self) -> Map<String, Value> {
    self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn get(&self, key: &str) -> Option<Value> {
    self
      .inner
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(key)
      .cloned()
  }

  pub fn contains(&self, key: &str) -> bool {
    self
      .inner
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .contains_key(key)
  }

  pub fn set(&self, key: impl Into<String>, value: Value) {
    self
      .inner
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(key.into(), value);
  }

  /// Push onto the list under `key`. A missing or null value starts a new list;
  /// any other non-list value becomes the list's first element.
  pub fn push(&self, key: &str, value: Value) {
    let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    match slot {
      Value::Array(items) => items.push(value),
      Value::Null => *slot = Value::Array(vec![value]),
      other => {
        let existing = other.take();
        *other = Value::Array(vec![existing, value]);
      }
    }
  }

  /// Replace the whole store.
  pub fn restore(&self, map: Map<String, Value>) {
    *self.inner.write().unwrap_or_else(|e| e.into_inner()) = map;
  }
}
