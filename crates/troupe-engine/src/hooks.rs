//! Post-processing hooks referenced by `output.post_processing`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Transforms a step's output before `format` and `append_to` are applied.
pub trait PostProcessor: Send + Sync {
  fn process(&self, output: Value) -> Result<Value, String>;
}

impl<F> PostProcessor for F
where
  F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
  fn process(&self, output: Value) -> Result<Value, String> {
    self(output)
  }
}

/// Hooks keyed by the name steps refer to them by.
#[derive(Clone, Default)]
pub struct HookRegistry {
  hooks: HashMap<String, Arc<dyn PostProcessor>>,
}

impl HookRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, name: impl Into<String>, hook: impl PostProcessor + 'static) {
    self.hooks.insert(name.into(), Arc::new(hook));
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn PostProcessor>> {
    self.hooks.get(name).cloned()
  }
}

impl std::fmt::Debug for HookRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HookRegistry")
      .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_closure_hook() {
    let mut hooks = HookRegistry::new();
    hooks.register("upper", |v: Value| {
      v.as_str()
        .map(|s| json!(s.to_uppercase()))
        .ok_or_else(|| "expected a string".to_string())
    });

    let hook = hooks.get("upper").unwrap();
    assert_eq!(hook.process(json!("hi")).unwrap(), json!("HI"));
    assert!(hook.process(json!(1)).is_err());
    assert!(hooks.get("missing").is_none());
  }
}
