use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::completion::CompletionRequest;

/// Handler for a function the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
  /// Run the call. `Err` is reported back to the model as the call result.
  ///
  /// `request` is the completion request the model is answering.
  async fn call(
    &self,
    arguments: serde_json::Value,
    request: &CompletionRequest,
  ) -> Result<String, String>;
}

/// Tool handlers keyed by function name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
  tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, name: impl Into<String>, tool: impl Tool + 'static) {
    self.tools.insert(name.into(), Arc::new(tool));
  }

  pub fn contains(&self, name: &str) -> bool {
    self.tools.contains_key(name)
  }

  /// Invoke a tool by name. Unknown tools and tool failures become an error
  /// message for the model instead of failing the completion.
  pub async fn invoke(
    &self,
    name: &str,
    arguments: serde_json::Value,
    request: &CompletionRequest,
  ) -> String {
    let Some(tool) = self.tools.get(name) else {
      warn!(tool = %name, "unknown tool requested");
      return format!("Error: function '{name}' is not available");
    };
    match tool.call(arguments, request).await {
      Ok(result) => result,
      Err(message) => {
        warn!(tool = %name, error = %message, "tool call failed");
        format!("Error: {message}")
      }
    }
  }
}

impl std::fmt::Debug for ToolRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ToolRegistry")
      .field("tools", &self.tools.keys().collect::<Vec<_>>())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Upper;

  #[async_trait]
  impl Tool for Upper {
    async fn call(
      &self,
      arguments: serde_json::Value,
      _request: &CompletionRequest,
    ) -> Result<String, String> {
      arguments["text"]
        .as_str()
        .map(|s| s.to_uppercase())
        .ok_or_else(|| "missing 'text'".to_string())
    }
  }

  #[tokio::test]
  async fn test_invoke_registered_tool() {
    let mut registry = ToolRegistry::new();
    registry.register("upper", Upper);
    let request = CompletionRequest::default();

    let result = registry
      .invoke("upper", serde_json::json!({ "text": "hi" }), &request)
      .await;
    assert_eq!(result, "HI");
  }

  #[tokio::test]
  async fn test_tool_failure_becomes_message() {
    let mut registry = ToolRegistry::new();
    registry.register("upper", Upper);
    let request = CompletionRequest::default();

    let result = registry.invoke("upper", serde_json::json!({}), &request).await;
    assert_eq!(result, "Error: missing 'text'");
  }

  #[tokio::test]
  async fn test_unknown_tool_becomes_message() {
    let registry = ToolRegistry::new();
    let request = CompletionRequest::default();

    let result = registry.invoke("nope", serde_json::Value::Null, &request).await;
    assert!(result.contains("'nope' is not available"));
  }
}
