use serde::{Deserialize, Serialize};

/// Declaration of a function an agent may call through the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
  /// Function name, e.g. "web_search"
  pub name: String,

  #[serde(default)]
  pub description: String,

  /// JSON Schema of the function arguments.
  #[serde(default = "empty_parameters")]
  pub parameters: serde_json::Value,
}

fn empty_parameters() -> serde_json::Value {
  serde_json::json!({ "type": "object", "properties": {} })
}
