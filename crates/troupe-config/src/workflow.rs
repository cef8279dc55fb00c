use serde::{Deserialize, Serialize};

use crate::agent::AgentDef;
use crate::function::FunctionDef;
use crate::step::StepDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow: WorkflowHeader,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub global_variables: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub functions: Vec<FunctionDef>,
  pub agents: Vec<AgentDef>,
  pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHeader {
  /// Selects the completion settings; the engine itself never reads it.
  pub llm_provider: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
}
