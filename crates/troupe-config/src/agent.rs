use serde::{Deserialize, Serialize};

use crate::enums::ExecutionMode;
use crate::template::Template;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Instruction template, rendered once per invocation.
  pub instruction: Template,
  /// Names of declared functions this agent may call.
  #[serde(default)]
  pub functions: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub for_each: Option<ForEachDef>,
  /// Number of trailing history messages included in the prompt.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub history_length: Option<usize>,
}

/// Fan-out loop: one agent invocation per element of a list variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachDef {
  /// Variable name each element is bound to while rendering the instruction.
  pub item: String,
  /// Context variable holding the list to iterate.
  pub list: String,
  #[serde(default)]
  pub execution: ExecutionMode,
  /// Per-item variable receiving that item's raw output.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
  /// Per-item format applied before the result is collected.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<Template>,
}
