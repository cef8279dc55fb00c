use serde::{Deserialize, Serialize};

use crate::enums::{ExecutionMode, OutputType};
use crate::template::Template;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Stable iteration order. Correctness comes from `prerequisite`, not from this.
  #[serde(default)]
  pub order: i64,
  /// Agent name, or a template resolving to one (e.g. `{{ active_agent }}`).
  pub agent: Template,
  #[serde(default)]
  pub execution: ExecutionMode,
  #[serde(default)]
  pub prerequisite: Vec<String>,
  /// Model output after the first occurrence of this marker is discarded.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stop_character: Option<String>,
  pub output: OutputDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  /// Context variable the step output is written to.
  pub name: String,
  #[serde(default, rename = "type")]
  pub output_type: OutputType,
  /// For `json` outputs, the key projected out of the parsed object.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  /// Name of a registered post-processing hook.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub post_processing: Option<String>,
  /// Re-renders the final output as a string.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<Template>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub append_to: Vec<AppendTarget>,
}

/// A list variable the step output is additionally pushed onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendTarget {
  pub variable: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<Template>,
}
