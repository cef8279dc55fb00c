use serde::{Deserialize, Serialize};
use troupe_config::{ForEachDef, FunctionDef, Template};

/// Prompt history window used when an agent does not set `history_length`.
pub const DEFAULT_HISTORY_LENGTH: usize = 100;

/// A resolved agent, ready to be handed to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
  pub name: String,
  pub description: String,
  pub instruction: Template,
  /// Declarations of the functions this agent may call.
  pub functions: Vec<FunctionDef>,
  pub for_each: Option<ForEachDef>,
  pub history_length: usize,
}
