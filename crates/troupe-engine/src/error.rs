//! Engine error types.

use troupe_completion::CompletionError;

/// Errors that can occur while executing a workflow.
///
/// Any of these fails the current scheduler pass; the executor then retries the
/// whole workflow.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The step's agent (after rendering) names no agent.
  #[error("agent '{agent}' not found for step '{step}'")]
  AgentNotFound { step: String, agent: String },

  /// The `for_each` list variable is missing or not a list.
  #[error("{list} is not iterable (step '{step}')")]
  NotIterable { step: String, list: String },

  /// `for_each` only produces string or list outputs.
  #[error("step '{step}': for_each can only return a list or string")]
  ForEachOutput { step: String },

  #[error("step '{step}': key '{key}' not found in json output")]
  MissingKey { step: String, key: String },

  #[error("step '{step}': post-processing hook '{hook}' is not registered")]
  HookNotFound { step: String, hook: String },

  #[error("step '{step}': post-processing hook '{hook}' failed: {message}")]
  PostProcessing {
    step: String,
    hook: String,
    message: String,
  },

  #[error("template error in step '{step}': {message}")]
  Template { step: String, message: String },

  /// No pending step can ever become ready.
  #[error("cyclic or unsatisfiable dependency among steps: {}", pending.join(", "))]
  CyclicDependency { pending: Vec<String> },

  #[error("completion failed for step '{step}': {source}")]
  Completion {
    step: String,
    #[source]
    source: CompletionError,
  },

  /// A spawned step task panicked or was cancelled.
  #[error("step task failed: {message}")]
  Join { message: String },

  #[error("step not found: {0}")]
  StepNotFound(String),
}
