use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a workflow document.
///
/// These are configuration errors: fatal, surfaced immediately, never retried.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("failed to read workflow file '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The document is not valid YAML/JSON or does not match the schema
  /// (serde names the missing or malformed field in the message).
  #[error("malformed workflow document: {message}")]
  Parse { message: String },

  #[error("missing required field: {field}")]
  MissingField { field: String },

  #[error("invalid field '{field}': {message}")]
  InvalidField { field: String, message: String },

  #[error("duplicate step name: {0}")]
  DuplicateStep(String),

  #[error("duplicate agent name: {0}")]
  DuplicateAgent(String),
}

impl WorkflowError {
  pub fn missing(field: impl Into<String>) -> Self {
    Self::MissingField {
      field: field.into(),
    }
  }

  pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidField {
      field: field.into(),
      message: message.into(),
    }
  }
}
