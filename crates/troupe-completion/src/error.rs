use std::path::PathBuf;

use thiserror::Error;

/// Errors from a completion call.
///
/// The engine treats every variant as opaque; they fail the step and are handled
/// by the whole-run retry.
#[derive(Debug, Error)]
pub enum CompletionError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The endpoint answered with a non-success status.
  #[error("completion endpoint returned {status}: {body}")]
  Api { status: u16, body: String },

  #[error("invalid completion response: {message}")]
  InvalidResponse { message: String },

  #[error("invalid endpoint url '{url}': {source}")]
  Url {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("model kept calling tools after {turns} turns")]
  ToolTurnsExceeded { turns: usize },

  #[error("stream error: {message}")]
  Stream { message: String },

  #[error("completion failed: {message}")]
  Other { message: String },
}

impl CompletionError {
  pub fn other(message: impl Into<String>) -> Self {
    Self::Other {
      message: message.into(),
    }
  }
}

/// Errors raised while loading provider settings.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("failed to read provider settings '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed provider settings: {message}")]
  Parse { message: String },

  #[error("unknown llm provider: {0}")]
  UnknownProvider(String),

  #[error("provider '{provider}' reads its api key from ${env}, which is not set")]
  MissingApiKey { provider: String, env: String },

  #[error("could not determine home directory")]
  NoHomeDir,
}
