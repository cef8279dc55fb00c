//! Provider settings.
//!
//! A providers file maps a provider name (the workflow's `llm_provider`) to the
//! endpoint and model defaults used by [`crate::OpenAiClient`]:
//!
//! ```yaml
//! openai:
//!   base_url: https://api.openai.com/v1
//!   api_key_env: OPENAI_API_KEY
//!   default_model: gpt-4o-mini
//!   temperature: 0.2
//! ollama:
//!   base_url: http://localhost:11434/v1
//!   default_model: llama3.1
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Endpoint and model defaults for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
  pub base_url: String,
  /// Literal api key. Takes precedence over `api_key_env`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,
  /// Environment variable holding the api key.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key_env: Option<String>,
  pub default_model: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_new_tokens: Option<u32>,
}

impl ProviderSettings {
  /// Resolve the api key. Providers without one (e.g. a local Ollama) yield `None`.
  pub fn resolve_api_key(&self, provider: &str) -> Result<Option<String>, ProviderError> {
    if let Some(key) = &self.api_key {
      return Ok(Some(key.clone()));
    }
    match &self.api_key_env {
      Some(env) => std::env::var(env)
        .map(Some)
        .map_err(|_| ProviderError::MissingApiKey {
          provider: provider.to_string(),
          env: env.clone(),
        }),
      None => Ok(None),
    }
  }
}

/// All configured providers, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Providers {
  providers: HashMap<String, ProviderSettings>,
}

impl Providers {
  /// Default location: `~/.troupe/providers.yaml`.
  pub fn default_path() -> Result<PathBuf, ProviderError> {
    dirs::home_dir()
      .map(|home| home.join(".troupe").join("providers.yaml"))
      .ok_or(ProviderError::NoHomeDir)
  }

  pub fn from_yaml(text: &str) -> Result<Self, ProviderError> {
    serde_yaml::from_str(text).map_err(|e| ProviderError::Parse {
      message: e.to_string(),
    })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ProviderError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml(&text)
  }

  pub fn get(&self, name: &str) -> Result<&ProviderSettings, ProviderError> {
    self
      .providers
      .get(name)
      .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
  }

  pub fn insert(&mut self, name: impl Into<String>, settings: ProviderSettings) {
    self.providers.insert(name.into(), settings);
  }
}
