use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use troupe_config::FunctionDef;

use crate::error::CompletionError;
use crate::message::Message;
use crate::stream::{CompletionStream, StreamChunk};

/// The agent on whose behalf a completion is requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
  pub name: String,
  pub description: String,
  /// Overrides the provider's default model.
  pub model: Option<String>,
  /// Functions the model may call while answering.
  pub functions: Vec<FunctionDef>,
}

/// Everything a completion call needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionRequest {
  /// The workflow step issuing the request.
  pub step: String,
  pub agent: AgentProfile,
  /// System instructions first, then trailing history.
  pub messages: Vec<Message>,
  /// Snapshot of the context variables.
  pub context: serde_json::Map<String, serde_json::Value>,
}

/// A language-model completion service.
#[async_trait]
pub trait Completion: Send + Sync {
  /// Produce the full response text.
  async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

  /// Produce the response as a chunk stream terminated by an `end` chunk.
  ///
  /// The default implementation emits the full `complete` result as one chunk.
  async fn complete_stream(
    &self,
    request: CompletionRequest,
  ) -> Result<CompletionStream, CompletionError> {
    let text = self.complete(request).await?;
    let chunks = vec![Ok(StreamChunk::content(text)), Ok(StreamChunk::end())];
    Ok(Box::pin(stream::iter(chunks)))
  }
}
