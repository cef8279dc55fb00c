use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// Stream of chunks produced by a streaming completion.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, CompletionError>> + Send>>;

/// Delimiter carried by a chunk that closes a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delim {
  End,
}

/// A piece of streamed model output.
///
/// A message is a run of content chunks closed by a chunk whose `delim` is `end`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delim: Option<Delim>,
}

impl StreamChunk {
  pub fn content(content: impl Into<String>) -> Self {
    Self {
      content: Some(content.into()),
      delim: None,
    }
  }

  pub fn end() -> Self {
    Self {
      content: None,
      delim: Some(Delim::End),
    }
  }

  pub fn is_end(&self) -> bool {
    self.delim == Some(Delim::End)
  }
}

/// Drain a stream, concatenating content until the `end` chunk (or stream close).
pub async fn collect_text(mut stream: CompletionStream) -> Result<String, CompletionError> {
  let mut text = String::new();
  while let Some(chunk) = stream.next().await {
    let chunk = chunk?;
    if let Some(content) = &chunk.content {
      text.push_str(content);
    }
    if chunk.is_end() {
      break;
    }
  }
  Ok(text)
}

#[cfg(test)]
mod tests {
  use futures::stream;

  use super::*;

  #[tokio::test]
  async fn test_collect_text_stops_at_end() {
    let chunks = vec![
      Ok(StreamChunk::content("Hel")),
      Ok(StreamChunk::content("lo")),
      Ok(StreamChunk::end()),
      Ok(StreamChunk::content("ignored")),
    ];
    let text = collect_text(Box::pin(stream::iter(chunks))).await.unwrap();
    assert_eq!(text, "Hello");
  }

  #[test]
  fn test_end_chunk_wire_format() {
    let json = serde_json::to_value(StreamChunk::end()).unwrap();
    assert_eq!(json, serde_json::json!({ "delim": "end" }));
  }
}
