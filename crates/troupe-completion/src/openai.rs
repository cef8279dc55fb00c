//! Client for OpenAI-compatible chat completion endpoints.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::completion::{AgentProfile, Completion, CompletionRequest};
use crate::error::CompletionError;
use crate::message::Message;
use crate::provider::ProviderSettings;
use crate::stream::{CompletionStream, StreamChunk};
use crate::tool::ToolRegistry;

/// Upper bound on model turns spent resolving tool calls for one completion.
pub const DEFAULT_MAX_TOOL_TURNS: usize = 10;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
  http: reqwest::Client,
  endpoint: Url,
  api_key: Option<String>,
  default_model: String,
  temperature: Option<f32>,
  max_new_tokens: Option<u32>,
  tools: Arc<ToolRegistry>,
  max_tool_turns: usize,
}

impl OpenAiClient {
  /// Build a client from provider settings and an already resolved api key.
  pub fn new(settings: &ProviderSettings, api_key: Option<String>) -> Result<Self, CompletionError> {
    Ok(Self {
      http: reqwest::Client::new(),
      endpoint: chat_completions_url(&settings.base_url)?,
      api_key,
      default_model: settings.default_model.clone(),
      temperature: settings.temperature,
      max_new_tokens: settings.max_new_tokens,
      tools: Arc::new(ToolRegistry::new()),
      max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
    })
  }

  pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
    self.tools = Arc::new(tools);
    self
  }

  pub fn with_max_tool_turns(mut self, turns: usize) -> Self {
    self.max_tool_turns = turns.max(1);
    self
  }

  fn build_body(
    &self,
    agent: &AgentProfile,
    messages: &[serde_json::Value],
    stream: bool,
  ) -> serde_json::Value {
    let model = agent.model.as_deref().unwrap_or(&self.default_model);
    let mut body = json!({
      "model": model,
      "messages": messages,
      "stream": stream,
    });

    if let Some(temperature) = self.temperature {
      body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = self.max_new_tokens {
      body["max_tokens"] = json!(max_tokens);
    }
    if !agent.functions.is_empty() {
      let tools: Vec<serde_json::Value> = agent
        .functions
        .iter()
        .map(|f| {
          json!({
            "type": "function",
            "function": {
              "name": f.name,
              "description": f.description,
              "parameters": f.parameters,
            }
          })
        })
        .collect();
      body["tools"] = json!(tools);
    }

    body
  }

  async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, CompletionError> {
    let mut request = self.http.post(self.endpoint.clone()).json(body);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(CompletionError::Api {
        status: status.as_u16(),
        body,
      });
    }
    Ok(response)
  }
}

#[async_trait]
impl Completion for OpenAiClient {
  async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
    let mut messages = wire_messages(&request.messages);

    for turn in 0..self.max_tool_turns {
      let body = self.build_body(&request.agent, &messages, false);
      let response: ChatResponse = self.post(&body).await?.json().await?;
      let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::InvalidResponse {
          message: "no choices in response".to_string(),
        })?
        .message;

      let tool_calls = message.tool_calls.unwrap_or_default();
      if tool_calls.is_empty() {
        return Ok(message.content.unwrap_or_default());
      }

      debug!(agent = %request.agent.name, turn, calls = tool_calls.len(), "tool_calls_requested");
      messages.push(json!({
        "role": "assistant",
        "content": message.content,
        "tool_calls": tool_calls,
      }));

      for call in &tool_calls {
        let result = match parse_arguments(&call.function.arguments) {
          Ok(arguments) => {
            self
              .tools
              .invoke(&call.function.name, arguments, &request)
              .await
          }
          Err(e) => format!("Error: invalid arguments: {e}"),
        };
        messages.push(json!({
          "role": "tool",
          "tool_call_id": call.id,
          "content": result,
        }));
      }
    }

    Err(CompletionError::ToolTurnsExceeded {
      turns: self.max_tool_turns,
    })
  }

  async fn complete_stream(
    &self,
    request: CompletionRequest,
  ) -> Result<CompletionStream, CompletionError> {
    // Tool calls need whole turns; resolve them first and emit the final answer.
    if !request.agent.functions.is_empty() {
      let text = self.complete(request).await?;
      let chunks = vec![Ok(StreamChunk::content(text)), Ok(StreamChunk::end())];
      return Ok(Box::pin(stream::iter(chunks)));
    }

    let messages = wire_messages(&request.messages);
    let body = self.build_body(&request.agent, &messages, true);
    let response = self.post(&body).await?;

    let state = SseState {
      bytes: response.bytes_stream().boxed(),
      buffer: Vec::new(),
      pending: VecDeque::new(),
      done: false,
    };
    Ok(Box::pin(stream::unfold(state, next_chunk)))
  }
}

fn chat_completions_url(base_url: &str) -> Result<Url, CompletionError> {
  let mut base = base_url.trim_end_matches('/').to_string();
  base.push('/');
  Url::parse(&base)
    .and_then(|url| url.join("chat/completions"))
    .map_err(|source| CompletionError::Url {
      url: base_url.to_string(),
      source,
    })
}

fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
  messages
    .iter()
    .map(|m| json!({ "role": m.role, "content": m.content }))
    .collect()
}

fn parse_arguments(arguments: &str) -> Result<serde_json::Value, serde_json::Error> {
  if arguments.trim().is_empty() {
    return Ok(json!({}));
  }
  serde_json::from_str(arguments)
}

/// Server-sent events decoding state.
struct SseState<S> {
  bytes: S,
  buffer: Vec<u8>,
  pending: VecDeque<Result<StreamChunk, CompletionError>>,
  done: bool,
}

impl<S> SseState<S> {
  /// Decode every complete line in the buffer.
  fn drain_lines(&mut self) {
    while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.buffer.drain(..=pos).collect();
      if self.done {
        continue;
      }
      let line = String::from_utf8_lossy(&line);
      self.decode_line(line.trim());
    }
  }

  fn decode_line(&mut self, line: &str) {
    let Some(data) = line.strip_prefix("data:") else {
      return;
    };
    let data = data.trim();
    if data == "[DONE]" {
      self.pending.push_back(Ok(StreamChunk::end()));
      self.done = true;
      return;
    }

    match serde_json::from_str::<StreamResponse>(data) {
      Ok(event) => {
        let content = event
          .choices
          .into_iter()
          .next()
          .and_then(|choice| choice.delta.content);
        if let Some(content) = content.filter(|c| !c.is_empty()) {
          self.pending.push_back(Ok(StreamChunk::content(content)));
        }
      }
      Err(e) => self.pending.push_back(Err(CompletionError::Stream {
        message: format!("malformed event: {e}"),
      })),
    }
  }
}

async fn next_chunk<S, B>(
  mut state: SseState<S>,
) -> Option<(Result<StreamChunk, CompletionError>, SseState<S>)>
where
  S: Stream<Item = reqwest::Result<B>> + Unpin,
  B: AsRef<[u8]>,
{
  loop {
    if let Some(item) = state.pending.pop_front() {
      return Some((item, state));
    }
    if state.done {
      return None;
    }

    match state.bytes.next().await {
      Some(Ok(bytes)) => {
        state.buffer.extend_from_slice(bytes.as_ref());
        state.drain_lines();
      }
      Some(Err(e)) => {
        state.done = true;
        return Some((Err(CompletionError::Http(e)), state));
      }
      None => {
        // Flush a final unterminated line, then close the message.
        state.buffer.push(b'\n');
        state.drain_lines();
        if !state.done {
          state.pending.push_back(Ok(StreamChunk::end()));
          state.done = true;
        }
      }
    }
  }
}

// OpenAI API types

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
  #[serde(default)]
  content: Option<String>,
  #[serde(default)]
  tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
  id: String,
  #[serde(rename = "type", default = "function_kind")]
  kind: String,
  function: FunctionCall,
}

fn function_kind() -> String {
  "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
  name: String,
  #[serde(default)]
  arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
  #[serde(default)]
  choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
  delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
  #[serde(default)]
  content: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_chat_completions_url() {
    let url = chat_completions_url("http://localhost:11434/v1/").unwrap();
    assert_eq!(url.as_str(), "http://localhost:11434/v1/chat/completions");

    let url = chat_completions_url("https://api.openai.com/v1").unwrap();
    assert_eq!(url.as_str(), "https://api.openai.com/v1/chat/completions");
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      chat_completions_url("not a url"),
      Err(CompletionError::Url { .. })
    ));
  }

  #[test]
  fn test_decode_split_lines() {
    let mut state = SseState {
      bytes: (),
      buffer: Vec::new(),
      pending: VecDeque::new(),
      done: false,
    };
    state
      .buffer
      .extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\nda");
    state.drain_lines();
    state
      .buffer
      .extend_from_slice(b"ta: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\ndata: [DONE]\n");
    state.drain_lines();

    let chunks: Vec<StreamChunk> = state.pending.into_iter().map(|c| c.unwrap()).collect();
    assert_eq!(
      chunks,
      vec![
        StreamChunk::content("Hel"),
        StreamChunk::content("lo"),
        StreamChunk::end()
      ]
    );
    assert!(state.done);
  }

  #[test]
  fn test_empty_arguments_are_empty_object() {
    assert_eq!(parse_arguments("").unwrap(), json!({}));
    assert_eq!(parse_arguments(r#"{"q":"x"}"#).unwrap(), json!({ "q": "x" }));
  }
}
