//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use troupe_completion::{Completion, CompletionError, CompletionRequest, MessageRole};
use troupe_engine::{ExecutorConfig, WorkflowExecutor};
use troupe_workflow::Workflow;

/// What the scripted model does for one request.
pub struct Reply {
  pub delay: Duration,
  pub result: Result<String, String>,
}

impl Reply {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      delay: Duration::ZERO,
      result: Ok(text.into()),
    }
  }

  pub fn fail(message: impl Into<String>) -> Self {
    Self {
      delay: Duration::ZERO,
      result: Err(message.into()),
    }
  }

  pub fn after(mut self, millis: u64) -> Self {
    self.delay = Duration::from_millis(millis);
    self
  }
}

type Handler = dyn Fn(&CompletionRequest, usize) -> Reply + Send + Sync;

/// An in-memory completion service driven by a closure.
///
/// The closure receives the request and the zero-based index of the call.
pub struct Scripted {
  handler: Box<Handler>,
  calls: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
  pub fn new(handler: impl Fn(&CompletionRequest, usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
    Arc::new(Self {
      handler: Box::new(handler),
      calls: Mutex::new(Vec::new()),
    })
  }

  /// Answers every request with its rendered instructions.
  pub fn echo() -> Arc<Self> {
    Self::new(|request, _| Reply::text(instructions(request)))
  }

  pub fn calls(&self) -> Vec<CompletionRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl Completion for Scripted {
  async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
    let index = {
      let mut calls = self.calls.lock().unwrap();
      calls.push(request.clone());
      calls.len() - 1
    };
    // Outside the lock: a handler may block to simulate a stuck model.
    let reply = (self.handler)(&request, index);

    if !reply.delay.is_zero() {
      tokio::time::sleep(reply.delay).await;
    }
    reply.result.map_err(CompletionError::other)
  }
}

/// The rendered system instructions of a request.
pub fn instructions(request: &CompletionRequest) -> String {
  request
    .messages
    .iter()
    .find(|m| m.role == MessageRole::System)
    .map(|m| m.content.clone())
    .unwrap_or_default()
}

pub fn executor(yaml: &str, completion: Arc<Scripted>) -> WorkflowExecutor {
  executor_with(yaml, completion, ExecutorConfig::default())
}

pub fn executor_with(yaml: &str, completion: Arc<Scripted>, config: ExecutorConfig) -> WorkflowExecutor {
  let workflow = Workflow::from_yaml(yaml).expect("test workflow should parse");
  WorkflowExecutor::new(workflow, completion, config)
}
