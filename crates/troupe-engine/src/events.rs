//! Execution events, notifiers and stream sinks.
//!
//! Events are emitted during workflow execution so consumers can observe
//! progress: print status lines, stream to a UI, persist, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use troupe_completion::StreamChunk;

/// Severity attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Success,
  Warning,
  Error,
}

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  WorkflowStarted {
    execution_id: String,
    workflow: String,
  },

  /// A scheduler pass has started.
  AttemptStarted { execution_id: String, attempt: usize },

  StepStarted {
    execution_id: String,
    step: String,
    agent: String,
  },

  /// The step's agent handed a query to another agent.
  AgentTransfer {
    execution_id: String,
    step: String,
    agent: String,
    query: String,
  },

  /// An agent produced text (after stop truncation).
  AgentOutput {
    execution_id: String,
    step: String,
    agent: String,
    output: String,
  },

  StepCompleted {
    execution_id: String,
    step: String,
    output: serde_json::Value,
  },

  StepFailed {
    execution_id: String,
    step: String,
    error: String,
  },

  /// A scheduler pass failed; the workflow will be retried if attempts remain.
  AttemptFailed {
    execution_id: String,
    attempt: usize,
    error: String,
  },

  WorkflowCompleted {
    execution_id: String,
    output: String,
  },

  /// Every attempt failed.
  WorkflowFailed {
    execution_id: String,
    attempts: usize,
    error: String,
  },
}

impl ExecutionEvent {
  pub fn severity(&self) -> Severity {
    match self {
      Self::WorkflowStarted { .. } | Self::AttemptStarted { .. } | Self::StepStarted { .. } => {
        Severity::Info
      }
      Self::AgentOutput { .. } | Self::StepCompleted { .. } | Self::WorkflowCompleted { .. } => {
        Severity::Success
      }
      Self::AgentTransfer { .. } | Self::AttemptFailed { .. } => Severity::Warning,
      Self::StepFailed { .. } | Self::WorkflowFailed { .. } => Severity::Error,
    }
  }

  /// Human-readable status line.
  pub fn message(&self) -> String {
    match self {
      Self::WorkflowStarted { workflow, .. } => format!("Running workflow '{workflow}' ..."),
      Self::AttemptStarted { attempt, .. } => format!("Attempt {attempt} ..."),
      Self::StepStarted { step, agent, .. } => format!("Executing '{step}' with '{agent}' ..."),
      Self::AgentTransfer { agent, query, .. } => format!("Transfer to '{agent}': {query}"),
      Self::AgentOutput { agent, output, .. } => format!("{agent}: {output}"),
      Self::StepCompleted { step, .. } => format!("'{step}' has been completed."),
      Self::StepFailed { step, error, .. } => format!("'{step}' failed: {error}"),
      Self::AttemptFailed { attempt, error, .. } => format!("Attempt {attempt} failed: {error}"),
      Self::WorkflowCompleted { .. } => "Workflow completed.".to_string(),
      Self::WorkflowFailed {
        attempts, error, ..
      } => format!("Workflow failed after {attempts} attempts: {error}"),
    }
  }
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event; implementations decide what to do
/// with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// Receives every chunk of streamed model output, in production order per step.
pub trait StreamSink: Send + Sync {
  fn chunk(&self, step: &str, chunk: &StreamChunk);
}

/// A stream sink forwarding `(step, chunk)` pairs to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelStreamSink {
  sender: mpsc::UnboundedSender<(String, StreamChunk)>,
}

impl ChannelStreamSink {
  pub fn new(sender: mpsc::UnboundedSender<(String, StreamChunk)>) -> Self {
    Self { sender }
  }
}

impl StreamSink for ChannelStreamSink {
  fn chunk(&self, step: &str, chunk: &StreamChunk) {
    let _ = self.sender.send((step.to_string(), chunk.clone()));
  }
}
