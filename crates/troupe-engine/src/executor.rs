//! Top-level workflow executor.
//!
//! The [`WorkflowExecutor`] owns one workflow, its context store and the
//! conversation history, and provides `run(user_input)` to execute the whole
//! workflow with retries.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use troupe_completion::{Completion, Message};
use troupe_workflow::Workflow;

use crate::context::ContextStore;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier, StreamSink};
use crate::hooks::{HookRegistry, PostProcessor};
use crate::runner::{StepRecord, StepRunner};
use crate::scheduler::Scheduler;
use crate::transfer::TransferLog;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_RETRY: usize = 3;

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Capacity of the pool shared by async steps and async `for_each` items.
  pub max_concurrency: usize,
  /// Whole-workflow attempts per `run`.
  pub max_retry: usize,
  /// Use streaming completions and forward chunks to the stream sink.
  pub stream: bool,
  /// Restore the context captured at `run` entry before each retry. When off,
  /// writes from a failed attempt stay visible to the next one.
  pub restore_context_on_retry: bool,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      max_concurrency: DEFAULT_MAX_CONCURRENCY,
      max_retry: DEFAULT_MAX_RETRY,
      stream: false,
      restore_context_on_retry: true,
    }
  }
}

impl ExecutorConfig {
  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = max_concurrency;
    self
  }

  pub fn with_max_retry(mut self, max_retry: usize) -> Self {
    self.max_retry = max_retry;
    self
  }

  pub fn with_stream(mut self, stream: bool) -> Self {
    self.stream = stream;
    self
  }

  pub fn with_restore_context_on_retry(mut self, restore: bool) -> Self {
    self.restore_context_on_retry = restore;
    self
  }
}

pub struct WorkflowExecutor {
  workflow: Arc<Workflow>,
  completion: Arc<dyn Completion>,
  config: ExecutorConfig,
  context: ContextStore,
  history: Vec<Message>,
  hooks: HookRegistry,
  notifier: Arc<dyn ExecutionNotifier>,
  stream_sink: Option<Arc<dyn StreamSink>>,
  permits: Arc<Semaphore>,
  records: Arc<Mutex<Vec<StepRecord>>>,
  last_output: Arc<Mutex<String>>,
  transfers: TransferLog,
}

impl WorkflowExecutor {
  /// Create an executor. Global variables are seeded into an empty context.
  pub fn new(workflow: Workflow, completion: Arc<dyn Completion>, config: ExecutorConfig) -> Self {
    let context = ContextStore::from_map(workflow.global_variables.clone());
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

    Self {
      workflow: Arc::new(workflow),
      completion,
      config,
      context,
      history: Vec::new(),
      hooks: HookRegistry::new(),
      notifier: Arc::new(NoopNotifier),
      stream_sink: None,
      permits,
      records: Arc::new(Mutex::new(Vec::new())),
      last_output: Arc::new(Mutex::new(String::new())),
      transfers: TransferLog::new(),
    }
  }

  /// Caller-supplied variables. These win over global variables of the same name.
  pub fn with_context(self, variables: Map<String, Value>) -> Self {
    for (key, value) in variables {
      self.context.set(key, value);
    }
    self
  }

  /// Start from an existing conversation.
  pub fn with_history(mut self, history: Vec<Message>) -> Self {
    self.history = history;
    self
  }

  pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
    self.hooks = hooks;
    self
  }

  pub fn with_hook(mut self, name: impl Into<String>, hook: impl PostProcessor + 'static) -> Self {
    self.hooks.register(name, hook);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Share the log a [`crate::TransferToAgent`] tool records into, so its
  /// transfers are reported as events of the calling step.
  pub fn with_transfers(mut self, transfers: TransferLog) -> Self {
    self.transfers = transfers;
    self
  }

  pub fn with_stream_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
    self.stream_sink = Some(sink);
    self
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  pub fn context(&self) -> &ContextStore {
    &self.context
  }

  pub fn history(&self) -> &[Message] {
    &self.history
  }

  /// Step timings of the latest attempt, in completion order.
  pub fn records(&self) -> Vec<StepRecord> {
    self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Run the workflow for one user turn and return its final output.
  ///
  /// The whole workflow is retried up to `max_retry` times. An empty string
  /// means every attempt failed; the failures are reported through the notifier
  /// and the logs, never returned.
  #[instrument(
    name = "workflow_run",
    skip(self, user_input),
    fields(workflow = %self.workflow.name)
  )]
  pub async fn run(&mut self, user_input: &str) -> String {
    let execution_id = uuid::Uuid::new_v4().to_string();
    // Templates see the input as typed; the history keeps it trimmed.
    let turn = user_input.trim();
    if !turn.is_empty() {
      self.history.push(Message::user(turn));
    }
    self.context.set("user_input", Value::String(user_input.to_string()));

    info!(
      execution_id = %execution_id,
      workflow = %self.workflow.name,
      steps = self.workflow.steps.len(),
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow: self.workflow.name.clone(),
    });

    let snapshot = self
      .config
      .restore_context_on_retry
      .then(|| self.context.snapshot());
    let attempts = self.config.max_retry.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
      if attempt > 1 {
        if let Some(snapshot) = &snapshot {
          self.context.restore(snapshot.clone());
        }
      }

      self.notifier.notify(ExecutionEvent::AttemptStarted {
        execution_id: execution_id.clone(),
        attempt,
      });

      match self.execute_pass(&execution_id).await {
        Ok(output) => {
          self.history.push(Message::assistant(output.clone()));
          info!(execution_id = %execution_id, attempt, "workflow_completed");
          self.notifier.notify(ExecutionEvent::WorkflowCompleted {
            execution_id,
            output: output.clone(),
          });
          return output;
        }
        Err(e) => {
          warn!(execution_id = %execution_id, attempt, error = %e, "attempt_failed");
          self.notifier.notify(ExecutionEvent::AttemptFailed {
            execution_id: execution_id.clone(),
            attempt,
            error: e.to_string(),
          });
          last_error = e.to_string();
        }
      }
    }

    error!(execution_id = %execution_id, attempts, error = %last_error, "workflow_failed");
    self.notifier.notify(ExecutionEvent::WorkflowFailed {
      execution_id,
      attempts,
      error: last_error,
    });
    String::new()
  }

  /// One scheduler pass without retries or history updates.
  pub async fn run_once(&mut self) -> Result<String, EngineError> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    self.execute_pass(&execution_id).await
  }

  /// Execute a single step in isolation, ignoring its prerequisites.
  ///
  /// This is for debugging: the step sees the current context, and its output
  /// is written back to it.
  #[instrument(
    name = "workflow_run_step",
    skip(self),
    fields(workflow = %self.workflow.name)
  )]
  pub async fn run_step(&mut self, step: &str) -> Result<Value, EngineError> {
    let step = self
      .workflow
      .get_step(step)
      .cloned()
      .ok_or_else(|| EngineError::StepNotFound(step.to_string()))?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    self.reset_attempt();
    self.runner(&execution_id).run(&step, None, None).await
  }

  async fn execute_pass(&mut self, execution_id: &str) -> Result<String, EngineError> {
    self.reset_attempt();
    Scheduler::new(self.runner(execution_id)).execute().await?;
    Ok(self.last_output.lock().unwrap_or_else(|e| e.into_inner()).clone())
  }

  fn reset_attempt(&self) {
    self.records.lock().unwrap_or_else(|e| e.into_inner()).clear();
    self.last_output.lock().unwrap_or_else(|e| e.into_inner()).clear();
  }

  fn runner(&self, execution_id: &str) -> StepRunner {
    StepRunner {
      execution_id: execution_id.to_string(),
      workflow: self.workflow.clone(),
      completion: self.completion.clone(),
      context: self.context.clone(),
      history: Arc::new(self.history.clone()),
      hooks: self.hooks.clone(),
      notifier: self.notifier.clone(),
      stream_sink: self.stream_sink.clone(),
      stream: self.config.stream,
      permits: self.permits.clone(),
      last_output: self.last_output.clone(),
      records: self.records.clone(),
      transfers: self.transfers.clone(),
    }
  }
}
