//! Execution of a single step.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use troupe_completion::{AgentProfile, Completion, CompletionRequest, Message};
use troupe_workflow::{Agent, ExecutionMode, ForEachDef, OutputType, Step, Workflow};

use crate::context::ContextStore;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, StreamSink};
use crate::extract::{extract_list, extract_object, truncate_at_stop};
use crate::hooks::HookRegistry;
use crate::signal::Signal;
use crate::template;
use crate::transfer::TransferLog;

/// Timing of one step execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub step: String,
  pub agent: String,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

/// What the model produced before output coercion.
enum RawOutput {
  Text(String),
  /// One entry per `for_each` item, in the order they finished.
  Items(Vec<Value>),
}

/// Runs steps against the shared state of one scheduler pass.
///
/// Cheap to clone; every clone shares the same context, records and pool.
#[derive(Clone)]
pub(crate) struct StepRunner {
  pub execution_id: String,
  pub workflow: Arc<Workflow>,
  pub completion: Arc<dyn Completion>,
  pub context: ContextStore,
  /// Conversation history as of the start of the pass.
  pub history: Arc<Vec<Message>>,
  pub hooks: HookRegistry,
  pub notifier: Arc<dyn ExecutionNotifier>,
  pub stream_sink: Option<Arc<dyn StreamSink>>,
  pub stream: bool,
  pub permits: Arc<Semaphore>,
  pub last_output: Arc<Mutex<String>>,
  pub records: Arc<Mutex<Vec<StepRecord>>>,
  pub transfers: TransferLog,
}

impl StepRunner {
  /// Execute one step and return its final output.
  ///
  /// `permit` is the pool slot an async step was dispatched with; it is released
  /// before an async `for_each` fans out so the items can use the pool.
  /// `signal` is set as the very last action, after every context write.
  #[instrument(
    name = "step_run",
    skip(self, step, permit, signal),
    fields(execution_id = %self.execution_id, step = %step.name)
  )]
  pub async fn run(
    &self,
    step: &Step,
    permit: Option<OwnedSemaphorePermit>,
    signal: Option<&Signal>,
  ) -> Result<Value, EngineError> {
    let started_at = Utc::now();
    let result = self.execute(step, permit).await;
    let finished_at = Utc::now();

    match result {
      Ok((agent, output)) => {
        self
          .records
          .lock()
          .unwrap_or_else(|e| e.into_inner())
          .push(StepRecord {
            step: step.name.clone(),
            agent,
            started_at,
            finished_at,
          });

        info!(execution_id = %self.execution_id, step = %step.name, "step_completed");
        self.notifier.notify(ExecutionEvent::StepCompleted {
          execution_id: self.execution_id.clone(),
          step: step.name.clone(),
          output: output.clone(),
        });

        if let Some(signal) = signal {
          signal.set();
        }
        Ok(output)
      }
      Err(e) => {
        warn!(execution_id = %self.execution_id, step = %step.name, error = %e, "step_failed");
        self.notifier.notify(ExecutionEvent::StepFailed {
          execution_id: self.execution_id.clone(),
          step: step.name.clone(),
          error: e.to_string(),
        });
        Err(e)
      }
    }
  }

  async fn execute(
    &self,
    step: &Step,
    permit: Option<OwnedSemaphorePermit>,
  ) -> Result<(String, Value), EngineError> {
    let agent_name = template::render(&step.name, &step.agent, &self.context.snapshot())?
      .trim()
      .to_string();
    let agent = self
      .workflow
      .get_agent(&agent_name)
      .ok_or_else(|| EngineError::AgentNotFound {
        step: step.name.clone(),
        agent: agent_name.clone(),
      })?;

    info!(
      execution_id = %self.execution_id,
      step = %step.name,
      agent = %agent.name,
      "step_started"
    );
    self.notifier.notify(ExecutionEvent::StepStarted {
      execution_id: self.execution_id.clone(),
      step: step.name.clone(),
      agent: agent.name.clone(),
    });

    let raw = match &agent.for_each {
      Some(for_each) => {
        let permit = match for_each.execution {
          ExecutionMode::Async => {
            drop(permit);
            None
          }
          ExecutionMode::Sync => permit,
        };
        let items = self.run_for_each(step, agent, for_each).await?;
        drop(permit);
        RawOutput::Items(items)
      }
      None => {
        let text = self.invoke(step, agent, &self.context.snapshot()).await?;
        drop(permit);
        RawOutput::Text(text)
      }
    };

    let output = self.finish_output(step, raw)?;
    Ok((agent.name.clone(), output))
  }

  /// Fan out one invocation per list item, pushing each result onto the output
  /// variable as it finishes.
  async fn run_for_each(
    &self,
    step: &Step,
    agent: &Agent,
    for_each: &ForEachDef,
  ) -> Result<Vec<Value>, EngineError> {
    if step.output.output_type == OutputType::Json {
      return Err(EngineError::ForEachOutput {
        step: step.name.clone(),
      });
    }

    let list_name = for_each.list.trim();
    let Some(Value::Array(items)) = self.context.get(list_name) else {
      return Err(EngineError::NotIterable {
        step: step.name.clone(),
        list: list_name.to_string(),
      });
    };

    let output_name = &step.output.name;
    self.context.set(output_name.clone(), Value::Array(Vec::new()));
    let mut outputs = Vec::with_capacity(items.len());

    match for_each.execution {
      ExecutionMode::Sync => {
        for item in items {
          let value = self.run_item(step, agent, for_each, item).await?;
          self.context.push(output_name, value.clone());
          outputs.push(value);
        }
      }
      ExecutionMode::Async => {
        let mut tasks = JoinSet::new();
        for item in items {
          let runner = self.clone();
          let step = step.clone();
          let agent = agent.clone();
          let for_each = for_each.clone();
          tasks.spawn(async move {
            let _permit = runner
              .permits
              .clone()
              .acquire_owned()
              .await
              .map_err(|e| EngineError::Join {
                message: e.to_string(),
              })?;
            runner.run_item(&step, &agent, &for_each, item).await
          });
        }

        // Completion order, not input order.
        while let Some(joined) = tasks.join_next().await {
          let value = match joined {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
              tasks.shutdown().await;
              return Err(e);
            }
            Err(e) => {
              tasks.shutdown().await;
              return Err(EngineError::Join {
                message: e.to_string(),
              });
            }
          };
          self.context.push(output_name, value.clone());
          outputs.push(value);
        }
      }
    }

    Ok(outputs)
  }

  async fn run_item(
    &self,
    step: &Step,
    agent: &Agent,
    for_each: &ForEachDef,
    item: Value,
  ) -> Result<Value, EngineError> {
    let mut local = self.context.snapshot();
    local.insert(for_each.item.clone(), item);

    let text = self.invoke(step, agent, &local).await?;
    if let Some(var) = &for_each.output {
      local.insert(var.clone(), Value::String(text.clone()));
    }

    match &for_each.format {
      Some(format) => Ok(Value::String(template::render(&step.name, format, &local)?)),
      None => Ok(Value::String(text)),
    }
  }

  /// Render the agent instruction, call the model and apply stop truncation.
  async fn invoke(
    &self,
    step: &Step,
    agent: &Agent,
    context: &Map<String, Value>,
  ) -> Result<String, EngineError> {
    let instructions = template::render(&step.name, &agent.instruction, context)?;
    let request = CompletionRequest {
      step: step.name.clone(),
      agent: AgentProfile {
        name: agent.name.clone(),
        description: agent.description.clone(),
        model: None,
        functions: agent.functions.clone(),
      },
      messages: build_messages(&instructions, &self.history, agent.history_length),
      context: context.clone(),
    };

    info!(
      execution_id = %self.execution_id,
      step = %step.name,
      agent = %agent.name,
      messages = request.messages.len(),
      "completion_requested"
    );

    let result = if self.stream {
      self.invoke_streaming(step, request).await
    } else {
      self
        .completion
        .complete(request)
        .await
        .map_err(|source| EngineError::Completion {
          step: step.name.clone(),
          source,
        })
    };

    // Transfers happened even when the completion then failed.
    for transfer in self.transfers.take(&step.name) {
      self.notifier.notify(ExecutionEvent::AgentTransfer {
        execution_id: self.execution_id.clone(),
        step: step.name.clone(),
        agent: transfer.agent,
        query: transfer.query,
      });
    }

    let text = truncate_at_stop(result?.trim(), step.stop_character.as_deref()).to_string();

    info!(
      execution_id = %self.execution_id,
      step = %step.name,
      chars = text.len(),
      "completion_received"
    );
    self.notifier.notify(ExecutionEvent::AgentOutput {
      execution_id: self.execution_id.clone(),
      step: step.name.clone(),
      agent: agent.name.clone(),
      output: text.clone(),
    });

    Ok(text)
  }

  async fn invoke_streaming(
    &self,
    step: &Step,
    request: CompletionRequest,
  ) -> Result<String, EngineError> {
    let to_engine = |source| EngineError::Completion {
      step: step.name.clone(),
      source,
    };

    let mut stream = self
      .completion
      .complete_stream(request)
      .await
      .map_err(to_engine)?;

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
      let chunk = chunk.map_err(to_engine)?;
      if let Some(content) = &chunk.content {
        text.push_str(content);
      }
      if let Some(sink) = &self.stream_sink {
        sink.chunk(&step.name, &chunk);
      }
      if chunk.is_end() {
        break;
      }
    }
    Ok(text)
  }

  /// Coerce, post-process, format and append the step output, then publish it.
  fn finish_output(&self, step: &Step, raw: RawOutput) -> Result<Value, EngineError> {
    let def = &step.output;

    let (mut output, raw_text) = match raw {
      RawOutput::Items(items) => {
        let joined = join_items(&items);
        match def.output_type {
          OutputType::List => (Value::Array(items), joined),
          _ => (Value::String(joined.clone()), joined),
        }
      }
      RawOutput::Text(text) => (self.coerce(step, &text)?, text),
    };
    self.context.set(def.name.clone(), output.clone());

    if let Some(hook_name) = &def.post_processing {
      let hook = self
        .hooks
        .get(hook_name)
        .ok_or_else(|| EngineError::HookNotFound {
          step: step.name.clone(),
          hook: hook_name.clone(),
        })?;
      output = hook
        .process(output)
        .map_err(|message| EngineError::PostProcessing {
          step: step.name.clone(),
          hook: hook_name.clone(),
          message,
        })?;
      self.context.set(def.name.clone(), output.clone());
    }

    if let Some(format) = &def.format {
      output = Value::String(template::render(&step.name, format, &self.context.snapshot())?);
      self.context.set(def.name.clone(), output.clone());
    }

    for target in &def.append_to {
      let value = match &target.format {
        Some(format) => Value::String(template::render(&step.name, format, &self.context.snapshot())?),
        None => output.clone(),
      };
      self.context.push(&target.variable, value);
    }

    *self.last_output.lock().unwrap_or_else(|e| e.into_inner()) = match &output {
      Value::String(s) => s.clone(),
      _ => raw_text,
    };

    Ok(output)
  }

  fn coerce(&self, step: &Step, text: &str) -> Result<Value, EngineError> {
    match step.output.output_type {
      OutputType::String => Ok(Value::String(text.to_string())),
      OutputType::List => Ok(
        extract_list(text)
          .map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
          .unwrap_or(Value::Null),
      ),
      OutputType::Json => {
        let parsed = extract_object(text).unwrap_or_else(|e| {
          warn!(execution_id = %self.execution_id, step = %step.name, error = %e, "json_extraction_failed");
          Value::Null
        });
        match &step.output.key {
          Some(key) => parsed
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::MissingKey {
              step: step.name.clone(),
              key: key.clone(),
            }),
          None => Ok(parsed),
        }
      }
    }
  }
}

/// System instructions (when non-empty) followed by the trailing history window.
pub(crate) fn build_messages(
  instructions: &str,
  history: &[Message],
  history_length: usize,
) -> Vec<Message> {
  let mut messages = Vec::with_capacity(history_length.min(history.len()) + 1);
  if !instructions.trim().is_empty() {
    messages.push(Message::system(instructions));
  }
  let skip = history.len().saturating_sub(history_length);
  messages.extend(history[skip..].iter().cloned());
  messages
}

fn join_items(items: &[Value]) -> String {
  items
    .iter()
    .map(|item| match item {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}
