//! Agent transfer: a tool that lets the model hand a query to another agent.
//!
//! The workflow declares the function and lists it on the agents allowed to
//! transfer:
//!
//! ```yaml
//! functions:
//!   - name: transfer_to_agent
//!     description: Ask another agent
//!     parameters:
//!       type: object
//!       properties:
//!         agent_name: { type: string }
//!         query: { type: string }
//!       required: [agent_name, query]
//! agents:
//!   - { name: router, instruction: "...", functions: [transfer_to_agent] }
//! ```
//!
//! Each transfer is recorded in a [`TransferLog`] under the calling step and
//! reported by the step runner as an `AgentTransfer` event once the step's
//! completion returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use troupe_completion::{AgentProfile, Completion, CompletionRequest, Message, MessageRole, Tool};
use troupe_workflow::Workflow;

use crate::runner::build_messages;

/// Function name the transfer tool is registered under.
pub const TRANSFER_TO_AGENT: &str = "transfer_to_agent";

/// One hand-off from a step's agent to another agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
  pub agent: String,
  pub query: String,
}

/// Transfers waiting to be reported, keyed by step name.
#[derive(Debug, Clone, Default)]
pub struct TransferLog {
  pending: Arc<Mutex<HashMap<String, Vec<Transfer>>>>,
}

impl TransferLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self, step: &str, transfer: Transfer) {
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .entry(step.to_string())
      .or_default()
      .push(transfer);
  }

  /// Remove and return the transfers recorded for `step`.
  pub fn take(&self, step: &str) -> Vec<Transfer> {
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(step)
      .unwrap_or_default()
  }
}

#[derive(Deserialize)]
struct TransferArgs {
  agent_name: String,
  query: String,
}

/// Runs the named agent on the query and returns its answer to the caller.
///
/// The target agent sees the query as its instructions followed by its own
/// history window of the calling conversation.
pub struct TransferToAgent {
  workflow: Arc<Workflow>,
  completion: Arc<dyn Completion>,
  log: TransferLog,
}

impl TransferToAgent {
  pub fn new(workflow: Arc<Workflow>, completion: Arc<dyn Completion>, log: TransferLog) -> Self {
    Self {
      workflow,
      completion,
      log,
    }
  }
}

#[async_trait]
impl Tool for TransferToAgent {
  async fn call(&self, arguments: Value, request: &CompletionRequest) -> Result<String, String> {
    let args: TransferArgs =
      serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))?;
    let agent_name = args.agent_name.trim();

    info!(step = %request.step, from = %request.agent.name, to = %agent_name, "agent_transfer");
    self.log.record(
      &request.step,
      Transfer {
        agent: agent_name.to_string(),
        query: args.query.clone(),
      },
    );

    let agent = self
      .workflow
      .get_agent(agent_name)
      .ok_or_else(|| format!("agent '{agent_name}' not found"))?;

    let history: Vec<Message> = request
      .messages
      .iter()
      .filter(|m| m.role != MessageRole::System)
      .cloned()
      .collect();
    let transferred = CompletionRequest {
      step: request.step.clone(),
      // Transferred agents answer directly, without tools of their own.
      agent: AgentProfile {
        name: agent.name.clone(),
        description: agent.description.clone(),
        model: None,
        functions: Vec::new(),
      },
      messages: build_messages(&args.query, &history, agent.history_length),
      context: request.context.clone(),
    };

    self
      .completion
      .complete(transferred)
      .await
      .map(|text| text.trim().to_string())
      .map_err(|e| e.to_string())
  }
}
