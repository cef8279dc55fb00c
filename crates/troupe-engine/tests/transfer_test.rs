//! Integration tests for agent transfer through the tool registry.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Reply, Scripted};
use serde_json::json;
use tokio::sync::mpsc;
use troupe_completion::{Completion, CompletionError, CompletionRequest, Message, ToolRegistry};
use troupe_engine::{
  ChannelNotifier, ExecutionEvent, ExecutorConfig, Severity, TRANSFER_TO_AGENT, TransferLog,
  TransferToAgent, WorkflowExecutor,
};
use troupe_workflow::Workflow;

const ROUTING: &str = r#"
workflow: { llm_provider: test }
functions:
  - name: transfer_to_agent
    description: Ask another agent
    parameters:
      type: object
      properties:
        agent_name: { type: string }
        query: { type: string }
      required: [agent_name, query]
agents:
  - { name: router, instruction: "route", functions: [transfer_to_agent] }
  - { name: expert, instruction: "know things", history_length: 1 }
steps:
  - { name: ask, agent: router, output: { name: answer } }
"#;

/// Model double that calls the transfer tool whenever the agent may use it.
struct Router {
  tools: ToolRegistry,
  target: &'static str,
  fail: bool,
}

#[async_trait]
impl Completion for Router {
  async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
    let arguments = json!({ "agent_name": self.target, "query": "What is 6 x 7?" });
    let answer = self.tools.invoke(TRANSFER_TO_AGENT, arguments, &request).await;
    if self.fail {
      return Err(CompletionError::other("connection reset"));
    }
    Ok(format!("The expert says {answer}"))
  }
}

fn routed_executor(
  target: &'static str,
  expert: Arc<Scripted>,
) -> (WorkflowExecutor, mpsc::UnboundedReceiver<ExecutionEvent>) {
  router_executor(target, expert, false, ExecutorConfig::default())
}

fn router_executor(
  target: &'static str,
  expert: Arc<Scripted>,
  fail: bool,
  config: ExecutorConfig,
) -> (WorkflowExecutor, mpsc::UnboundedReceiver<ExecutionEvent>) {
  let workflow = Workflow::from_yaml(ROUTING).unwrap();
  let transfers = TransferLog::new();

  let mut tools = ToolRegistry::new();
  tools.register(
    TRANSFER_TO_AGENT,
    TransferToAgent::new(Arc::new(workflow.clone()), expert, transfers.clone()),
  );
  let router = Arc::new(Router { tools, target, fail });

  let (tx, rx) = mpsc::unbounded_channel();
  let exec = WorkflowExecutor::new(workflow, router, config)
    .with_transfers(transfers)
    .with_notifier(Arc::new(ChannelNotifier::new(tx)))
    .with_history(vec![Message::user("earlier"), Message::assistant("before")]);
  (exec, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transfer_runs_target_agent_and_reports_it() {
  let expert = Scripted::new(|_, _| Reply::text(" 42 "));
  let (mut exec, mut rx) = routed_executor("expert", expert.clone());

  let output = exec.run("6 times 7?").await;

  assert_eq!(output, "The expert says 42");
  assert_eq!(exec.context().get("answer"), Some(json!("The expert says 42")));

  // The expert gets the query as instructions plus its one-message window.
  let calls = expert.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].step, "ask");
  assert_eq!(calls[0].agent.name, "expert");
  assert_eq!(
    calls[0].messages,
    [Message::system("What is 6 x 7?"), Message::user("6 times 7?")]
  );

  let events = drain(&mut rx);
  let transfer = events
    .iter()
    .position(|e| matches!(e, ExecutionEvent::AgentTransfer { .. }))
    .expect("transfer event");
  let output_event = events
    .iter()
    .position(|e| matches!(e, ExecutionEvent::AgentOutput { .. }))
    .unwrap();
  assert!(transfer < output_event);
  assert_eq!(events[transfer].severity(), Severity::Warning);
  assert_eq!(events[transfer].message(), "Transfer to 'expert': What is 6 x 7?");
  match &events[transfer] {
    ExecutionEvent::AgentTransfer { step, agent, .. } => {
      assert_eq!(step, "ask");
      assert_eq!(agent, "expert");
    }
    other => panic!("unexpected event {other:?}"),
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transfer_to_unknown_agent_answers_with_error() {
  let expert = Scripted::echo();
  let (mut exec, mut rx) = routed_executor("ghost", expert.clone());

  let output = exec.run("hello").await;

  assert_eq!(output, "The expert says Error: agent 'ghost' not found");
  assert_eq!(expert.call_count(), 0);
  let transfers = drain(&mut rx)
    .into_iter()
    .filter(|e| matches!(e, ExecutionEvent::AgentTransfer { .. }))
    .count();
  assert_eq!(transfers, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transfer_is_reported_when_the_completion_fails() {
  let expert = Scripted::new(|_, _| Reply::text("42"));
  let config = ExecutorConfig::default().with_max_retry(1);
  let (mut exec, mut rx) = router_executor("expert", expert.clone(), true, config);

  let output = exec.run("6 times 7?").await;

  assert_eq!(output, "");
  assert_eq!(expert.call_count(), 1);
  let events = drain(&mut rx);
  assert_eq!(
    events
      .iter()
      .filter(|e| matches!(e, ExecutionEvent::AgentTransfer { .. }))
      .count(),
    1
  );
  assert!(!events
    .iter()
    .any(|e| matches!(e, ExecutionEvent::AgentOutput { .. })));
}
