//! Integration tests for single-step semantics: agents, for_each and the output
//! pipeline.

mod common;

use common::{Reply, Scripted, executor, instructions};
use serde_json::{Value, json};
use troupe_engine::EngineError;

#[tokio::test(flavor = "multi_thread")]
async fn test_async_for_each_collects_in_completion_order() {
  let yaml = r#"
workflow: { llm_provider: test }
global_variables:
  numbers: [1, 2, 3]
agents:
  - name: counter
    instruction: "item {{ n }}"
    for_each: { item: n, list: numbers, execution: async }
steps:
  - { name: count, agent: counter, output: { name: counted, type: list } }
"#;
  let completion = Scripted::new(|request, _| {
    let text = instructions(request);
    let delay = match text.as_str() {
      "item 1" => 20,
      "item 2" => 300,
      _ => 80,
    };
    Reply::text(text).after(delay)
  });
  let mut exec = executor(yaml, completion);

  let output = exec.run_once().await.unwrap();

  // Item 2 is slowest, so it lands last even though it is second in the input.
  assert_eq!(
    exec.context().get("counted"),
    Some(json!(["item 1", "item 3", "item 2"]))
  );
  assert_eq!(output, "item 1\n\nitem 3\n\nitem 2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_for_each_keeps_input_order_and_formats_items() {
  let yaml = r####"
workflow: { llm_provider: test }
global_variables:
  topics: [rust, go]
agents:
  - name: writer
    instruction: "write about {{ topic }}"
    for_each:
      item: topic
      list: topics
      output: draft
      format: "## {{ topic }}\n{{ draft }}"
steps:
  - { name: write, agent: writer, output: { name: article } }
"####;
  let completion = Scripted::echo();
  let mut exec = executor(yaml, completion.clone());

  exec.run_once().await.unwrap();

  assert_eq!(
    exec.context().get("article"),
    Some(json!("## rust\nwrite about rust\n\n## go\nwrite about go"))
  );
  let calls = completion.calls();
  assert_eq!(instructions(&calls[0]), "write about rust");
  assert_eq!(instructions(&calls[1]), "write about go");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_for_each_over_non_list_fails() {
  let yaml = r#"
workflow: { llm_provider: test }
global_variables: { topics: "not a list" }
agents:
  - { name: w, instruction: "x", for_each: { item: t, list: topics } }
steps:
  - { name: s, agent: w, output: { name: out } }
"#;
  let completion = Scripted::echo();
  let mut exec = executor(yaml, completion.clone());

  let result = exec.run_once().await;

  match result {
    Err(e @ EngineError::NotIterable { .. }) => {
      assert_eq!(e.to_string(), "topics is not iterable (step 's')")
    }
    other => panic!("expected not iterable, got {other:?}"),
  }
  assert_eq!(completion.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_for_each_rejects_json_output() {
  let yaml = r#"
workflow: { llm_provider: test }
global_variables: { topics: [a] }
agents:
  - { name: w, instruction: "x", for_each: { item: t, list: topics } }
steps:
  - { name: s, agent: w, output: { name: out, type: json } }
"#;
  let completion = Scripted::echo();
  let mut exec = executor(yaml, completion.clone());

  let result = exec.run_once().await;

  assert!(matches!(result, Err(EngineError::ForEachOutput { .. })));
  assert_eq!(completion.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_character_truncates_output() {
  let yaml = r####"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "answer" }]
steps:
  - { name: s, agent: w, stop_character: "###", output: { name: answer } }
"####;
  let completion = Scripted::new(|_, _| Reply::text("Answer: 42 ###ignored"));
  let mut exec = executor(yaml, completion);

  let output = exec.run_once().await.unwrap();

  assert_eq!(output, "Answer: 42 ");
  assert_eq!(exec.context().get("answer"), Some(json!("Answer: 42 ")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_output() {
  let yaml = r#"
workflow: { llm_provider: test }
agents:
  - { name: planner, instruction: "plan" }
  - { name: idle, instruction: "idle" }
steps:
  - { name: plan, agent: planner, output: { name: outline, type: list } }
  - { name: none, agent: idle, output: { name: nothing, type: list } }
"#;
  let completion = Scripted::new(|request, _| {
    if instructions(request) == "plan" {
      Reply::text("Here you go:\n1. intro\n2. body\n3. outro")
    } else {
      Reply::text("I have no ideas")
    }
  });
  let mut exec = executor(yaml, completion);

  exec.run_once().await.unwrap();

  assert_eq!(exec.context().get("outline"), Some(json!(["intro", "body", "outro"])));
  assert_eq!(exec.context().get("nothing"), Some(Value::Null));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_output_with_key() {
  let yaml = r#"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "rate" }]
steps:
  - { name: whole, agent: w, output: { name: review, type: json } }
  - { name: part, agent: w, output: { name: title, type: json, key: title } }
"#;
  let completion = Scripted::new(|_, _| Reply::text(r#"Result: {"title": "T", "score": 3} done"#));
  let mut exec = executor(yaml, completion);

  exec.run_once().await.unwrap();

  assert_eq!(exec.context().get("review"), Some(json!({ "title": "T", "score": 3 })));
  assert_eq!(exec.context().get("title"), Some(json!("T")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_missing_key_fails() {
  let yaml = r#"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "rate" }]
steps:
  - { name: s, agent: w, output: { name: out, type: json, key: verdict } }
"#;
  let completion = Scripted::new(|_, _| Reply::text(r#"{"score": 3}"#));
  let mut exec = executor(yaml, completion);

  let result = exec.run_once().await;
  assert!(matches!(result, Err(EngineError::MissingKey { key, .. }) if key == "verdict"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unparseable_json_becomes_null() {
  let yaml = r#"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "rate" }]
steps:
  - { name: s, agent: w, output: { name: out, type: json } }
"#;
  let completion = Scripted::new(|_, _| Reply::text("no json at all"));
  let mut exec = executor(yaml, completion);

  exec.run_once().await.unwrap();
  assert_eq!(exec.context().get("out"), Some(Value::Null));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_agent_resolved_from_template() {
  let yaml = r#"
workflow: { llm_provider: test }
global_variables: { reviewer: critic }
agents:
  - { name: critic, instruction: "critique" }
  - { name: fan, instruction: "praise" }
steps:
  - { name: review, agent: "{{ reviewer }}", output: { name: verdict } }
"#;
  let mut exec = executor(yaml, Scripted::echo());

  exec.run_once().await.unwrap();

  assert_eq!(exec.records()[0].agent, "critic");
  assert_eq!(exec.context().get("verdict"), Some(json!("critique")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_agent_fails() {
  let yaml = r#"
workflow: { llm_provider: test }
global_variables: { reviewer: nobody }
agents: [{ name: critic, instruction: "critique" }]
steps:
  - { name: review, agent: "{{ reviewer }}", output: { name: verdict } }
"#;
  let mut exec = executor(yaml, Scripted::echo());

  let result = exec.run_once().await;
  assert!(matches!(result, Err(EngineError::AgentNotFound { agent, .. }) if agent == "nobody"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_processing_then_format() {
  let yaml = r#"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "hello" }]
steps:
  - name: s
    agent: w
    output:
      name: summary
      post_processing: shout
      format: "Result: {{ summary }}"
"#;
  let mut exec = executor(yaml, Scripted::echo()).with_hook(
    "shout",
    |v: Value| -> Result<Value, String> { Ok(json!(v.as_str().unwrap_or_default().to_uppercase())) },
  );

  let output = exec.run_once().await.unwrap();

  assert_eq!(output, "Result: HELLO");
  assert_eq!(exec.context().get("summary"), Some(json!("Result: HELLO")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unregistered_hook_fails() {
  let yaml = r#"
workflow: { llm_provider: test }
agents: [{ name: w, instruction: "hello" }]
steps:
  - { name: s, agent: w, output: { name: out, post_processing: missing } }
"#;
  let mut exec = executor(yaml, Scripted::echo());

  let result = exec.run_once().await;
  assert!(matches!(result, Err(EngineError::HookNotFound { hook, .. }) if hook == "missing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_append_to_accumulates_from_concurrent_steps() {
  let yaml = r#"
workflow: { llm_provider: test }
agents:
  - { name: alpha, instruction: "alpha" }
  - { name: beta, instruction: "beta" }
steps:
  - name: first
    agent: alpha
    execution: async
    output: { name: first_out, append_to: [{ variable: log }] }
  - name: second
    agent: beta
    execution: async
    output:
      name: second_out
      append_to: [{ variable: log, format: "<{{ second_out }}>" }]
"#;
  let mut exec = executor(yaml, Scripted::echo());

  exec.run_once().await.unwrap();

  // The two steps race, so only the set of entries is fixed.
  let log = exec.context().get("log").unwrap();
  let mut entries: Vec<String> = log
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_str().unwrap().to_string())
    .collect();
  entries.sort();
  assert_eq!(entries, ["<beta>", "alpha"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_instruction_sees_upstream_output() {
  let yaml = r#"
workflow: { llm_provider: test }
agents:
  - { name: planner, instruction: "plan" }
  - { name: writer, instruction: "{% for p in outline %}[{{ p }}]{% endfor %}" }
steps:
  - { name: plan, agent: planner, output: { name: outline, type: list } }
  - { name: write, agent: writer, prerequisite: [plan], output: { name: draft } }
"#;
  let completion = Scripted::new(|request, _| {
    let text = instructions(request);
    if text == "plan" {
      Reply::text("- a\n- b")
    } else {
      Reply::text(text)
    }
  });
  let mut exec = executor(yaml, completion);

  let output = exec.run_once().await.unwrap();
  assert_eq!(output, "[a][b]");
}
