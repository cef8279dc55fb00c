use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use troupe_completion::{Completion, OpenAiClient, Providers, StreamChunk, ToolRegistry};
use troupe_engine::{
  ExecutionEvent, ExecutionNotifier, ExecutorConfig, Severity, StreamSink, TRANSFER_TO_AGENT,
  TransferLog, TransferToAgent, WorkflowExecutor,
};
use troupe_workflow::Workflow;

/// Troupe - run multi-agent conversational workflows
#[derive(Parser)]
#[command(name = "troupe")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log level filter (RUST_LOG takes precedence)
  #[arg(long, global = true, default_value = "warn")]
  log_level: String,

  /// Log output format
  #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
  log_format: LogFormat,

  /// Path to the provider settings file (default: ~/.troupe/providers.yaml)
  #[arg(long, global = true)]
  providers: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
  Text,
  Json,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow once
  Run {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,

    /// User input for the run (read from stdin when piped)
    #[arg(long)]
    input: Option<String>,

    #[command(flatten)]
    options: RunOptions,
  },

  /// Converse with a workflow, one run per line of input
  Chat {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,

    #[command(flatten)]
    options: RunOptions,
  },

  /// Run a single step, ignoring its prerequisites
  RunStep {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,

    /// The step to execute
    #[arg(long)]
    step: String,

    #[command(flatten)]
    options: RunOptions,
  },

  /// Parse a workflow and report its step plan
  Validate {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,
  },
}

#[derive(Args)]
struct RunOptions {
  /// Context variable as KEY=VALUE; VALUE is parsed as JSON, falling back to a string
  #[arg(long = "var", value_parser = parse_var)]
  vars: Vec<(String, Value)>,

  /// Print model output as it streams
  #[arg(long)]
  stream: bool,

  /// Attempts per run
  #[arg(long)]
  max_retry: Option<usize>,

  /// Async steps and items allowed in flight
  #[arg(long)]
  max_concurrency: Option<usize>,
}

impl RunOptions {
  fn config(&self) -> ExecutorConfig {
    let mut config = ExecutorConfig::default().with_stream(self.stream);
    if let Some(max_retry) = self.max_retry {
      config = config.with_max_retry(max_retry);
    }
    if let Some(max_concurrency) = self.max_concurrency {
      config = config.with_max_concurrency(max_concurrency);
    }
    config
  }

  fn context(&self) -> Map<String, Value> {
    self.vars.iter().cloned().collect()
  }
}

fn parse_var(raw: &str) -> Result<(String, Value), String> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
  if key.trim().is_empty() {
    return Err(format!("empty variable name in '{raw}'"));
  }
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((key.trim().to_string(), value))
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level, cli.log_format);

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      input,
      options,
    }) => run_workflow(&workflow_file, input, &options, cli.providers)?,
    Some(Commands::Chat {
      workflow_file,
      options,
    }) => chat(&workflow_file, &options, cli.providers)?,
    Some(Commands::RunStep {
      workflow_file,
      step,
      options,
    }) => run_step(&workflow_file, &step, &options, cli.providers)?,
    Some(Commands::Validate { workflow_file }) => validate(&workflow_file)?,
    None => {
      println!("troupe - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing(level: &str, format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  match format {
    LogFormat::Json => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(io::stderr))
        .init();
    }
    LogFormat::Text => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
    }
  }
}

fn run_workflow(
  workflow_file: &Path,
  input: Option<String>,
  options: &RunOptions,
  providers: Option<PathBuf>,
) -> Result<()> {
  let input = match input {
    Some(input) => input,
    None => read_input_from_stdin()?,
  };

  let rt = tokio::runtime::Runtime::new()?;
  let mut executor = build_executor(workflow_file, options, providers)?;
  let output = rt.block_on(executor.run(&input));

  if output.is_empty() {
    bail!("workflow '{}' failed", executor.workflow().name);
  }
  if !options.stream {
    println!("{output}");
  }
  Ok(())
}

fn chat(workflow_file: &Path, options: &RunOptions, providers: Option<PathBuf>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  let mut executor = build_executor(workflow_file, options, providers)?;
  eprintln!(
    "Chatting with workflow: {} (empty line or Ctrl-D to quit)",
    executor.workflow().name
  );

  let stdin = io::stdin();
  let mut lines = stdin.lock().lines();
  loop {
    eprint!("> ");
    io::stderr().flush()?;

    let Some(line) = lines.next() else { break };
    let line = line.context("failed to read from stdin")?;
    if line.trim().is_empty() {
      break;
    }

    let output = rt.block_on(executor.run(&line));
    if output.is_empty() {
      eprintln!("(no answer, the workflow failed)");
    } else if !options.stream {
      println!("{output}");
    }
  }

  Ok(())
}

fn run_step(
  workflow_file: &Path,
  step: &str,
  options: &RunOptions,
  providers: Option<PathBuf>,
) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  let mut executor = build_executor(workflow_file, options, providers)?;

  let output = rt
    .block_on(executor.run_step(step))
    .with_context(|| format!("step '{step}' failed"))?;

  match output {
    Value::String(text) if !options.stream => println!("{text}"),
    Value::String(_) => {}
    other => println!("{}", serde_json::to_string_pretty(&other)?),
  }
  Ok(())
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  let graph = workflow.graph();

  println!("Workflow: {}", workflow.name);
  println!("Provider: {}", workflow.llm_provider);
  println!(
    "{} agents, {} functions, {} steps",
    workflow.agents.len(),
    workflow.functions.len(),
    workflow.steps.len()
  );
  println!();

  for step in &workflow.steps {
    let prerequisites = if step.prerequisite.is_empty() {
      "-".to_string()
    } else {
      step.prerequisite.join(", ")
    };
    println!(
      "  {:>3}  {:<24} {:<6} agent={} after={}",
      step.order,
      step.name,
      format!("{:?}", step.execution).to_lowercase(),
      step.agent,
      prerequisites
    );
  }
  println!();
  println!("Entry points: {}", graph.entry_points().join(", "));

  if graph.is_schedulable() {
    println!("OK");
    return Ok(());
  }

  for (step, missing) in graph.unknown_prerequisites() {
    eprintln!("error: step '{step}' waits on unknown step '{missing}'");
  }
  if let Some(cycle) = graph.find_cycle() {
    eprintln!("error: prerequisite cycle {}", cycle.join(" -> "));
  }
  bail!("workflow '{}' can never complete", workflow.name);
}

fn load_workflow(workflow_file: &Path) -> Result<Workflow> {
  let workflow = Workflow::from_path(workflow_file)
    .with_context(|| format!("failed to load workflow file: {}", workflow_file.display()))?;
  eprintln!("Loaded workflow: {}", workflow.name);
  Ok(workflow)
}

fn build_executor(
  workflow_file: &Path,
  options: &RunOptions,
  providers: Option<PathBuf>,
) -> Result<WorkflowExecutor> {
  let workflow = load_workflow(workflow_file)?;
  let (completion, transfers) = build_completion(&workflow, providers)?;

  let mut executor = WorkflowExecutor::new(workflow, completion, options.config())
    .with_transfers(transfers)
    .with_context(options.context())
    .with_notifier(Arc::new(StatusPrinter));
  if options.stream {
    executor = executor.with_stream_sink(Arc::new(StdoutSink));
  }
  Ok(executor)
}

/// The provider client, with the agent transfer tool registered.
fn build_completion(
  workflow: &Workflow,
  providers: Option<PathBuf>,
) -> Result<(Arc<dyn Completion>, TransferLog)> {
  let path = match providers {
    Some(path) => path,
    None => Providers::default_path()?,
  };
  let providers = Providers::load(&path)
    .with_context(|| format!("failed to load provider settings: {}", path.display()))?;

  let name = &workflow.llm_provider;
  let settings = providers.get(name)?;
  let api_key = settings.resolve_api_key(name)?;
  let client = OpenAiClient::new(settings, api_key)
    .with_context(|| format!("failed to create client for provider '{name}'"))?;

  let transfers = TransferLog::new();
  let mut tools = ToolRegistry::new();
  tools.register(
    TRANSFER_TO_AGENT,
    TransferToAgent::new(
      Arc::new(workflow.clone()),
      Arc::new(client.clone()),
      transfers.clone(),
    ),
  );

  Ok((Arc::new(client.with_tools(tools)), transfers))
}

fn read_input_from_stdin() -> Result<String> {
  if io::stdin().is_terminal() {
    return Ok(String::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;
  Ok(input)
}

/// Prints status events to stderr.
struct StatusPrinter;

impl ExecutionNotifier for StatusPrinter {
  fn notify(&self, event: ExecutionEvent) {
    // Agent output is already on stdout or in the final answer.
    if matches!(event, ExecutionEvent::AgentOutput { .. }) {
      return;
    }
    let tag = match event.severity() {
      Severity::Info => "info",
      Severity::Success => "done",
      Severity::Warning => "warn",
      Severity::Error => "error",
    };
    eprintln!("[{tag}] {}", event.message());
  }
}

/// Writes streamed content straight to stdout.
struct StdoutSink;

impl StreamSink for StdoutSink {
  fn chunk(&self, _step: &str, chunk: &StreamChunk) {
    let mut stdout = io::stdout().lock();
    if let Some(content) = &chunk.content {
      let _ = stdout.write_all(content.as_bytes());
    }
    if chunk.is_end() {
      let _ = stdout.write_all(b"\n");
    }
    let _ = stdout.flush();
  }
}
