use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use troupe_config::{ExecutionMode, FunctionDef, OutputDef, StepDef, Template, WorkflowDef};

use crate::agent::{Agent, DEFAULT_HISTORY_LENGTH};
use crate::error::WorkflowError;
use crate::graph::Graph;

/// A step ready for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub name: String,
  pub description: String,
  pub order: i64,
  /// Agent name or template resolved against the context at run time.
  pub agent: Template,
  pub execution: ExecutionMode,
  pub prerequisite: Vec<String>,
  pub stop_character: Option<String>,
  pub output: OutputDef,
}

impl From<StepDef> for Step {
  fn from(def: StepDef) -> Self {
    Self {
      name: def.name,
      description: def.description,
      order: def.order,
      agent: def.agent,
      execution: def.execution,
      prerequisite: def.prerequisite,
      stop_character: def.stop_character,
      output: def.output,
    }
  }
}

/// A validated workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub name: String,
  pub description: String,
  /// Selects the completion settings; opaque to the engine.
  pub llm_provider: String,
  pub global_variables: serde_json::Map<String, serde_json::Value>,
  pub functions: HashMap<String, FunctionDef>,
  pub agents: HashMap<String, Agent>,
  /// Steps sorted by `order`; ties keep declaration order.
  pub steps: Vec<Step>,
}

impl Workflow {
  /// Parse and validate a YAML document. JSON documents parse too.
  pub fn from_yaml(text: &str) -> Result<Self, WorkflowError> {
    let def: WorkflowDef = serde_yaml::from_str(text).map_err(|e| WorkflowError::Parse {
      message: e.to_string(),
    })?;
    Self::from_def(def)
  }

  pub fn from_json(text: &str) -> Result<Self, WorkflowError> {
    let def: WorkflowDef = serde_json::from_str(text).map_err(|e| WorkflowError::Parse {
      message: e.to_string(),
    })?;
    Self::from_def(def)
  }

  /// Load a workflow file. `.json` files use the JSON parser, anything else YAML.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let is_json = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
      Self::from_json(&text)
    } else {
      Self::from_yaml(&text)
    }
  }

  /// Validate a parsed document and resolve agent functions.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    if def.workflow.llm_provider.trim().is_empty() {
      return Err(WorkflowError::missing("workflow.llm_provider"));
    }

    let functions: HashMap<String, FunctionDef> = def
      .functions
      .into_iter()
      .map(|f| (f.name.clone(), f))
      .collect();

    let mut agents = HashMap::new();
    for (index, agent) in def.agents.into_iter().enumerate() {
      if agent.name.trim().is_empty() {
        return Err(WorkflowError::missing(format!("agents[{index}].name")));
      }
      if agents.contains_key(&agent.name) {
        return Err(WorkflowError::DuplicateAgent(agent.name));
      }

      let resolved = agent
        .functions
        .iter()
        .filter_map(|name| match functions.get(name) {
          Some(function) => Some(function.clone()),
          None => {
            warn!(agent = %agent.name, function = %name, "unknown function dropped");
            None
          }
        })
        .collect();

      if let Some(for_each) = &agent.for_each {
        if for_each.item.trim().is_empty() {
          return Err(WorkflowError::missing(format!(
            "agents[{index}].for_each.item"
          )));
        }
        if for_each.list.trim().is_empty() {
          return Err(WorkflowError::missing(format!(
            "agents[{index}].for_each.list"
          )));
        }
      }

      agents.insert(
        agent.name.clone(),
        Agent {
          name: agent.name,
          description: agent.description,
          instruction: agent.instruction,
          functions: resolved,
          for_each: agent.for_each,
          history_length: agent.history_length.unwrap_or(DEFAULT_HISTORY_LENGTH),
        },
      );
    }

    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(def.steps.len());
    for (index, step) in def.steps.into_iter().enumerate() {
      if step.name.trim().is_empty() {
        return Err(WorkflowError::missing(format!("steps[{index}].name")));
      }
      if !seen.insert(step.name.clone()) {
        return Err(WorkflowError::DuplicateStep(step.name));
      }
      if step.agent.trim().is_empty() {
        return Err(WorkflowError::missing(format!("steps[{index}].agent")));
      }
      if step.output.name.trim().is_empty() {
        return Err(WorkflowError::missing(format!("steps[{index}].output.name")));
      }
      if step.stop_character.as_deref() == Some("") {
        return Err(WorkflowError::invalid(
          format!("steps[{index}].stop_character"),
          "must not be empty",
        ));
      }
      for (target, append) in step.output.append_to.iter().enumerate() {
        if append.variable.trim().is_empty() {
          return Err(WorkflowError::missing(format!(
            "steps[{index}].output.append_to[{target}].variable"
          )));
        }
      }
      steps.push(Step::from(step));
    }
    // Stable sort keeps declaration order among equal `order` values.
    steps.sort_by_key(|s| s.order);

    let workflow = Self {
      name: def.workflow.name,
      description: def.workflow.description,
      llm_provider: def.workflow.llm_provider,
      global_variables: def.global_variables,
      functions,
      agents,
      steps,
    };

    for (step, prerequisite) in workflow.graph().unknown_prerequisites() {
      warn!(step = %step, prerequisite = %prerequisite, "prerequisite names no step");
    }

    Ok(workflow)
  }

  /// Build the prerequisite graph.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.steps)
  }

  pub fn get_step(&self, name: &str) -> Option<&Step> {
    self.steps.iter().find(|s| s.name == name)
  }

  pub fn get_agent(&self, name: &str) -> Option<&Agent> {
    self.agents.get(name)
  }
}
