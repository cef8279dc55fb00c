//! Troupe Config
//!
//! This crate contains the serializable workflow document types for troupe.
//! These types mirror the document an operator writes (YAML or JSON) before it
//! is validated and resolved into a runnable workflow by `troupe-workflow`.
//!
//! A document has five top-level sections:
//! - `workflow`: header, including the `llm_provider` used to pick completion settings
//! - `global_variables`: initial context variables
//! - `functions`: callable function declarations agents may reference
//! - `agents`: named personas with an instruction template
//! - `steps`: units of work bound to an agent, with prerequisites and an output definition

mod agent;
mod enums;
mod function;
mod step;
mod template;
mod workflow;

pub use agent::{AgentDef, ForEachDef};
pub use enums::{ExecutionMode, OutputType};
pub use function::FunctionDef;
pub use step::{AppendTarget, OutputDef, StepDef};
pub use template::Template;
pub use workflow::{WorkflowDef, WorkflowHeader};
