//! Troupe Workflow
//!
//! This crate provides the validated workflow representation for troupe.
//! A [`Workflow`] is built from a `troupe-config` document and is ready for
//! execution by the engine.
//!
//! Key differences from `troupe-config`:
//! - Step and agent names are checked for uniqueness
//! - Agent function names are resolved to their declarations (unknown names dropped)
//! - Steps are kept in stable `order`
//! - The prerequisite graph can be inspected for unknown references and cycles

mod agent;
mod error;
mod graph;
mod workflow;

pub use agent::{Agent, DEFAULT_HISTORY_LENGTH};
pub use error::WorkflowError;
pub use graph::Graph;
pub use workflow::{Step, Workflow};

pub use troupe_config::{
  AppendTarget, ExecutionMode, ForEachDef, FunctionDef, OutputDef, OutputType, Template,
};
