//! Troupe Engine
//!
//! Executes a [`troupe_workflow::Workflow`] against a
//! [`troupe_completion::Completion`] service.
//!
//! - [`WorkflowExecutor`] owns a run: context store, history, whole-run retry
//! - the scheduler dispatches steps as their prerequisites complete
//! - the step runner handles agent resolution, `for_each` fan-out and the output
//!   pipeline (extraction, post-processing, format, `append_to`)
//! - [`TransferToAgent`] is a tool that hands a query to another agent

mod context;
mod error;
mod events;
mod executor;
mod extract;
mod hooks;
mod runner;
mod scheduler;
mod signal;
mod template;
mod transfer;

pub use context::ContextStore;
pub use error::EngineError;
pub use events::{
  ChannelNotifier, ChannelStreamSink, ExecutionEvent, ExecutionNotifier, NoopNotifier, Severity,
  StreamSink,
};
pub use executor::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRY, ExecutorConfig, WorkflowExecutor};
pub use extract::{ExtractError, extract_list, extract_object, truncate_at_stop};
pub use hooks::{HookRegistry, PostProcessor};
pub use runner::StepRecord;
pub use signal::{Signal, Signals};
pub use template::render;
pub use transfer::{TRANSFER_TO_AGENT, Transfer, TransferLog, TransferToAgent};
