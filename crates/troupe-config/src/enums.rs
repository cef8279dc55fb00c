use serde::{Deserialize, Serialize};

/// How a step (or a `for_each` loop) is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
  /// Run inline; the scheduler (or loop) waits for it before moving on.
  #[default]
  Sync,
  /// Run concurrently, bounded by the shared concurrency pool.
  Async,
}

/// The shape a step's raw model output is coerced into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
  #[default]
  String,
  List,
  Json,
}
