//! Dependency-aware scheduling of all steps of one pass.

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, instrument, warn};
use troupe_workflow::{ExecutionMode, Step};

use crate::error::EngineError;
use crate::runner::StepRunner;
use crate::signal::Signals;

/// Result of a spawned async step.
type StepTask = Result<(), EngineError>;

pub(crate) struct Scheduler {
  runner: StepRunner,
  signals: Signals,
}

impl Scheduler {
  /// A scheduler with fresh latches for every step of the workflow.
  pub fn new(runner: StepRunner) -> Self {
    let signals = Signals::for_steps(runner.workflow.steps.iter().map(|s| s.name.as_str()));
    Self { runner, signals }
  }

  /// Run every step to completion.
  ///
  /// Each round scans the pending steps in order and dispatches every step whose
  /// prerequisites have all completed. Sync steps run inline; async steps are
  /// spawned and take a slot from the shared pool. A round that dispatches
  /// nothing waits for the next in-flight step, or fails with `CyclicDependency`
  /// when nothing is in flight. The first step failure aborts the pass.
  #[instrument(
    name = "scheduler_execute",
    skip(self),
    fields(execution_id = %self.runner.execution_id)
  )]
  pub async fn execute(&self) -> Result<(), EngineError> {
    let mut in_flight: JoinSet<StepTask> = JoinSet::new();
    let result = self.drive(&mut in_flight).await;
    if result.is_err() {
      // Aborted steps may be mid-poll; wait for them so none writes after the
      // pass has returned.
      in_flight.shutdown().await;
    }
    result
  }

  async fn drive(&self, in_flight: &mut JoinSet<StepTask>) -> Result<(), EngineError> {
    let workflow = self.runner.workflow.clone();
    let mut pending: Vec<&Step> = workflow.steps.iter().collect();

    while !pending.is_empty() {
      while let Some(joined) = in_flight.try_join_next() {
        flatten(joined)?;
      }

      let mut dispatched = Vec::new();
      let mut index = 0;
      while index < pending.len() {
        let step = pending[index];
        if !self.signals.all_set(&step.prerequisite) {
          index += 1;
          continue;
        }
        pending.remove(index);
        dispatched.push(step.name.as_str());

        match step.execution {
          ExecutionMode::Sync => {
            self
              .runner
              .run(step, None, self.signals.get(&step.name))
              .await?;
          }
          ExecutionMode::Async => self.spawn(in_flight, step),
        }
      }

      if !dispatched.is_empty() {
        debug!(execution_id = %self.runner.execution_id, steps = ?dispatched, "round_dispatched");
        // Let freshly spawned steps start before the next scan.
        tokio::task::yield_now().await;
        continue;
      }

      if in_flight.is_empty() {
        let stuck: Vec<String> = pending.iter().map(|s| s.name.clone()).collect();
        warn!(execution_id = %self.runner.execution_id, pending = ?stuck, "no_schedulable_step");
        return Err(EngineError::CyclicDependency { pending: stuck });
      }

      // Nothing ready: sleep until an in-flight step finishes.
      if let Some(joined) = in_flight.join_next().await {
        flatten(joined)?;
      }
    }

    while let Some(joined) = in_flight.join_next().await {
      flatten(joined)?;
    }
    Ok(())
  }

  fn spawn(&self, in_flight: &mut JoinSet<StepTask>, step: &Step) {
    let runner = self.runner.clone();
    let step = step.clone();
    let signal = self.signals.get(&step.name).cloned();

    in_flight.spawn(async move {
      let permit = runner
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| EngineError::Join {
          message: e.to_string(),
        })?;
      runner.run(&step, Some(permit), signal.as_ref()).await?;
      Ok(())
    });
  }
}

fn flatten(joined: Result<StepTask, JoinError>) -> Result<(), EngineError> {
  joined.map_err(|e| EngineError::Join {
    message: e.to_string(),
  })?
}
