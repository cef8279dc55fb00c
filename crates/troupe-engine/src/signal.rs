//! One-shot completion latches, one per step.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A latch that is set at most once and stays set.
#[derive(Debug, Clone, Default)]
pub struct Signal {
  set: Arc<AtomicBool>,
}

impl Signal {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the latch. Returns `false` if it was already set.
  pub fn set(&self) -> bool {
    !self.set.swap(true, Ordering::AcqRel)
  }

  pub fn is_set(&self) -> bool {
    self.set.load(Ordering::Acquire)
  }
}

/// The latches of one scheduler pass, keyed by step name.
#[derive(Debug, Clone, Default)]
pub struct Signals {
  signals: HashMap<String, Signal>,
}

impl Signals {
  /// Fresh, unset latches for the given steps.
  pub fn for_steps<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
    Self {
      signals: names
        .into_iter()
        .map(|name| (name.to_string(), Signal::new()))
        .collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&Signal> {
    self.signals.get(name)
  }

  pub fn is_set(&self, name: &str) -> bool {
    self.signals.get(name).is_some_and(Signal::is_set)
  }

  /// True when every named latch exists and is set. Unknown names never are.
  pub fn all_set(&self, names: &[String]) -> bool {
    names.iter().all(|name| self.is_set(name))
  }
}
