use std::collections::{HashMap, HashSet};

use crate::workflow::Step;

/// Prerequisite graph for traversal and analysis.
///
/// Edges point from a prerequisite to the step waiting on it. Prerequisite names
/// that match no step are kept aside instead of becoming edges.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Step order as given, used for deterministic traversal.
  order: Vec<String>,
  /// Adjacency list: step -> steps that list it as a prerequisite.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step -> its known prerequisites.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Steps with no known prerequisites.
  entry_points: Vec<String>,
  /// (step, prerequisite) pairs naming a step that does not exist.
  unknown: Vec<(String, String)>,
}

impl Graph {
  /// Build a graph from steps in their execution order.
  pub fn new(steps: &[Step]) -> Self {
    let names: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut unknown = Vec::new();

    for step in steps {
      adjacency.entry(step.name.clone()).or_default();
      reverse_adjacency.entry(step.name.clone()).or_default();
    }

    for step in steps {
      for prerequisite in &step.prerequisite {
        if !names.contains(prerequisite.as_str()) {
          unknown.push((step.name.clone(), prerequisite.clone()));
          continue;
        }
        adjacency
          .entry(prerequisite.clone())
          .or_default()
          .push(step.name.clone());
        reverse_adjacency
          .entry(step.name.clone())
          .or_default()
          .push(prerequisite.clone());
      }
    }

    let entry_points = steps
      .iter()
      .filter(|s| s.prerequisite.is_empty())
      .map(|s| s.name.clone())
      .collect();

    Self {
      order: steps.iter().map(|s| s.name.clone()).collect(),
      adjacency,
      reverse_adjacency,
      entry_points,
      unknown,
    }
  }

  /// Steps that can start immediately.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Steps waiting on the given step.
  pub fn downstream(&self, step: &str) -> &[String] {
    self
      .adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Known prerequisites of the given step.
  pub fn upstream(&self, step: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// `(step, prerequisite)` pairs where the prerequisite names no step.
  pub fn unknown_prerequisites(&self) -> &[(String, String)] {
    &self.unknown
  }

  /// Find one prerequisite cycle, returned as the path of step names that closes it.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    // DFS with coloring: 0 = white (unvisited), 1 = gray (in progress), 2 = black (done)
    let mut color: HashMap<&str, u8> = self.order.iter().map(|s| (s.as_str(), 0u8)).collect();
    let mut path: Vec<&str> = Vec::new();

    fn dfs<'a>(
      node: &'a str,
      graph: &'a Graph,
      color: &mut HashMap<&'a str, u8>,
      path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, 1);
      path.push(node);
      for next in graph.downstream(node) {
        match color.get(next.as_str()) {
          Some(1) => {
            // Back edge: the cycle is the path suffix starting at `next`.
            let start = path.iter().position(|n| *n == next.as_str()).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(next.clone());
            return Some(cycle);
          }
          Some(0) => {
            if let Some(cycle) = dfs(next.as_str(), graph, color, path) {
              return Some(cycle);
            }
          }
          _ => {}
        }
      }
      path.pop();
      color.insert(node, 2);
      None
    }

    for name in &self.order {
      if color.get(name.as_str()) == Some(&0) {
        if let Some(cycle) = dfs(name.as_str(), self, &mut color, &mut path) {
          return Some(cycle);
        }
      }
    }
    None
  }

  /// True when every step can eventually be scheduled.
  pub fn is_schedulable(&self) -> bool {
    self.unknown.is_empty() && self.find_cycle().is_none()
  }
}
