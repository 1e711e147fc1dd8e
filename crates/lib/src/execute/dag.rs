//! Execution DAG over a build plan.
//!
//! The plan fixes a linear order; the DAG groups that order into waves of
//! services whose dependencies all lie in earlier waves. Services inside a
//! wave can run concurrently and are listed in plan order.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::plan::BuildPlan;

/// Dependency graph with one node per plan index. Edges point from a
/// dependency to its dependent.
pub struct ExecutionDag {
  graph: DiGraph<usize, ()>,
  nodes: Vec<NodeIndex>,
}

impl ExecutionDag {
  pub fn from_plan(plan: &BuildPlan) -> Self {
    let mut graph = DiGraph::with_capacity(plan.len(), 0);
    let nodes: Vec<NodeIndex> = (0..plan.len()).map(|i| graph.add_node(i)).collect();

    for (index, planned) in plan.iter().enumerate() {
      for &dep in &planned.dependencies {
        graph.add_edge(nodes[dep], nodes[index], ());
      }
    }

    Self { graph, nodes }
  }

  /// Direct dependencies of a plan index, in plan order.
  pub fn dependencies(&self, index: usize) -> Vec<usize> {
    let Some(&node) = self.nodes.get(index) else {
      return Vec::new();
    };
    let mut deps: Vec<usize> = self
      .graph
      .neighbors_directed(node, Direction::Incoming)
      .map(|n| self.graph[n])
      .collect();
    deps.sort_unstable();
    deps
  }

  /// Group plan indices into parallel execution waves.
  ///
  /// A service's wave is one past the deepest wave among its dependencies.
  /// The plan is already topologically ordered, so a single forward pass
  /// assigns every level.
  pub fn waves(&self) -> Vec<Vec<usize>> {
    let mut level: HashMap<usize, usize> = HashMap::with_capacity(self.nodes.len());
    let mut waves: Vec<Vec<usize>> = Vec::new();

    for (index, &node) in self.nodes.iter().enumerate() {
      let wave = self
        .graph
        .neighbors_directed(node, Direction::Incoming)
        .filter_map(|dep| level.get(&self.graph[dep]))
        .map(|&l| l + 1)
        .max()
        .unwrap_or(0);
      level.insert(index, wave);

      if waves.len() <= wave {
        waves.resize_with(wave + 1, Vec::new);
      }
      waves[wave].push(index);
    }

    waves
  }
}
