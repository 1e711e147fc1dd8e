//! Build planning: ordering services by their declared dependencies.
//!
//! [`build_plan`] walks the services depth-first, visiting each service's
//! dependencies before the service itself. Services are visited in
//! declaration order and dependencies in the order they are listed, so a
//! fixed manifest always yields the same plan. A back-edge during the walk is
//! a cycle; the services on the DFS stack from the repeated node onwards are
//! reported as its members.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::manifest::ServiceSpec;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
  #[error("service '{service}' depends on unknown service '{dependency}'")]
  UnknownDependency { service: String, dependency: String },

  #[error("dependency cycle: {}", format_cycle(.0))]
  Cycle(Vec<String>),
}

fn format_cycle(members: &[String]) -> String {
  let mut path = members.join(" -> ");
  if let Some(first) = members.first() {
    path.push_str(" -> ");
    path.push_str(first);
  }
  path
}

/// A service placed in the plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedService {
  pub spec: ServiceSpec,
  /// Plan indices of the direct dependencies, all smaller than this service's.
  pub dependencies: Vec<usize>,
}

/// Services in an order where every dependency precedes its dependents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildPlan {
  services: Vec<PlannedService>,
}

impl BuildPlan {
  pub fn len(&self) -> usize {
    self.services.len()
  }

  pub fn is_empty(&self) -> bool {
    self.services.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&PlannedService> {
    self.services.get(index)
  }

  pub fn iter(&self) -> impl Iterator<Item = &PlannedService> {
    self.services.iter()
  }

  pub fn names(&self) -> Vec<&str> {
    self.services.iter().map(|s| s.spec.name.as_str()).collect()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.services.iter().position(|s| s.spec.name == name)
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

struct Walk<'a> {
  services: &'a [ServiceSpec],
  deps: Vec<Vec<usize>>,
  marks: Vec<Mark>,
  /// Services on the current path, each with the position of its next
  /// dependency to visit.
  stack: Vec<(usize, usize)>,
  order: Vec<usize>,
}

impl Walk<'_> {
  /// Depth-first from `root` on an explicit stack, so chain length is not
  /// bounded by the thread stack.
  fn visit(&mut self, root: usize) -> Result<(), PlanError> {
    if self.marks[root] == Mark::Done {
      return Ok(());
    }
    self.enter(root);

    while let Some(frame) = self.stack.last_mut() {
      let (index, next) = *frame;
      let Some(&dep) = self.deps[index].get(next) else {
        self.stack.pop();
        self.marks[index] = Mark::Done;
        self.order.push(index);
        continue;
      };
      frame.1 += 1;

      match self.marks[dep] {
        Mark::Done => {}
        Mark::InProgress => return Err(self.cycle_from(dep)),
        Mark::Unvisited => self.enter(dep),
      }
    }
    Ok(())
  }

  fn enter(&mut self, index: usize) {
    self.marks[index] = Mark::InProgress;
    self.stack.push((index, 0));
  }

  /// The path members from `index` back round to it.
  fn cycle_from(&self, index: usize) -> PlanError {
    let start = self.stack.iter().position(|&(i, _)| i == index).unwrap_or(0);
    let members = self.stack[start..]
      .iter()
      .map(|&(i, _)| self.services[i].name.clone())
      .collect();
    PlanError::Cycle(members)
  }
}

/// Order `services` so that every service follows its dependencies.
pub fn build_plan(services: &[ServiceSpec]) -> Result<BuildPlan, PlanError> {
  let by_name: HashMap<&str, usize> = services.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();

  let mut deps = Vec::with_capacity(services.len());
  for service in services {
    let mut indices = Vec::with_capacity(service.depends_on.len());
    for dependency in &service.depends_on {
      let &index = by_name
        .get(dependency.as_str())
        .ok_or_else(|| PlanError::UnknownDependency {
          service: service.name.clone(),
          dependency: dependency.clone(),
        })?;
      if !indices.contains(&index) {
        indices.push(index);
      }
    }
    deps.push(indices);
  }

  let mut walk = Walk {
    services,
    deps,
    marks: vec![Mark::Unvisited; services.len()],
    stack: Vec::new(),
    order: Vec::with_capacity(services.len()),
  };
  for index in 0..services.len() {
    walk.visit(index)?;
  }

  let mut plan_index = vec![0; services.len()];
  for (position, &declared) in walk.order.iter().enumerate() {
    plan_index[declared] = position;
  }

  let planned = walk
    .order
    .iter()
    .map(|&declared| PlannedService {
      spec: services[declared].clone(),
      dependencies: walk.deps[declared].iter().map(|&d| plan_index[d]).collect(),
    })
    .collect();

  let plan = BuildPlan { services: planned };
  debug!(services = plan.len(), order = ?plan.names(), "computed build plan");
  Ok(plan)
}
