//! Types for build execution.
//!
//! This module defines the error type, the per-service outcomes and the
//! report returned by a run, and the configuration of the engine.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::ResolvePolicy;
use crate::plan::PlanError;
use crate::registry::RecordOutcome;
use crate::util::hash::ContentHash;

/// Fatal errors surfaced before any source is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error("service '{service}' references unknown source '{source_name}'")]
  UnknownSource { service: String, source_name: String },
}

/// How one service ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServiceOutcome {
  Success {
    fingerprint: ContentHash,
    /// The artifact was served by the cache rather than a provider call.
    from_cache: bool,
    /// The emitted outputs were already up to date and were not rewritten.
    unchanged: bool,
  },
  Failed {
    error: String,
  },
  /// Not attempted because a dependency did not succeed.
  Skipped {
    failed_dependency: String,
  },
  Cancelled,
}

impl ServiceOutcome {
  pub fn kind(&self) -> RecordOutcome {
    match self {
      ServiceOutcome::Success { .. } => RecordOutcome::Success,
      ServiceOutcome::Failed { .. } => RecordOutcome::Failed,
      ServiceOutcome::Skipped { .. } => RecordOutcome::Skipped,
      ServiceOutcome::Cancelled => RecordOutcome::Cancelled,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, ServiceOutcome::Success { .. })
  }
}

impl fmt::Display for ServiceOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ServiceOutcome::Success {
        fingerprint,
        from_cache,
        unchanged,
      } => {
        write!(f, "success ({})", fingerprint.short())?;
        if *from_cache {
          f.write_str(" [cached]")?;
        }
        if *unchanged {
          f.write_str(" [unchanged]")?;
        }
        Ok(())
      }
      ServiceOutcome::Failed { error } => write!(f, "failed: {error}"),
      ServiceOutcome::Skipped { failed_dependency } => {
        write!(f, "skipped: dependency '{failed_dependency}' did not succeed")
      }
      ServiceOutcome::Cancelled => f.write_str("cancelled"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
  pub name: String,
  pub outcome: ServiceOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
  pub success: usize,
  pub failed: usize,
  pub skipped: usize,
  pub cancelled: usize,
}

/// Outcome of every planned service, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
  pub services: Vec<ServiceReport>,
  pub counts: ReportCounts,
  pub elapsed_ms: u64,
}

impl BuildReport {
  pub fn new(services: Vec<ServiceReport>, elapsed: Duration) -> Self {
    let mut counts = ReportCounts::default();
    for service in &services {
      match service.outcome.kind() {
        RecordOutcome::Success => counts.success += 1,
        RecordOutcome::Failed => counts.failed += 1,
        RecordOutcome::Skipped => counts.skipped += 1,
        RecordOutcome::Cancelled => counts.cancelled += 1,
      }
    }
    Self {
      services,
      counts,
      elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
  }

  /// False iff at least one service ended `Failed`.
  pub fn is_success(&self) -> bool {
    self.counts.failed == 0
  }

  pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
    self.services.iter().find(|s| s.name == service).map(|s| &s.outcome)
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteConfig {
  /// Maximum number of services resolved in parallel.
  pub parallelism: usize,
  /// Cancel the run once this much time has passed.
  pub deadline: Option<Duration>,
  /// Cache policy for generated sources.
  pub policy: ResolvePolicy,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      deadline: None,
      policy: ResolvePolicy {
        refresh_on_build: true,
        fallback: Default::default(),
      },
    }
  }
}

/// Get the number of CPUs for default parallelism.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
