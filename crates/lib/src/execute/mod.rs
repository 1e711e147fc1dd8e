//! Build execution.
//!
//! The [`Engine`] turns a manifest into a [`BuildReport`]:
//! - plans the services and rejects unknown dependencies and cycles up front
//! - runs the plan in waves, resolving independent services in parallel
//! - skips every service whose dependency did not succeed
//! - emits outputs and registry records for each finished service
//!
//! A run is cancelled cooperatively through its [`CancelToken`], either by the
//! caller or by the configured deadline. Services that have not finished by
//! then end `Cancelled`; services already built keep their records.

pub mod dag;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::artifact::unix_now;
use crate::cache::{ArtifactCache, CacheError, Resolution, ResolvePolicy};
use crate::cancel::CancelToken;
use crate::events::{BuildEvent, EventSink, NoopSink};
use crate::manifest::{Manifest, ServiceSpec};
use crate::outputs::{OutputError, OutputWriter};
use crate::plan::{BuildPlan, build_plan};
use crate::registry::{RecordOutcome, Registry, RegistryError, RegistryRecord};
use crate::source::{SourceProvider, SourceSpec};
use crate::util::hash::Hashable;

pub use dag::ExecutionDag;
pub use types::{BuildReport, EngineError, ExecuteConfig, ReportCounts, ServiceOutcome, ServiceReport, num_cpus};

/// Failure to publish a resolved artifact.
#[derive(Debug, Error)]
enum PublishError {
  #[error(transparent)]
  Output(#[from] OutputError),

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

/// Resolves, emits and records every service of a manifest.
///
/// The cache, provider, registry and event sink are injected; the engine owns
/// no global state and is cheap to clone into worker tasks.
#[derive(Clone)]
pub struct Engine {
  cache: Arc<ArtifactCache>,
  provider: Arc<dyn SourceProvider>,
  registry: Registry,
  outputs: OutputWriter,
  events: Arc<dyn EventSink>,
  config: ExecuteConfig,
}

impl Engine {
  pub fn new(
    cache: Arc<ArtifactCache>,
    provider: Arc<dyn SourceProvider>,
    registry: Registry,
    outputs: OutputWriter,
    config: ExecuteConfig,
  ) -> Self {
    Self {
      cache,
      provider,
      registry,
      outputs,
      events: Arc::new(NoopSink),
      config,
    }
  }

  pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
    self.events = events;
    self
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  /// Plan and build every service in `manifest`.
  ///
  /// Structural defects (unknown dependencies or sources, cycles) fail the
  /// whole run before any source is resolved. Everything else is reported
  /// per service.
  pub async fn run(&self, manifest: &Manifest, cancel: &CancelToken) -> Result<BuildReport, EngineError> {
    let plan = build_plan(&manifest.services)?;
    let sources = plan
      .iter()
      .map(|planned| {
        manifest
          .source_of(&planned.spec)
          .cloned()
          .ok_or_else(|| EngineError::UnknownSource {
            service: planned.spec.name.clone(),
            source_name: planned.spec.function.source.clone(),
          })
      })
      .collect::<Result<Vec<_>, _>>()?;

    Ok(self.execute(&plan, &sources, cancel).await)
  }

  /// Execute `plan`, where `sources[i]` is the source of the i-th planned service.
  pub async fn execute(&self, plan: &BuildPlan, sources: &[SourceSpec], cancel: &CancelToken) -> BuildReport {
    let started = Instant::now();
    info!(
      services = plan.len(),
      parallelism = self.config.parallelism,
      "starting build run"
    );
    self.events.emit(BuildEvent::RunStarted { services: plan.len() });

    let deadline = self.config.deadline.map(|d| cancel.cancel_after(d));

    let dag = ExecutionDag::from_plan(plan);
    let waves = dag.waves();
    debug!(wave_count = waves.len(), "computed execution waves");

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut outcomes: Vec<Option<ServiceOutcome>> = vec![None; plan.len()];

    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(wave = wave_idx, services = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for &index in wave {
        let (Some(planned), Some(source)) = (plan.get(index), sources.get(index)) else {
          continue;
        };

        let blocked = if cancel.is_cancelled() {
          Some(ServiceOutcome::Cancelled)
        } else {
          find_failed_dependency(&dag, index, &outcomes).map(|dep| match &outcomes[dep] {
            Some(ServiceOutcome::Cancelled) => ServiceOutcome::Cancelled,
            _ => ServiceOutcome::Skipped {
              failed_dependency: plan.get(dep).map(|p| p.spec.name.clone()).unwrap_or_default(),
            },
          })
        };

        match blocked {
          Some(outcome) => {
            if let ServiceOutcome::Skipped { failed_dependency } = &outcome {
              warn!(
                service = %planned.spec.name,
                failed_dep = %failed_dependency,
                "skipping service due to failed dependency"
              );
            }
            self.finish_unstarted(&planned.spec, source, &outcome);
            outcomes[index] = Some(outcome);
          }
          None => ready.push(index),
        }
      }

      if !ready.is_empty() {
        for (index, outcome) in self.execute_wave(&ready, plan, sources, cancel, semaphore.clone()).await {
          outcomes[index] = Some(outcome);
        }
      }
    }

    if let Some(deadline) = deadline {
      deadline.abort();
    }

    let services = plan
      .iter()
      .zip(outcomes)
      .map(|(planned, outcome)| ServiceReport {
        name: planned.spec.name.clone(),
        outcome: outcome.unwrap_or(ServiceOutcome::Cancelled),
      })
      .collect();
    let report = BuildReport::new(services, started.elapsed());

    info!(
      success = report.counts.success,
      failed = report.counts.failed,
      skipped = report.counts.skipped,
      cancelled = report.counts.cancelled,
      elapsed_ms = report.elapsed_ms,
      "build run complete"
    );
    self.events.emit(BuildEvent::RunFinished {
      success: report.is_success(),
      elapsed_ms: report.elapsed_ms,
    });
    report
  }

  /// Build a wave of services in parallel, bounded by `semaphore`.
  async fn execute_wave(
    &self,
    indices: &[usize],
    plan: &BuildPlan,
    sources: &[SourceSpec],
    cancel: &CancelToken,
    semaphore: Arc<Semaphore>,
  ) -> Vec<(usize, ServiceOutcome)> {
    let mut join_set = JoinSet::new();
    let mut task_index = HashMap::new();

    for &index in indices {
      let (Some(planned), Some(source)) = (plan.get(index), sources.get(index)) else {
        continue;
      };
      let engine = self.clone();
      let service = planned.spec.clone();
      let source = source.clone();
      let cancel = cancel.clone();
      let semaphore = semaphore.clone();

      let handle = join_set.spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
          return ServiceOutcome::Cancelled;
        };
        if cancel.is_cancelled() {
          let outcome = ServiceOutcome::Cancelled;
          engine.finish_unstarted(&service, &source, &outcome);
          return outcome;
        }
        engine.build_service(&service, &source, &cancel).await
      });
      task_index.insert(handle.id(), index);
    }

    let mut results = Vec::with_capacity(indices.len());
    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((id, outcome)) => {
          if let Some(&index) = task_index.get(&id) {
            results.push((index, outcome));
          }
        }
        Err(e) => {
          error!(error = %e, "service task panicked");
          if let Some(&index) = task_index.get(&e.id()) {
            results.push((
              index,
              ServiceOutcome::Failed {
                error: format!("build task failed: {e}"),
              },
            ));
          }
        }
      }
    }
    results
  }

  /// Resolve, emit and record a single service.
  async fn build_service(&self, service: &ServiceSpec, source: &SourceSpec, cancel: &CancelToken) -> ServiceOutcome {
    let identity = source.identity();
    info!(service = %service.name, identity = %identity, "building service");
    self.events.emit(BuildEvent::ServiceStart {
      service: service.name.clone(),
    });

    let policy = self.policy_for(source);
    let resolved = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(CacheError::Cancelled(identity.clone())),
      result = self.cache.resolve(source, policy, self.provider.as_ref(), cancel) => result,
    };

    let outcome = match resolved {
      Ok(resolution) => match self.publish(service, &resolution) {
        Ok(unchanged) => {
          info!(
            service = %service.name,
            fingerprint = %resolution.artifact.fingerprint.short(),
            origin = ?resolution.origin,
            unchanged,
            "service built"
          );
          ServiceOutcome::Success {
            fingerprint: resolution.artifact.fingerprint.clone(),
            from_cache: resolution.from_cache(),
            unchanged,
          }
        }
        Err(e) => {
          error!(service = %service.name, error = %e, "failed to publish service");
          self.fail(service, e.to_string())
        }
      },
      Err(CacheError::Cancelled(_)) => {
        warn!(service = %service.name, "service cancelled");
        ServiceOutcome::Cancelled
      }
      Err(e) => {
        error!(service = %service.name, identity = %identity, error = %e, "failed to resolve service source");
        self.fail(service, e.to_string())
      }
    };

    if !outcome.is_success() {
      self.record_unsuccessful(service, source, outcome.kind());
    }
    self.events.emit(BuildEvent::ServiceFinished {
      service: service.name.clone(),
      outcome: outcome.kind(),
    });
    outcome
  }

  fn fail(&self, service: &ServiceSpec, error: String) -> ServiceOutcome {
    self.events.emit(BuildEvent::Error {
      service: service.name.clone(),
      message: error.clone(),
    });
    ServiceOutcome::Failed { error }
  }

  /// Emit outputs and record success. Returns true when the outputs were
  /// already current and nothing was written.
  fn publish(&self, service: &ServiceSpec, resolution: &Resolution) -> Result<bool, PublishError> {
    let artifact = &resolution.artifact;
    let existing = self.registry.load(&service.name).unwrap_or_else(|e| {
      warn!(service = %service.name, error = %e, "ignoring unreadable registry record");
      None
    });
    if self.outputs.is_current(service, artifact, existing.as_ref()) {
      debug!(service = %service.name, "outputs up to date");
      return Ok(true);
    }

    let digest = service.compute_hash().map_err(OutputError::from)?;
    self.outputs.emit(service, artifact)?;
    let record = RegistryRecord::success(
      &service.name,
      artifact.source_identity.clone(),
      artifact.fingerprint.clone(),
      artifact.resolved_at,
    )
    .with_service_digest(digest);
    self.registry.record(&record)?;
    Ok(false)
  }

  /// Record a service that ended without being attempted.
  fn finish_unstarted(&self, service: &ServiceSpec, source: &SourceSpec, outcome: &ServiceOutcome) {
    self.record_unsuccessful(service, source, outcome.kind());
    self.events.emit(BuildEvent::ServiceFinished {
      service: service.name.clone(),
      outcome: outcome.kind(),
    });
  }

  fn record_unsuccessful(&self, service: &ServiceSpec, source: &SourceSpec, outcome: RecordOutcome) {
    let record = RegistryRecord::unsuccessful(&service.name, source.identity(), outcome, unix_now());
    if let Err(e) = self.registry.record(&record) {
      warn!(service = %service.name, error = %e, "failed to write registry record");
    }
  }

  /// Local and git sources always attempt resolution; only generated
  /// sources honour `refresh_on_build = false`.
  fn policy_for(&self, source: &SourceSpec) -> ResolvePolicy {
    if source.is_deterministic() {
      ResolvePolicy {
        refresh_on_build: true,
        ..self.config.policy
      }
    } else {
      self.config.policy
    }
  }
}

/// First direct dependency of `index` that did not succeed.
fn find_failed_dependency(dag: &ExecutionDag, index: usize, outcomes: &[Option<ServiceOutcome>]) -> Option<usize> {
  dag
    .dependencies(index)
    .into_iter()
    .find(|&dep| !matches!(outcomes.get(dep), Some(Some(outcome)) if outcome.is_success()))
}
