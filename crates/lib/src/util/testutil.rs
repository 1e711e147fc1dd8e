//! Test helpers shared across modules.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::artifact::{ArtifactFile, FunctionArtifact};
use crate::cancel::CancelToken;
use crate::source::{GeneratedSource, LocalSource, SourceError, SourceIdentity, SourceProvider, SourceSpec};

/// A scripted provider that counts calls.
///
/// Each successful call returns `"<identity>#<n>"` where `n` is the global call
/// number, so two calls never produce the same bytes.
#[derive(Default)]
pub struct FakeProvider {
  calls: AtomicUsize,
  per_identity: Mutex<HashMap<SourceIdentity, usize>>,
  failures: Mutex<HashMap<SourceIdentity, SourceError>>,
  delay: Duration,
}

impl FakeProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every call sleeps for `delay` before answering.
  pub fn with_delay(delay: Duration) -> Self {
    Self {
      delay,
      ..Self::default()
    }
  }

  pub fn fail(&self, identity: &SourceIdentity, error: SourceError) {
    self.failures.lock().insert(identity.clone(), error);
  }

  pub fn recover(&self, identity: &SourceIdentity) {
    self.failures.lock().remove(identity);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn calls_for(&self, identity: &SourceIdentity) -> usize {
    self.per_identity.lock().get(identity).copied().unwrap_or(0)
  }
}

#[async_trait]
impl SourceProvider for FakeProvider {
  async fn resolve(&self, spec: &SourceSpec, cancel: &CancelToken) -> Result<FunctionArtifact, SourceError> {
    let identity = spec.identity();
    let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    *self.per_identity.lock().entry(identity.clone()).or_default() += 1;

    if !self.delay.is_zero() {
      tokio::select! {
        _ = cancel.cancelled() => return Err(SourceError::Cancelled),
        _ = tokio::time::sleep(self.delay) => {}
      }
    }

    if let Some(error) = self.failures.lock().get(&identity).cloned() {
      return Err(error);
    }

    let content = format!("{identity}#{n}");
    Ok(FunctionArtifact::new(
      identity,
      vec![ArtifactFile::new("function.py", content)],
    ))
  }
}

pub fn local_spec(dir: &str) -> SourceSpec {
  SourceSpec::Local(LocalSource {
    path: PathBuf::from(dir),
    files: vec!["function.py".to_string()],
  })
}

pub fn generated_spec(prompt_id: &str) -> SourceSpec {
  SourceSpec::Generated(GeneratedSource {
    provider: "fake".to_string(),
    model: None,
    prompt_id: prompt_id.to_string(),
    prompt_text: format!("generate {prompt_id}"),
    params: BTreeMap::new(),
    output_file: None,
  })
}
