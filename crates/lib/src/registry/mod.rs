//! Build registry: the last build record of every service.
//!
//! The registry is read between runs to decide whether a service's outputs
//! are up to date, and by `microfunc status` for audit.
//!
//! # Layout
//!
//! ```text
//! {registry_dir}/
//! └── <service>.json
//! ```
//!
//! ```json
//! {
//!   "version": 1,
//!   "service": "printer-service",
//!   "artifactFingerprint": "9f86d081...",
//!   "sourceIdentity": "local:./functions#printer.py",
//!   "resolvedAt": 1733667300,
//!   "outcome": "success",
//!   "serviceDigest": "3b1f0c9a7d2e4f5a6b8c"
//! }
//! ```
//!
//! Each record is replaced atomically. A `success` record is only ever
//! replaced by a newer `success`; other outcomes are recorded only while no
//! successful build exists, so a failed rebuild never erases the last good one.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::SourceIdentity;
use crate::util::fs::write_atomic;
use crate::util::hash::{ContentHash, ObjectHash};

/// Current registry record format version.
pub const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
  Success,
  Failed,
  Skipped,
  Cancelled,
}

impl fmt::Display for RecordOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      RecordOutcome::Success => "success",
      RecordOutcome::Failed => "failed",
      RecordOutcome::Skipped => "skipped",
      RecordOutcome::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
  pub version: u32,
  pub service: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact_fingerprint: Option<ContentHash>,
  pub source_identity: SourceIdentity,
  pub resolved_at: u64,
  pub outcome: RecordOutcome,
  /// Hash of the service declaration the outputs were emitted for.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub service_digest: Option<ObjectHash>,
}

impl RegistryRecord {
  pub fn success(service: &str, identity: SourceIdentity, fingerprint: ContentHash, resolved_at: u64) -> Self {
    Self {
      version: REGISTRY_VERSION,
      service: service.to_string(),
      artifact_fingerprint: Some(fingerprint),
      source_identity: identity,
      resolved_at,
      outcome: RecordOutcome::Success,
      service_digest: None,
    }
  }

  pub fn with_service_digest(mut self, digest: ObjectHash) -> Self {
    self.service_digest = Some(digest);
    self
  }

  pub fn unsuccessful(service: &str, identity: SourceIdentity, outcome: RecordOutcome, at: u64) -> Self {
    Self {
      version: REGISTRY_VERSION,
      service: service.to_string(),
      artifact_fingerprint: None,
      source_identity: identity,
      resolved_at: at,
      outcome,
      service_digest: None,
    }
  }

  pub fn is_success(&self) -> bool {
    self.outcome == RecordOutcome::Success
  }
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("failed to read registry record {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write registry record {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse registry record {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize registry record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported registry record version {0}, expected {REGISTRY_VERSION}")]
  UnsupportedVersion(u32),
}

/// Whether [`Registry::record`] wrote the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordWrite {
  Written,
  /// An existing success record was kept.
  Kept,
}

#[derive(Debug, Clone)]
pub struct Registry {
  dir: PathBuf,
}

impl Registry {
  pub fn open(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path_for(&self, service: &str) -> PathBuf {
    let file: String = service
      .chars()
      .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
      .collect();
    self.dir.join(format!("{file}.json"))
  }

  /// Load a service's record.
  ///
  /// Returns `Ok(None)` if the service has never been recorded.
  pub fn load(&self, service: &str) -> Result<Option<RegistryRecord>, RegistryError> {
    read_record(&self.path_for(service))
  }

  /// Store `record`, unless it would replace a success with a non-success.
  pub fn record(&self, record: &RegistryRecord) -> Result<RecordWrite, RegistryError> {
    if !record.is_success()
      && let Ok(Some(existing)) = self.load(&record.service)
      && existing.is_success()
    {
      debug!(
        service = %record.service,
        outcome = %record.outcome,
        "keeping last successful registry record"
      );
      return Ok(RecordWrite::Kept);
    }

    let path = self.path_for(&record.service);
    let content = serde_json::to_vec_pretty(record).map_err(RegistryError::Serialize)?;
    write_atomic(&path, &content).map_err(|source| RegistryError::Write { path, source })?;
    debug!(service = %record.service, outcome = %record.outcome, "wrote registry record");
    Ok(RecordWrite::Written)
  }

  /// All readable records, sorted by service name.
  pub fn list(&self) -> Result<Vec<RegistryRecord>, RegistryError> {
    let read_dir = match fs::read_dir(&self.dir) {
      Ok(read_dir) => read_dir,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(RegistryError::Read {
          path: self.dir.clone(),
          source,
        });
      }
    };

    let mut records = Vec::new();
    for dir_entry in read_dir {
      let dir_entry = dir_entry.map_err(|source| RegistryError::Read {
        path: self.dir.clone(),
        source,
      })?;
      let path = dir_entry.path();
      if !path.extension().is_some_and(|ext| ext == "json") {
        continue;
      }
      match read_record(&path) {
        Ok(Some(record)) => records.push(record),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable registry record"),
      }
    }
    records.sort_by(|a, b| a.service.cmp(&b.service));
    Ok(records)
  }
}

fn read_record(path: &Path) -> Result<Option<RegistryRecord>, RegistryError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(RegistryError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let record: RegistryRecord = serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  if record.version != REGISTRY_VERSION {
    return Err(RegistryError::UnsupportedVersion(record.version));
  }
  Ok(Some(record))
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn temp_registry() -> (TempDir, Registry) {
    let temp = TempDir::new().unwrap();
    let registry = Registry::open(temp.path().join("registry"));
    (temp, registry)
  }

  fn identity() -> SourceIdentity {
    SourceIdentity("local:./functions#printer.py".to_string())
  }

  fn success(service: &str, fingerprint: &str, at: u64) -> RegistryRecord {
    RegistryRecord::success(service, identity(), ContentHash(fingerprint.to_string()), at)
  }

  mod load_and_record {
    use super::*;

    #[test]
    fn missing_record_is_none() {
      let (_temp, registry) = temp_registry();
      assert!(registry.load("printer-service").unwrap().is_none());
    }

    #[test]
    fn record_then_load() {
      let (_temp, registry) = temp_registry();
      let record = success("printer-service", "abc", 100);

      assert_eq!(registry.record(&record).unwrap(), RecordWrite::Written);
      assert_eq!(registry.load("printer-service").unwrap(), Some(record));
    }

    #[test]
    fn success_replaces_success() {
      let (_temp, registry) = temp_registry();
      registry.record(&success("svc", "old", 100)).unwrap();
      registry.record(&success("svc", "new", 200)).unwrap();

      let loaded = registry.load("svc").unwrap().unwrap();
      assert_eq!(loaded.artifact_fingerprint, Some(ContentHash("new".to_string())));
      assert_eq!(loaded.resolved_at, 200);
    }

    #[test]
    fn failure_keeps_previous_success() {
      let (_temp, registry) = temp_registry();
      registry.record(&success("svc", "good", 100)).unwrap();

      let failed = RegistryRecord::unsuccessful("svc", identity(), RecordOutcome::Failed, 200);
      assert_eq!(registry.record(&failed).unwrap(), RecordWrite::Kept);

      let loaded = registry.load("svc").unwrap().unwrap();
      assert!(loaded.is_success());
      assert_eq!(loaded.resolved_at, 100);
    }

    #[test]
    fn failure_recorded_when_never_built() {
      let (_temp, registry) = temp_registry();
      let skipped = RegistryRecord::unsuccessful("svc", identity(), RecordOutcome::Skipped, 50);
      registry.record(&skipped).unwrap();

      let failed = RegistryRecord::unsuccessful("svc", identity(), RecordOutcome::Failed, 60);
      assert_eq!(registry.record(&failed).unwrap(), RecordWrite::Written);
      assert_eq!(registry.load("svc").unwrap().unwrap().outcome, RecordOutcome::Failed);
    }

    #[test]
    fn unsupported_version_is_rejected() {
      let (_temp, registry) = temp_registry();
      let mut record = success("svc", "abc", 1);
      record.version = 99;
      fs::create_dir_all(registry.dir()).unwrap();
      fs::write(registry.path_for("svc"), serde_json::to_string(&record).unwrap()).unwrap();

      assert!(matches!(
        registry.load("svc"),
        Err(RegistryError::UnsupportedVersion(99))
      ));
    }
  }

  mod layout {
    use super::*;

    #[test]
    fn serialized_field_names() {
      let json = serde_json::to_value(success("svc", "abc", 7)).unwrap();
      assert_eq!(json["artifactFingerprint"], "abc");
      assert_eq!(json["sourceIdentity"], "local:./functions#printer.py");
      assert_eq!(json["resolvedAt"], 7);
      assert_eq!(json["outcome"], "success");
      assert_eq!(json["version"], 1);
    }

    #[test]
    fn service_names_are_file_safe() {
      let (_temp, registry) = temp_registry();
      let path = registry.path_for("team/svc");
      assert_eq!(path.file_name().unwrap(), "team_svc.json");
    }

    #[test]
    fn list_is_sorted_and_skips_garbage() {
      let (_temp, registry) = temp_registry();
      registry.record(&success("zeta", "z", 1)).unwrap();
      registry.record(&success("alpha", "a", 1)).unwrap();
      fs::write(registry.dir().join("broken.json"), "{").unwrap();

      let names: Vec<_> = registry.list().unwrap().into_iter().map(|r| r.service).collect();
      assert_eq!(names, vec!["alpha", "zeta"]);
    }
  }
}
