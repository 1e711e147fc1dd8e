//! Emission of ready-to-run service definitions.
//!
//! Every successfully resolved service gets a directory under the output
//! root holding its function files and a `service.json` definition:
//!
//! ```text
//! {output_dir}/
//! └── printer-service/
//!     ├── printer.py
//!     └── service.json
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::artifact::FunctionArtifact;
use crate::manifest::{GrpcSpec, HttpSpec, ServiceSpec};
use crate::registry::RegistryRecord;
use crate::source::SourceIdentity;
use crate::util::fs::{is_contained, is_single_component, write_atomic};
use crate::util::hash::{ContentHash, Hashable};

/// File name of the emitted service definition.
pub const SERVICE_FILE: &str = "service.json";

#[derive(Debug, Error)]
pub enum OutputError {
  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize service definition: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("refusing to write function file '{0}' outside the service directory")]
  InvalidFileName(String),

  #[error("service name '{0}' is not a plain directory name")]
  InvalidServiceName(String),
}

/// The `service.json` written for each built service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub grpc: Option<GrpcSpec>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub http: Option<HttpSpec>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub environment: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<String>,
  pub depends_on: Vec<String>,
  pub function_files: Vec<String>,
  pub artifact_fingerprint: ContentHash,
  pub source_identity: SourceIdentity,
  pub resolved_at: u64,
}

impl ServiceDefinition {
  pub fn new(service: &ServiceSpec, artifact: &FunctionArtifact) -> Self {
    Self {
      name: service.name.clone(),
      grpc: service.grpc.clone(),
      http: service.http.clone(),
      environment: service.environment.clone(),
      volumes: service.volumes.clone(),
      depends_on: service.depends_on.clone(),
      function_files: output_names(service, artifact),
      artifact_fingerprint: artifact.fingerprint.clone(),
      source_identity: artifact.source_identity.clone(),
      resolved_at: artifact.resolved_at,
    }
  }
}

/// Names the artifact's files are written under.
///
/// A single-file artifact takes the service's `function.name` when given.
fn output_names(service: &ServiceSpec, artifact: &FunctionArtifact) -> Vec<String> {
  match (&service.function.name, artifact.files.as_slice()) {
    (Some(name), [_]) => vec![name.clone()],
    _ => artifact.files.iter().map(|f| f.name.clone()).collect(),
  }
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
  dir: PathBuf,
}

impl OutputWriter {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn service_dir(&self, service: &str) -> PathBuf {
    self.dir.join(service)
  }

  /// True when `record` is a success for this exact artifact and service
  /// declaration, and every output file is still on disk.
  pub fn is_current(&self, service: &ServiceSpec, artifact: &FunctionArtifact, record: Option<&RegistryRecord>) -> bool {
    let Some(record) = record else {
      return false;
    };
    if !record.is_success() || record.artifact_fingerprint.as_ref() != Some(&artifact.fingerprint) {
      return false;
    }
    match service.compute_hash() {
      Ok(digest) if record.service_digest.as_ref() == Some(&digest) => {}
      _ => return false,
    }

    let dir = self.service_dir(&service.name);
    dir.join(SERVICE_FILE).is_file()
      && output_names(service, artifact)
        .iter()
        .all(|name| dir.join(name).is_file())
  }

  /// Write the function files and `service.json`. Returns the written paths.
  pub fn emit(&self, service: &ServiceSpec, artifact: &FunctionArtifact) -> Result<Vec<PathBuf>, OutputError> {
    if !is_single_component(&service.name) {
      return Err(OutputError::InvalidServiceName(service.name.clone()));
    }
    let dir = self.service_dir(&service.name);
    let names = output_names(service, artifact);
    if let Some(bad) = names.iter().find(|name| !is_contained(name)) {
      return Err(OutputError::InvalidFileName(bad.clone()));
    }

    let mut written = Vec::with_capacity(names.len() + 1);
    for (name, file) in names.iter().zip(&artifact.files) {
      let path = dir.join(name);
      write_atomic(&path, &file.content).map_err(|source| OutputError::Write {
        path: path.clone(),
        source,
      })?;
      written.push(path);
    }

    let definition = ServiceDefinition::new(service, artifact);
    let path = dir.join(SERVICE_FILE);
    let content = serde_json::to_vec_pretty(&definition)?;
    write_atomic(&path, &content).map_err(|source| OutputError::Write {
      path: path.clone(),
      source,
    })?;
    written.push(path);

    debug!(service = %service.name, dir = %dir.display(), files = written.len(), "emitted service");
    Ok(written)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;
  use crate::artifact::ArtifactFile;
  use crate::manifest::{FunctionRef, TlsSpec};

  fn service(function_name: Option<&str>) -> ServiceSpec {
    ServiceSpec {
      name: "printer-service".to_string(),
      function: FunctionRef {
        source: "printer".to_string(),
        name: function_name.map(String::from),
      },
      depends_on: vec!["base".to_string()],
      grpc: Some(GrpcSpec {
        port: 50051,
        service_name: Some("Printer".to_string()),
        proto_package: Some("printer".to_string()),
        tls: Some(TlsSpec {
          enabled: true,
          cert: Some("main".to_string()),
        }),
      }),
      http: None,
      environment: BTreeMap::from([("LOG_LEVEL".to_string(), "info".to_string())]),
      volumes: vec!["./data:/data".to_string()],
    }
  }

  fn artifact(files: &[(&str, &str)]) -> FunctionArtifact {
    FunctionArtifact::new(
      SourceIdentity("local:./functions#printer.py".to_string()),
      files.iter().map(|(n, c)| ArtifactFile::new(*n, *c)).collect(),
    )
  }

  #[test]
  fn emits_files_and_definition() {
    let temp = TempDir::new().unwrap();
    let writer = OutputWriter::new(temp.path());
    let artifact = artifact(&[("printer.py", "print('x')")]);

    let written = writer.emit(&service(None), &artifact).unwrap();
    assert_eq!(written.len(), 2);

    let dir = temp.path().join("printer-service");
    assert_eq!(fs::read_to_string(dir.join("printer.py")).unwrap(), "print('x')");

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(dir.join(SERVICE_FILE)).unwrap()).unwrap();
    assert_eq!(json["name"], "printer-service");
    assert_eq!(json["grpc"]["port"], 50051);
    assert_eq!(json["grpc"]["tls"]["cert"], "main");
    assert_eq!(json["environment"]["LOG_LEVEL"], "info");
    assert_eq!(json["dependsOn"][0], "base");
    assert_eq!(json["artifactFingerprint"], artifact.fingerprint.0.as_str());
    assert!(json.get("http").is_none());
  }

  #[test]
  fn single_file_takes_function_name() {
    let temp = TempDir::new().unwrap();
    let writer = OutputWriter::new(temp.path());
    writer
      .emit(&service(Some("main.py")), &artifact(&[("validator.py", "v")]))
      .unwrap();
    assert!(temp.path().join("printer-service/main.py").is_file());
    assert!(!temp.path().join("printer-service/validator.py").exists());
  }

  #[test]
  fn multiple_files_keep_their_names() {
    let temp = TempDir::new().unwrap();
    let writer = OutputWriter::new(temp.path());
    writer
      .emit(&service(Some("main.py")), &artifact(&[("a.py", "a"), ("b.py", "b")]))
      .unwrap();
    assert!(temp.path().join("printer-service/a.py").is_file());
    assert!(temp.path().join("printer-service/b.py").is_file());
  }

  #[test]
  fn escaping_file_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    let writer = OutputWriter::new(temp.path());
    let err = writer
      .emit(&service(None), &artifact(&[("../escape.py", "x")]))
      .unwrap_err();
    assert!(matches!(err, OutputError::InvalidFileName(_)));
  }

  #[test]
  fn escaping_service_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("generated");
    let writer = OutputWriter::new(&root);
    let mut svc = service(None);
    svc.name = "../escaped".to_string();

    let err = writer.emit(&svc, &artifact(&[("printer.py", "x")])).unwrap_err();
    assert!(matches!(err, OutputError::InvalidServiceName(ref name) if name == "../escaped"));
    assert!(!temp.path().join("escaped").exists());
  }

  mod currency {
    use super::*;

    #[test]
    fn current_after_emit_with_matching_record() {
      let temp = TempDir::new().unwrap();
      let writer = OutputWriter::new(temp.path());
      let svc = service(None);
      let artifact = artifact(&[("printer.py", "x")]);
      writer.emit(&svc, &artifact).unwrap();

      let record = RegistryRecord::success(
        &svc.name,
        artifact.source_identity.clone(),
        artifact.fingerprint.clone(),
        artifact.resolved_at,
      )
      .with_service_digest(svc.compute_hash().unwrap());
      assert!(writer.is_current(&svc, &artifact, Some(&record)));
    }

    #[test]
    fn not_current_when_service_declaration_changes() {
      let temp = TempDir::new().unwrap();
      let writer = OutputWriter::new(temp.path());
      let svc = service(None);
      let artifact = artifact(&[("printer.py", "x")]);
      writer.emit(&svc, &artifact).unwrap();
      let record = RegistryRecord::success(&svc.name, artifact.source_identity.clone(), artifact.fingerprint.clone(), 0)
        .with_service_digest(svc.compute_hash().unwrap());

      let mut moved = svc.clone();
      if let Some(grpc) = moved.grpc.as_mut() {
        grpc.port = 50099;
      }
      assert!(!writer.is_current(&moved, &artifact, Some(&record)));

      let mut debug_env = svc.clone();
      debug_env.environment.insert("LOG_LEVEL".to_string(), "debug".to_string());
      assert!(!writer.is_current(&debug_env, &artifact, Some(&record)));
    }

    #[test]
    fn records_without_service_digest_are_not_current() {
      let temp = TempDir::new().unwrap();
      let writer = OutputWriter::new(temp.path());
      let svc = service(None);
      let artifact = artifact(&[("printer.py", "x")]);
      writer.emit(&svc, &artifact).unwrap();
      let record = RegistryRecord::success(&svc.name, artifact.source_identity.clone(), artifact.fingerprint.clone(), 0);

      assert!(!writer.is_current(&svc, &artifact, Some(&record)));
    }

    #[test]
    fn not_current_without_record_or_outputs() {
      let temp = TempDir::new().unwrap();
      let writer = OutputWriter::new(temp.path());
      let svc = service(None);
      let artifact = artifact(&[("printer.py", "x")]);
      let record = RegistryRecord::success(
        &svc.name,
        artifact.source_identity.clone(),
        artifact.fingerprint.clone(),
        0,
      );

      assert!(!writer.is_current(&svc, &artifact, None));
      assert!(!writer.is_current(&svc, &artifact, Some(&record)));
    }

    #[test]
    fn not_current_when_fingerprint_differs() {
      let temp = TempDir::new().unwrap();
      let writer = OutputWriter::new(temp.path());
      let svc = service(None);
      let old = artifact(&[("printer.py", "old")]);
      writer.emit(&svc, &old).unwrap();
      let record = RegistryRecord::success(&svc.name, old.source_identity.clone(), old.fingerprint.clone(), 0);

      let new = artifact(&[("printer.py", "new")]);
      assert!(!writer.is_current(&svc, &new, Some(&record)));
    }
  }
}
