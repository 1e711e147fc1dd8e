//! Manifest loading and validation.
//!
//! Manifests are YAML by default; a `.json` extension selects the JSON parser.
//! Loading checks that every service references a declared source and that
//! file-based sources name at least one file. Dependency references are left
//! to the planner, which reports them with the full graph in view.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, Visitor};
use serde::Deserializer;
use thiserror::Error;
use tracing::debug;

use super::types::{Manifest, ServiceSpec};
use crate::source::SourceSpec;
use crate::util::fs::{is_contained, is_single_component};

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  ParseYaml(#[from] serde_yaml::Error),

  #[error("failed to parse manifest: {0}")]
  ParseJson(#[from] serde_json::Error),

  #[error("service '{service}' references unknown source '{source_name}'")]
  UnknownSource { service: String, source_name: String },

  #[error("source '{0}' declares no files")]
  EmptyFiles(String),

  #[error("generated source '{0}' has an empty prompt")]
  EmptyPrompt(String),

  #[error("service name '{0}' must be a plain name without path separators")]
  InvalidServiceName(String),

  #[error("source '{source_name}' lists '{path}', which escapes its directory")]
  EscapingPath { source_name: String, path: String },
}

impl Manifest {
  /// Load and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let manifest = if is_json {
      Self::from_json_str(&content)?
    } else {
      Self::from_yaml_str(&content)?
    };

    debug!(
      path = %path.display(),
      sources = manifest.sources.len(),
      services = manifest.services.len(),
      "loaded manifest"
    );
    Ok(manifest)
  }

  /// Parse and validate a YAML manifest.
  pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = serde_yaml::from_str(content)?;
    manifest.validate()?;
    Ok(manifest)
  }

  /// Parse and validate a JSON manifest.
  pub fn from_json_str(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = serde_json::from_str(content)?;
    manifest.validate()?;
    Ok(manifest)
  }

  /// Check source references and source well-formedness.
  pub fn validate(&self) -> Result<(), ManifestError> {
    for (name, source) in &self.sources {
      match source {
        SourceSpec::Local(local) if local.files.is_empty() => {
          return Err(ManifestError::EmptyFiles(name.clone()));
        }
        SourceSpec::Git(git) if git.files.is_empty() => {
          return Err(ManifestError::EmptyFiles(name.clone()));
        }
        SourceSpec::Generated(generated) if generated.prompt_text.trim().is_empty() => {
          return Err(ManifestError::EmptyPrompt(name.clone()));
        }
        _ => {}
      }
      if let Some(path) = escaping_path(source) {
        return Err(ManifestError::EscapingPath {
          source_name: name.clone(),
          path: path.to_string(),
        });
      }
    }

    for service in &self.services {
      if !is_single_component(&service.name) {
        return Err(ManifestError::InvalidServiceName(service.name.clone()));
      }
      if !self.sources.contains_key(&service.function.source) {
        return Err(ManifestError::UnknownSource {
          service: service.name.clone(),
          source_name: service.function.source.clone(),
        });
      }
    }

    Ok(())
  }
}

/// First file or repository path of `source` that would resolve outside the
/// source's directory.
fn escaping_path(source: &SourceSpec) -> Option<&str> {
  match source {
    SourceSpec::Local(local) => local.files.iter().map(String::as_str).find(|f| !is_contained(f)),
    SourceSpec::Git(git) => {
      if !git.path.is_empty() && !is_contained(&git.path) {
        return Some(&git.path);
      }
      git.files.iter().map(String::as_str).find(|f| !is_contained(f))
    }
    SourceSpec::Generated(_) => None,
  }
}

/// Deserialize the `services` map into a `Vec`, keeping declaration order.
pub(super) fn services_in_order<'de, D>(deserializer: D) -> Result<Vec<ServiceSpec>, D::Error>
where
  D: Deserializer<'de>,
{
  struct OrderedServices;

  impl<'de> Visitor<'de> for OrderedServices {
    type Value = Vec<ServiceSpec>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("a map of service names to service definitions")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
      Ok(Vec::new())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
      A: MapAccess<'de>,
    {
      let mut seen = HashSet::new();
      let mut services = Vec::new();
      while let Some((name, mut service)) = map.next_entry::<String, ServiceSpec>()? {
        if name.is_empty() {
          return Err(de::Error::custom("service name must not be empty"));
        }
        if !seen.insert(name.clone()) {
          return Err(de::Error::custom(format!("duplicate service '{name}'")));
        }
        service.name = name;
        services.push(service);
      }
      Ok(services)
    }
  }

  deserializer.deserialize_map(OrderedServices)
}
