//! Function sources and the providers that resolve them.
//!
//! A [`SourceSpec`] is a closed union of the three ways function code can be
//! provisioned:
//!
//! - [`LocalSource`]: files read from the local filesystem
//! - [`GitSource`]: files read from a branch of a remote repository
//! - [`GeneratedSource`]: code produced by a generative API
//!
//! Every [`SourceSpec`] has a stable [`SourceIdentity`]; two with equal identity
//! are the same logical source across runs. Resolution goes through the
//! [`SourceProvider`] trait, implemented per kind and dispatched by
//! [`Providers`].

pub mod generated;
pub mod git;
pub mod local;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::FunctionArtifact;
use crate::cancel::CancelToken;
use crate::util::hash::Hashable;

pub use generated::GeneratedProvider;
pub use git::GitProvider;
pub use local::LocalProvider;

/// Declared origin of a service's function code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
  Local(LocalSource),
  Git(GitSource),
  Generated(GeneratedSource),
}

impl Hashable for SourceSpec {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSource {
  /// Directory holding the files, relative to the manifest directory.
  pub path: PathBuf,
  pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
  pub url: String,
  /// Branch or other ref to check out.
  #[serde(default = "default_branch", alias = "ref")]
  pub branch: String,
  /// Directory inside the repository holding the files.
  #[serde(default)]
  pub path: String,
  pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSource {
  /// Name of a configured provider, or a provider kind such as `openai`.
  pub provider: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  pub prompt_id: String,
  #[serde(alias = "prompt")]
  pub prompt_text: String,
  #[serde(default)]
  pub params: BTreeMap<String, serde_json::Value>,
  /// File name of the generated code.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_file: Option<String>,
}

impl GeneratedSource {
  pub fn file_name(&self) -> String {
    self
      .output_file
      .clone()
      .unwrap_or_else(|| format!("{}.py", self.prompt_id))
  }
}

fn default_branch() -> String {
  "main".to_string()
}

/// Which of the three provisioning models a source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  Local,
  Git,
  Generated,
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceKind::Local => write!(f, "local"),
      SourceKind::Git => write!(f, "git"),
      SourceKind::Generated => write!(f, "generated"),
    }
  }
}

/// Stable key naming a logical source.
///
/// Derived from the variant and its locator fields only, so editing a prompt's
/// text keeps the identity while moving a local source changes it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIdentity(pub String);

impl fmt::Display for SourceIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl SourceSpec {
  pub fn kind(&self) -> SourceKind {
    match self {
      SourceSpec::Local(_) => SourceKind::Local,
      SourceSpec::Git(_) => SourceKind::Git,
      SourceSpec::Generated(_) => SourceKind::Generated,
    }
  }

  pub fn identity(&self) -> SourceIdentity {
    let key = match self {
      SourceSpec::Local(local) => {
        format!("local:{}#{}", local.path.display(), local.files.join(","))
      }
      SourceSpec::Git(git) => {
        format!("git:{}@{}:{}#{}", git.url, git.branch, git.path, git.files.join(","))
      }
      SourceSpec::Generated(generated) => format!("generated:{}", generated.prompt_id),
    };
    SourceIdentity(key)
  }

  /// Whether resolving this source twice may yield different bytes.
  pub fn is_deterministic(&self) -> bool {
    !matches!(self, SourceSpec::Generated(_))
  }
}

/// Why a provider could not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  #[error("source not found: {0}")]
  SourceNotFound(String),

  #[error("source unavailable: {0}")]
  SourceUnavailable(String),

  #[error("path escapes the source directory: {0}")]
  EscapingPath(String),

  #[error("generation failed: {0}")]
  GenerationFailed(String),

  #[error("generation timed out after {0:?}")]
  GenerationTimeout(Duration),

  #[error("resolution cancelled")]
  Cancelled,
}

/// Resolves a [`SourceSpec`] into a [`FunctionArtifact`].
///
/// Implementations must observe `cancel` at their suspension points and
/// return [`SourceError::Cancelled`] once it fires.
#[async_trait]
pub trait SourceProvider: Send + Sync {
  async fn resolve(&self, spec: &SourceSpec, cancel: &CancelToken) -> Result<FunctionArtifact, SourceError>;
}

/// Dispatches each source kind to its provider.
pub struct Providers {
  local: LocalProvider,
  git: GitProvider,
  generated: GeneratedProvider,
}

impl Providers {
  pub fn new(local: LocalProvider, git: GitProvider, generated: GeneratedProvider) -> Self {
    Self { local, git, generated }
  }
}

#[async_trait]
impl SourceProvider for Providers {
  async fn resolve(&self, spec: &SourceSpec, cancel: &CancelToken) -> Result<FunctionArtifact, SourceError> {
    match spec {
      SourceSpec::Local(local) => self.local.fetch(local, spec.identity()).await,
      SourceSpec::Git(git) => self.git.fetch(git, spec.identity(), cancel).await,
      SourceSpec::Generated(generated) => self.generated.generate(generated, spec.identity(), cancel).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn local() -> SourceSpec {
    SourceSpec::Local(LocalSource {
      path: PathBuf::from("./functions"),
      files: vec!["printer.py".to_string(), "util.py".to_string()],
    })
  }

  fn generated(prompt: &str) -> SourceSpec {
    SourceSpec::Generated(GeneratedSource {
      provider: "openai".to_string(),
      model: Some("gpt-4".to_string()),
      prompt_id: "validator_v1".to_string(),
      prompt_text: prompt.to_string(),
      params: BTreeMap::new(),
      output_file: None,
    })
  }

  mod identity {
    use super::*;

    #[test]
    fn local_identity_includes_path_and_files() {
      assert_eq!(local().identity().0, "local:./functions#printer.py,util.py");
    }

    #[test]
    fn git_identity_includes_locator() {
      let spec = SourceSpec::Git(GitSource {
        url: "https://example.com/repo.git".to_string(),
        branch: "dev".to_string(),
        path: "fns".to_string(),
        files: vec!["a.py".to_string()],
      });
      assert_eq!(spec.identity().0, "git:https://example.com/repo.git@dev:fns#a.py");
    }

    #[test]
    fn generated_identity_is_prompt_id() {
      assert_eq!(generated("a").identity(), generated("b").identity());
      assert_eq!(generated("a").identity().0, "generated:validator_v1");
    }

    #[test]
    fn input_digest_tracks_prompt_text() {
      let a = generated("a").compute_hash().unwrap();
      let b = generated("b").compute_hash().unwrap();
      assert_ne!(a, b);
      assert_eq!(a, generated("a").compute_hash().unwrap());
    }
  }

  mod serde_shape {
    use super::*;

    #[test]
    fn tagged_by_type() {
      let yaml = "type: git\nurl: https://example.com/r.git\nfiles: [a.py]\n";
      let spec: SourceSpec = serde_yaml::from_str(yaml).unwrap();
      match spec {
        SourceSpec::Git(git) => {
          assert_eq!(git.branch, "main");
          assert_eq!(git.path, "");
        }
        other => panic!("expected git source, got {other:?}"),
      }
    }

    #[test]
    fn prompt_alias_is_accepted() {
      let yaml = "type: generated\nprovider: openai\nprompt_id: p1\nprompt: do it\n";
      let spec: SourceSpec = serde_yaml::from_str(yaml).unwrap();
      assert_eq!(spec.kind(), SourceKind::Generated);
      assert!(!spec.is_deterministic());
    }

    #[test]
    fn generated_file_name_defaults_to_prompt_id() {
      match generated("x") {
        SourceSpec::Generated(g) => assert_eq!(g.file_name(), "validator_v1.py"),
        _ => unreachable!(),
      }
    }
  }
}
