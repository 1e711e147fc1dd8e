//! Resolved function artifacts.
//!
//! A [`FunctionArtifact`] is the immutable result of resolving a source: the
//! file set it produced, plus a fingerprint over that file set. Two artifacts
//! with equal fingerprints carry identical content.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::source::SourceIdentity;
use crate::util::hash::ContentHash;

/// One file of a resolved function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
  /// Relative file name, as declared by the source.
  pub name: String,
  /// Raw file content.
  #[serde(with = "base64_bytes")]
  pub content: Vec<u8>,
}

impl ArtifactFile {
  pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      content: content.into(),
    }
  }
}

/// The resolved content of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionArtifact {
  pub source_identity: SourceIdentity,
  pub files: Vec<ArtifactFile>,
  pub fingerprint: ContentHash,
  /// Unix timestamp (seconds) of when the provider produced this artifact.
  pub resolved_at: u64,
}

impl FunctionArtifact {
  /// Build an artifact from a file set, computing its fingerprint.
  pub fn new(source_identity: SourceIdentity, files: Vec<ArtifactFile>) -> Self {
    let fingerprint = fingerprint_files(&files);
    Self {
      source_identity,
      files,
      fingerprint,
      resolved_at: unix_now(),
    }
  }

  /// Check that the stored fingerprint matches the file set.
  pub fn verify(&self) -> bool {
    fingerprint_files(&self.files) == self.fingerprint
  }

  /// Total content size in bytes.
  pub fn size(&self) -> usize {
    self.files.iter().map(|f| f.content.len()).sum()
  }
}

/// Fingerprint a file set. Names and contents are length-prefixed so that
/// moving bytes between adjacent files changes the result.
pub fn fingerprint_files(files: &[ArtifactFile]) -> ContentHash {
  let mut hasher = Sha256::new();
  for file in files {
    hasher.update((file.name.len() as u64).to_le_bytes());
    hasher.update(file.name.as_bytes());
    hasher.update((file.content.len() as u64).to_le_bytes());
    hasher.update(&file.content);
  }
  ContentHash(hex::encode(hasher.finalize()))
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

mod base64_bytes {
  use base64::Engine;
  use base64::engine::general_purpose::STANDARD;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
  }
}
