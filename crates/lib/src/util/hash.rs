//! Hashing utilities for content fingerprints and stable file names.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character hash used for cache file names
//! - `ContentHash`: A full 64-character hash used as an artifact fingerprint
//! - `hash_bytes()`: Arbitrary byte hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A truncated hash identifying a unique object.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized struct
/// (or of a raw key, see [`ObjectHash::of_key`]). Short enough to keep file
/// names readable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl ObjectHash {
  /// Hash an arbitrary string key.
  pub fn of_key(key: &str) -> Self {
    let full = hash_bytes(key.as_bytes());
    ObjectHash(full.0[..OBJ_HASH_PREFIX_LEN].to_string())
  }
}

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(ObjectHash::of_key(&serialized))
  }
}

/// A full 64-character SHA-256 hash of some content.
///
/// Artifacts are fingerprinted with this; two artifacts with equal
/// `ContentHash` carry identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// First 12 characters, for display.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
