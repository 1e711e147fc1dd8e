//! Cache entries and their freshness rule.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::FunctionArtifact;
use crate::source::SourceIdentity;
use crate::util::hash::ObjectHash;

/// Current cache entry format version.
pub const CACHE_ENTRY_VERSION: u32 = 1;

/// A cached artifact for one source identity.
///
/// Entries are never deleted for being stale; staleness only means the entry
/// cannot be served without first attempting a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub version: u32,
  pub identity: SourceIdentity,
  /// Hash of the full source declaration the artifact was produced from.
  pub input_digest: ObjectHash,
  /// Unix timestamp (seconds) the entry was stored.
  pub created_at: u64,
  pub ttl_seconds: u64,
  pub artifact: Arc<FunctionArtifact>,
}

impl CacheEntry {
  pub fn new(
    identity: SourceIdentity,
    input_digest: ObjectHash,
    artifact: Arc<FunctionArtifact>,
    created_at: u64,
    ttl_seconds: u64,
  ) -> Self {
    Self {
      version: CACHE_ENTRY_VERSION,
      identity,
      input_digest,
      created_at,
      ttl_seconds,
      artifact,
    }
  }

  /// Seconds since the entry was stored.
  pub fn age(&self, now: u64) -> u64 {
    now.saturating_sub(self.created_at)
  }

  /// Fresh iff younger than its TTL and produced from the same inputs.
  pub fn is_fresh(&self, now: u64, input_digest: &ObjectHash) -> bool {
    self.input_digest == *input_digest && self.age(now) < self.ttl_seconds
  }
}
