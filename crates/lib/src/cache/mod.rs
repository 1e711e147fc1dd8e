//! Artifact cache.
//!
//! The cache sits between the engine and the source providers. Every provider
//! call goes through [`ArtifactCache::resolve`], which decides from the cached
//! entry, its freshness and the [`ResolvePolicy`] whether to call the provider
//! and what to do when that call fails:
//!
//! | cached entry | fresh | refresh | provider result | outcome               |
//! |--------------|-------|---------|-----------------|-----------------------|
//! | absent       |       |         | ok              | store, return new     |
//! | absent       |       |         | error           | `NoFallbackAvailable` |
//! | present      | yes   | no      | (not called)    | return cached         |
//! | present      | any   | any     | ok              | replace, return new   |
//! | present      | any   | any     | error, UseCached| return cached         |
//! | present      | any   | any     | error, Fail     | `RefreshFailed`       |
//!
//! # Concurrency
//!
//! At most one provider call is in flight per identity. The first caller for
//! an identity becomes the leader; later callers subscribe and receive the
//! leader's result. If the leader is dropped before finishing, subscribers
//! retry and one of them takes over. Entries of one identity are only ever
//! written by its leader, so unrelated identities never wait on each other.

mod entry;
mod store;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::artifact::{FunctionArtifact, unix_now};
use crate::cancel::CancelToken;
use crate::manifest::FallbackMode;
use crate::source::{SourceError, SourceIdentity, SourceProvider, SourceSpec};
use crate::util::hash::{Hashable, ObjectHash};

pub use entry::{CACHE_ENTRY_VERSION, CacheEntry};
pub use store::{CacheStore, CacheStoreError};

/// How a single resolution treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
  /// Call the provider even when a fresh entry exists.
  pub refresh_on_build: bool,
  pub fallback: FallbackMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  #[error("refreshing {identity} failed and fallback is disabled: {cause}")]
  RefreshFailed { identity: SourceIdentity, cause: SourceError },

  #[error("resolving {identity} failed and no cached artifact is available: {cause}")]
  NoFallbackAvailable { identity: SourceIdentity, cause: SourceError },

  #[error("resolution of {0} was cancelled")]
  Cancelled(SourceIdentity),

  #[error("failed to hash source spec: {0}")]
  Digest(String),
}

/// Where a resolved artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOrigin {
  /// Produced by a provider call during this resolution.
  Fresh,
  /// Served from a fresh entry without calling the provider.
  Cached,
  /// The provider failed and a cached entry was served instead.
  Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
  pub artifact: Arc<FunctionArtifact>,
  pub origin: ResolutionOrigin,
}

impl Resolution {
  pub fn from_cache(&self) -> bool {
    !matches!(self.origin, ResolutionOrigin::Fresh)
  }
}

/// Source of the current time, in Unix seconds.
pub trait Clock: Send + Sync {
  fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> u64 {
    unix_now()
  }
}

type Waiter = oneshot::Sender<Result<Resolution, CacheError>>;

pub struct ArtifactCache {
  store: Option<CacheStore>,
  ttl_seconds: u64,
  clock: Arc<dyn Clock>,
  entries: Mutex<HashMap<SourceIdentity, CacheEntry>>,
  in_flight: Mutex<HashMap<SourceIdentity, Vec<Waiter>>>,
}

impl ArtifactCache {
  /// A cache persisted under `dir`. Entries are loaded lazily.
  pub fn open(dir: impl Into<PathBuf>, ttl_seconds: u64) -> Self {
    Self::with_store(Some(CacheStore::new(dir)), ttl_seconds)
  }

  /// A cache that lives only for the current process.
  pub fn in_memory(ttl_seconds: u64) -> Self {
    Self::with_store(None, ttl_seconds)
  }

  fn with_store(store: Option<CacheStore>, ttl_seconds: u64) -> Self {
    Self {
      store,
      ttl_seconds,
      clock: Arc::new(SystemClock),
      entries: Mutex::new(HashMap::new()),
      in_flight: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> Option<&CacheStore> {
    self.store.as_ref()
  }

  /// Resolve `spec` according to `policy`, calling `provider` when needed.
  pub async fn resolve(
    &self,
    spec: &SourceSpec,
    policy: ResolvePolicy,
    provider: &dyn SourceProvider,
    cancel: &CancelToken,
  ) -> Result<Resolution, CacheError> {
    let identity = spec.identity();
    let digest = spec.compute_hash().map_err(|e| CacheError::Digest(e.to_string()))?;

    loop {
      if !policy.refresh_on_build
        && let Some(entry) = self.lookup(&identity)
        && entry.is_fresh(self.clock.now(), &digest)
      {
        debug!(identity = %identity, age = entry.age(self.clock.now()), "fresh cache hit");
        return Ok(Resolution {
          artifact: entry.artifact,
          origin: ResolutionOrigin::Cached,
        });
      }

      let subscription = {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get_mut(&identity) {
          Some(waiters) => {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            Some(rx)
          }
          None => {
            in_flight.insert(identity.clone(), Vec::new());
            None
          }
        }
      };

      let Some(rx) = subscription else {
        let mut guard = InFlightGuard {
          cache: self,
          identity: &identity,
          done: false,
        };
        let result = self.lead(spec, &identity, &digest, policy, provider, cancel).await;
        guard.finish(&result);
        return result;
      };

      debug!(identity = %identity, "waiting for in-flight resolution");
      match rx.await {
        Ok(result) => return result,
        // The leader was dropped before publishing a result; try again.
        Err(_) => continue,
      }
    }
  }

  async fn lead(
    &self,
    spec: &SourceSpec,
    identity: &SourceIdentity,
    digest: &ObjectHash,
    policy: ResolvePolicy,
    provider: &dyn SourceProvider,
    cancel: &CancelToken,
  ) -> Result<Resolution, CacheError> {
    let cached = self.lookup(identity);

    match &cached {
      Some(entry) => {
        let fresh = entry.is_fresh(self.clock.now(), digest);
        if fresh && !policy.refresh_on_build {
          debug!(identity = %identity, "fresh cache hit");
          return Ok(Resolution {
            artifact: entry.artifact.clone(),
            origin: ResolutionOrigin::Cached,
          });
        }
        debug!(identity = %identity, fresh, refresh = policy.refresh_on_build, "refreshing cached artifact");
      }
      None => debug!(identity = %identity, "cache miss"),
    }

    match provider.resolve(spec, cancel).await {
      Ok(artifact) => {
        let artifact = Arc::new(artifact);
        let entry = CacheEntry::new(
          identity.clone(),
          digest.clone(),
          artifact.clone(),
          self.clock.now(),
          self.ttl_seconds,
        );
        self.insert(entry);
        info!(identity = %identity, fingerprint = %artifact.fingerprint.short(), "resolved source");
        Ok(Resolution {
          artifact,
          origin: ResolutionOrigin::Fresh,
        })
      }
      Err(SourceError::Cancelled) => Err(CacheError::Cancelled(identity.clone())),
      Err(cause) => match (cached, policy.fallback) {
        (None, _) => Err(CacheError::NoFallbackAvailable {
          identity: identity.clone(),
          cause,
        }),
        (Some(entry), FallbackMode::UseCached) => {
          warn!(
            identity = %identity,
            error = %cause,
            age = entry.age(self.clock.now()),
            "provider failed, serving cached artifact"
          );
          Ok(Resolution {
            artifact: entry.artifact,
            origin: ResolutionOrigin::Fallback,
          })
        }
        (Some(_), FallbackMode::Fail) => Err(CacheError::RefreshFailed {
          identity: identity.clone(),
          cause,
        }),
      },
    }
  }

  /// The current entry for `identity`, loading it from disk on first access.
  pub fn lookup(&self, identity: &SourceIdentity) -> Option<CacheEntry> {
    if let Some(entry) = self.entries.lock().get(identity) {
      return Some(entry.clone());
    }

    let store = self.store.as_ref()?;
    match store.load(identity) {
      Ok(Some(entry)) => {
        let mut entries = self.entries.lock();
        Some(entries.entry(identity.clone()).or_insert(entry).clone())
      }
      Ok(None) => None,
      Err(e) => {
        warn!(identity = %identity, error = %e, "ignoring unreadable cache entry");
        None
      }
    }
  }

  fn insert(&self, entry: CacheEntry) {
    if let Some(store) = &self.store
      && let Err(e) = store.save(&entry)
    {
      warn!(identity = %entry.identity, error = %e, "failed to persist cache entry");
    }
    self.entries.lock().insert(entry.identity.clone(), entry);
  }
}

/// Removes the in-flight marker for an identity and publishes the result.
///
/// If dropped without [`InFlightGuard::finish`], waiters see their channel
/// close and retry.
struct InFlightGuard<'a> {
  cache: &'a ArtifactCache,
  identity: &'a SourceIdentity,
  done: bool,
}

impl InFlightGuard<'_> {
  fn finish(&mut self, result: &Result<Resolution, CacheError>) {
    let waiters = self.cache.in_flight.lock().remove(self.identity).unwrap_or_default();
    self.done = true;
    for waiter in waiters {
      let _ = waiter.send(result.clone());
    }
  }
}

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    if !self.done {
      self.cache.in_flight.lock().remove(self.identity);
    }
  }
}
