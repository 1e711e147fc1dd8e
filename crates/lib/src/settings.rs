//! Effective run settings.
//!
//! Settings are layered, lowest precedence first: built-in defaults, the
//! manifest's `global` section, `MICROFUNC_*` environment variables, then
//! command-line overrides. Relative manifest paths resolve against the
//! manifest's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{ArtifactCache, CacheStore, ResolvePolicy};
use crate::consts::{
  DEFAULT_CACHE_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_REGISTRY_DIR, ENV_CACHE_DIR, ENV_OUTPUT_DIR, ENV_REGISTRY_DIR,
};
use crate::execute::{Engine, ExecuteConfig, num_cpus};
use crate::manifest::{FallbackMode, Manifest};
use crate::outputs::OutputWriter;
use crate::registry::Registry;
use crate::source::{GeneratedProvider, GitProvider, LocalProvider, Providers};

/// Command-line overrides. `None` keeps the lower layer's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
  pub refresh_on_build: Option<bool>,
  pub fallback: Option<FallbackMode>,
  pub parallelism: Option<usize>,
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  /// Directory the manifest was loaded from, canonicalized when it exists.
  pub base_dir: PathBuf,
  pub cache_dir: PathBuf,
  pub registry_dir: PathBuf,
  pub output_dir: PathBuf,
  pub cache_ttl: u64,
  pub generation_timeout: Duration,
  pub execute: ExecuteConfig,
}

impl Settings {
  pub fn resolve(manifest: &Manifest, manifest_path: &Path, overrides: &Overrides) -> Self {
    let parent = manifest_path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    let base_dir = dunce::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    let global = &manifest.global;
    let llm = &global.llm_integration;

    let cache_dir = path_setting(ENV_CACHE_DIR, llm.cache_dir.as_deref(), DEFAULT_CACHE_DIR, &base_dir);
    let registry_dir = path_setting(
      ENV_REGISTRY_DIR,
      global.registry.path.as_deref(),
      DEFAULT_REGISTRY_DIR,
      &base_dir,
    );
    let output_dir = path_setting(ENV_OUTPUT_DIR, global.output_dir.as_deref(), DEFAULT_OUTPUT_DIR, &base_dir);

    let execute = ExecuteConfig {
      parallelism: overrides
        .parallelism
        .or(global.build.parallelism)
        .unwrap_or_else(num_cpus)
        .max(1),
      deadline: overrides
        .timeout
        .or(global.build.timeout.map(Duration::from_secs)),
      policy: ResolvePolicy {
        refresh_on_build: overrides.refresh_on_build.unwrap_or(llm.refresh_on_build),
        fallback: overrides.fallback.unwrap_or(llm.fallback_mode),
      },
    };

    let settings = Self {
      base_dir,
      cache_dir,
      registry_dir,
      output_dir,
      cache_ttl: llm.cache_ttl,
      generation_timeout: Duration::from_secs(llm.generation_timeout),
      execute,
    };
    debug!(?settings, "resolved settings");
    settings
  }

  pub fn cache(&self) -> ArtifactCache {
    ArtifactCache::open(&self.cache_dir, self.cache_ttl)
  }

  pub fn cache_store(&self) -> CacheStore {
    CacheStore::new(&self.cache_dir)
  }

  pub fn registry(&self) -> Registry {
    Registry::open(&self.registry_dir)
  }

  /// Providers for every source kind, with local paths relative to the manifest.
  pub fn providers(&self, manifest: &Manifest) -> Providers {
    Providers::new(
      LocalProvider::new(&self.base_dir),
      GitProvider::new(),
      GeneratedProvider::new(
        manifest.global.llm_integration.providers.clone(),
        self.generation_timeout,
      ),
    )
  }

  /// An engine wired to the configured cache, registry, outputs and providers.
  pub fn engine(&self, manifest: &Manifest) -> Engine {
    Engine::new(
      Arc::new(self.cache()),
      Arc::new(self.providers(manifest)),
      self.registry(),
      OutputWriter::new(&self.output_dir),
      self.execute,
    )
  }
}

fn path_setting(env_var: &str, configured: Option<&Path>, default: &str, base_dir: &Path) -> PathBuf {
  if let Ok(value) = std::env::var(env_var)
    && !value.is_empty()
  {
    return PathBuf::from(value);
  }
  let path = configured.unwrap_or_else(|| Path::new(default));
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base_dir.join(path)
  }
}
