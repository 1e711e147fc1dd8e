//! Manifest types for microfunc.
//!
//! The manifest is the root configuration of a build run. It is produced by
//! the loader (see [`super::load`]) and is immutable for the duration of a run.
//!
//! # Structure
//!
//! - `sources`: named [`SourceSpec`]s, each describing where function code comes from
//! - `services`: [`ServiceSpec`]s in declaration order, each referencing exactly one source
//! - `global`: project-wide settings (output paths, registry, cache policy, providers)
//!
//! # Ordering
//!
//! Sources use a [`BTreeMap`] since their order carries no meaning. Services are
//! kept in a `Vec` in the order they were declared; the build plan uses this
//! order to break ties between independent services.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CACHE_TTL_SECS, DEFAULT_GENERATION_TIMEOUT_SECS};
use crate::source::SourceSpec;
use crate::util::hash::Hashable;

/// The complete build manifest.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Manifest {
  /// Manifest format version, informational only.
  #[serde(default)]
  pub version: Option<String>,

  /// Declared sources, keyed by name.
  #[serde(default)]
  pub sources: BTreeMap<String, SourceSpec>,

  /// Declared services, in declaration order.
  #[serde(default, deserialize_with = "super::load::services_in_order")]
  pub services: Vec<ServiceSpec>,

  /// Project-wide settings.
  #[serde(default)]
  pub global: GlobalConfig,
}

impl Manifest {
  /// Look up a service by name.
  pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
    self.services.iter().find(|s| s.name == name)
  }

  /// Look up the source a service references.
  pub fn source_of(&self, service: &ServiceSpec) -> Option<&SourceSpec> {
    self.sources.get(&service.function.source)
  }
}

/// A service to be built from one function source.
///
/// Everything apart from `name`, `function` and `depends_on` is
/// deployment-facing and passes through the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
  /// Unique service name (the key it was declared under).
  #[serde(skip_deserializing)]
  pub name: String,

  /// The function source this service is built from.
  pub function: FunctionRef,

  /// Names of services that must be built before this one.
  #[serde(default)]
  pub depends_on: Vec<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub grpc: Option<GrpcSpec>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub http: Option<HttpSpec>,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub environment: BTreeMap<String, String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<String>,
}

impl Hashable for ServiceSpec {}

/// Reference from a service to a declared source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
  /// Name of the source in `sources`.
  pub source: String,

  /// File name the resolved function is emitted under.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

/// gRPC endpoint of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcSpec {
  pub port: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub service_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proto_package: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tls: Option<TlsSpec>,
}

/// Optional HTTP gateway in front of the gRPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSpec {
  #[serde(default = "default_true")]
  pub enabled: bool,
  pub port: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tls: Option<TlsSpec>,
}

/// TLS binding. `cert` is a reference resolved by the certificate manager,
/// never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSpec {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cert: Option<String>,
}

/// The `global` section of the manifest.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
  pub project_name: Option<String>,
  pub output_dir: Option<PathBuf>,
  pub registry: RegistryConfig,
  pub llm_integration: LlmIntegrationConfig,
  pub build: BuildConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  pub path: Option<PathBuf>,
}

/// Cache and generative-provider settings.
///
/// The cache policy here applies uniformly to every source of the run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmIntegrationConfig {
  pub cache_dir: Option<PathBuf>,
  /// Seconds a cached artifact stays fresh.
  pub cache_ttl: u64,
  pub refresh_on_build: bool,
  pub fallback_mode: FallbackMode,
  /// Seconds a single generative call may take.
  pub generation_timeout: u64,
  pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for LlmIntegrationConfig {
  fn default() -> Self {
    Self {
      cache_dir: None,
      cache_ttl: DEFAULT_CACHE_TTL_SECS,
      refresh_on_build: true,
      fallback_mode: FallbackMode::UseCached,
      generation_timeout: DEFAULT_GENERATION_TIMEOUT_SECS,
      providers: BTreeMap::new(),
    }
  }
}

/// Whether a failed refresh may be masked by a previously cached artifact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
  #[default]
  UseCached,
  Fail,
}

impl std::fmt::Display for FallbackMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FallbackMode::UseCached => write!(f, "use_cached"),
      FallbackMode::Fail => write!(f, "fail"),
    }
  }
}

/// Configuration of one generative provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
  pub kind: ProviderKind,
  /// Environment variable holding the API key.
  #[serde(default)]
  pub api_key_env: Option<String>,
  /// Base URL (openai/anthropic) or full endpoint (custom).
  #[serde(default, alias = "api_url")]
  pub base_url: Option<String>,
}

impl ProviderConfig {
  /// Default configuration for a provider kind.
  pub fn for_kind(kind: ProviderKind) -> Self {
    Self {
      kind,
      api_key_env: None,
      base_url: None,
    }
  }

  /// The environment variable the API key is read from.
  pub fn api_key_var(&self) -> &str {
    match &self.api_key_env {
      Some(var) => var,
      None => self.kind.default_key_var(),
    }
  }
}

/// Supported generative API flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
  #[serde(alias = "open_ai")]
  Openai,
  Anthropic,
  Custom,
}

impl ProviderKind {
  /// Parse a provider kind from a provider name such as `"openai"`.
  pub fn from_name(name: &str) -> Option<Self> {
    match name.to_ascii_lowercase().as_str() {
      "openai" => Some(ProviderKind::Openai),
      "anthropic" => Some(ProviderKind::Anthropic),
      "custom" => Some(ProviderKind::Custom),
      _ => None,
    }
  }

  fn default_key_var(self) -> &'static str {
    match self {
      ProviderKind::Openai => "OPENAI_API_KEY",
      ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
      ProviderKind::Custom => "CUSTOM_API_KEY",
    }
  }
}

/// The `global.build` section.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
  /// Maximum number of services resolved concurrently.
  pub parallelism: Option<usize>,
  /// Deadline for the whole run, in seconds.
  pub timeout: Option<u64>,
}

fn default_true() -> bool {
  true
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn llm_integration_defaults() {
    let config = LlmIntegrationConfig::default();
    assert_eq!(config.cache_ttl, 86_400);
    assert!(config.refresh_on_build);
    assert_eq!(config.fallback_mode, FallbackMode::UseCached);
    assert!(config.providers.is_empty());
  }

  #[test]
  fn fallback_mode_serde_names() {
    let mode: FallbackMode = serde_json::from_str(r#""use_cached""#).unwrap();
    assert_eq!(mode, FallbackMode::UseCached);
    let mode: FallbackMode = serde_json::from_str(r#""fail""#).unwrap();
    assert_eq!(mode, FallbackMode::Fail);
    assert_eq!(FallbackMode::UseCached.to_string(), "use_cached");
  }

  #[test]
  fn provider_key_var_defaults_by_kind() {
    assert_eq!(ProviderConfig::for_kind(ProviderKind::Openai).api_key_var(), "OPENAI_API_KEY");
    assert_eq!(
      ProviderConfig::for_kind(ProviderKind::Anthropic).api_key_var(),
      "ANTHROPIC_API_KEY"
    );

    let config = ProviderConfig {
      kind: ProviderKind::Custom,
      api_key_env: Some("MY_KEY".to_string()),
      base_url: None,
    };
    assert_eq!(config.api_key_var(), "MY_KEY");
  }

  #[test]
  fn provider_kind_from_name() {
    assert_eq!(ProviderKind::from_name("OpenAI"), Some(ProviderKind::Openai));
    assert_eq!(ProviderKind::from_name("anthropic"), Some(ProviderKind::Anthropic));
    assert_eq!(ProviderKind::from_name("llama"), None);
  }
}
