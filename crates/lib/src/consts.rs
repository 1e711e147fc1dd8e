//! Crate-wide constants and built-in defaults.

/// Application name, sent as the HTTP user agent.
pub const APP_NAME: &str = "microfunc";

/// Length of the truncated hashes used for on-disk file names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default manifest file name looked up by the CLI.
pub const DEFAULT_MANIFEST: &str = "microfunc.yaml";

/// Default time-to-live for cached artifacts (24 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Default directory for the artifact cache, relative to the manifest.
pub const DEFAULT_CACHE_DIR: &str = "./.llm_cache";

/// Default directory for registry records, relative to the manifest.
pub const DEFAULT_REGISTRY_DIR: &str = "./.registry";

/// Default directory for emitted service definitions, relative to the manifest.
pub const DEFAULT_OUTPUT_DIR: &str = "./generated";

/// Default deadline for a single generative call.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Environment variable overriding the cache directory.
pub const ENV_CACHE_DIR: &str = "MICROFUNC_CACHE_DIR";

/// Environment variable overriding the registry directory.
pub const ENV_REGISTRY_DIR: &str = "MICROFUNC_REGISTRY_DIR";

/// Environment variable overriding the output directory.
pub const ENV_OUTPUT_DIR: &str = "MICROFUNC_OUTPUT_DIR";
