//! microfunc-lib: source resolution and build orchestration for microfunc
//!
//! This crate turns a manifest of function sources and services into built
//! service definitions:
//! - `Manifest`: declared sources and services, loaded from YAML or JSON
//! - `SourceProvider`: resolves local, git and generated sources into artifacts
//! - `ArtifactCache`: TTL cache with fallback and one in-flight call per source
//! - `BuildPlan`: dependency-ordered services, or a cycle error
//! - `Engine`: runs the plan in parallel waves and publishes a `BuildReport`
//! - `Registry`: the last build record of every service

pub mod artifact;
pub mod cache;
pub mod cancel;
pub mod consts;
pub mod events;
pub mod execute;
pub mod llm;
pub mod manifest;
pub mod outputs;
pub mod plan;
pub mod registry;
pub mod settings;
pub mod source;
pub mod util;
