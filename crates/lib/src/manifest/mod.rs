//! Build manifest: declared sources, services and project-wide settings.
//!
//! The manifest is the only input of a build run. Everything the engine needs
//! to plan and resolve services is read from it once, before planning starts.

mod load;
mod types;

pub use load::ManifestError;
pub use types::*;
