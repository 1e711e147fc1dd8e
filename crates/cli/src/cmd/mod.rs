mod build;
mod cache;
mod plan;
mod status;

use std::path::Path;

use anyhow::{Context, Result};

use microfunc_lib::manifest::Manifest;

pub use build::cmd_build;
pub use cache::{cmd_cache_clear, cmd_cache_list};
pub use plan::cmd_plan;
pub use status::cmd_status;

fn load_manifest(path: &Path) -> Result<Manifest> {
  Manifest::load(path).with_context(|| format!("Failed to load manifest: {}", path.display()))
}
