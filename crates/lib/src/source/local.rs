//! Local filesystem sources.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{LocalSource, SourceError, SourceIdentity};
use crate::artifact::{ArtifactFile, FunctionArtifact};
use crate::util::fs::is_contained;

/// Reads local sources relative to a base directory (the manifest's).
#[derive(Debug, Clone)]
pub struct LocalProvider {
  base_dir: PathBuf,
}

impl LocalProvider {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
    }
  }

  /// Read every listed file. Fails on the first missing file.
  pub async fn fetch(&self, source: &LocalSource, identity: SourceIdentity) -> Result<FunctionArtifact, SourceError> {
    if let Some(name) = source.files.iter().find(|name| !is_contained(name)) {
      return Err(SourceError::EscapingPath(name.clone()));
    }

    let dir = self.base_dir.join(&source.path);
    let mut files = Vec::with_capacity(source.files.len());

    for name in &source.files {
      let path = dir.join(name);
      let content = read_file(&path).await?;
      files.push(ArtifactFile::new(name.clone(), content));
    }

    debug!(identity = %identity, dir = %dir.display(), files = files.len(), "read local source");
    Ok(FunctionArtifact::new(identity, files))
  }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, SourceError> {
  tokio::fs::read(path).await.map_err(|e| match e.kind() {
    io::ErrorKind::NotFound => SourceError::SourceNotFound(path.display().to_string()),
    _ => SourceError::SourceUnavailable(format!("{}: {e}", path.display())),
  })
}
