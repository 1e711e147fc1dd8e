//! Git repository sources.
//!
//! Each resolution clones the requested branch into a transient directory,
//! reads the listed files and drops the checkout. Only the extracted bytes
//! survive, inside the returned artifact.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::{GitSource, SourceError, SourceIdentity};
use crate::artifact::{ArtifactFile, FunctionArtifact};
use crate::cancel::CancelToken;
use crate::util::fs::is_contained;

#[derive(Debug, Clone, Default)]
pub struct GitProvider;

impl GitProvider {
  pub fn new() -> Self {
    Self
  }

  /// Clone `source.branch` of `source.url` and read the listed files.
  ///
  /// The transfer runs on the blocking pool and polls `cancel` between
  /// network operations.
  pub async fn fetch(
    &self,
    source: &GitSource,
    identity: SourceIdentity,
    cancel: &CancelToken,
  ) -> Result<FunctionArtifact, SourceError> {
    if cancel.is_cancelled() {
      return Err(SourceError::Cancelled);
    }
    check_paths(source)?;

    let task_source = source.clone();
    let task_cancel = cancel.clone();
    let files = tokio::task::spawn_blocking(move || checkout_and_read(&task_source, &task_cancel))
      .await
      .map_err(|e| SourceError::SourceUnavailable(format!("git task failed: {e}")))??;

    Ok(FunctionArtifact::new(identity, files))
  }
}

fn checkout_and_read(source: &GitSource, cancel: &CancelToken) -> Result<Vec<ArtifactFile>, SourceError> {
  let workdir = tempfile::Builder::new()
    .prefix("microfunc-git-")
    .tempdir()
    .map_err(|e| SourceError::SourceUnavailable(format!("failed to create checkout directory: {e}")))?;
  let dest = workdir.path().join("checkout");

  info!(url = %source.url, branch = %source.branch, "cloning repository");

  let prepared = gix::prepare_clone(source.url.as_str(), &dest).map_err(|e| unavailable(source, cancel, e))?;
  let mut prepared = prepared
    .with_ref_name(Some(source.branch.as_str()))
    .map_err(|e| SourceError::SourceNotFound(format!("invalid ref '{}': {e}", source.branch)))?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, cancel.flag())
    .map_err(|e| unavailable(source, cancel, e))?;

  let (_repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, cancel.flag())
    .map_err(|e| unavailable(source, cancel, e))?;

  let dir = dest.join(&source.path);
  let files = source
    .files
    .iter()
    .map(|name| read_checked_out(&dir, name, source).map(|content| ArtifactFile::new(name.clone(), content)))
    .collect::<Result<Vec<_>, _>>()?;

  debug!(url = %source.url, files = files.len(), "read files from checkout");
  Ok(files)
}

/// Refuse a repository path or file name that would read outside the checkout.
fn check_paths(source: &GitSource) -> Result<(), SourceError> {
  if !source.path.is_empty() && !is_contained(&source.path) {
    return Err(SourceError::EscapingPath(source.path.clone()));
  }
  match source.files.iter().find(|name| !is_contained(name)) {
    Some(name) => Err(SourceError::EscapingPath(name.clone())),
    None => Ok(()),
  }
}

fn read_checked_out(dir: &Path, name: &str, source: &GitSource) -> Result<Vec<u8>, SourceError> {
  fs::read(dir.join(name)).map_err(|e| match e.kind() {
    io::ErrorKind::NotFound => SourceError::SourceNotFound(format!(
      "{name} not found in {}@{}:{}",
      source.url, source.branch, source.path
    )),
    _ => SourceError::SourceUnavailable(format!("failed to read {name}: {e}")),
  })
}

fn unavailable(source: &GitSource, cancel: &CancelToken, error: impl std::fmt::Display) -> SourceError {
  if cancel.is_cancelled() {
    return SourceError::Cancelled;
  }
  SourceError::SourceUnavailable(format!("{}: {error}", source.url))
}
