//! On-disk persistence for cache entries.
//!
//! # Layout
//!
//! ```text
//! {cache_dir}/
//! └── <20-hex hash of identity>.json   # one CacheEntry per source identity
//! ```
//!
//! Files are written atomically. Unreadable or corrupt files are skipped with
//! a warning; they never fail a build.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use super::entry::{CACHE_ENTRY_VERSION, CacheEntry};
use crate::source::SourceIdentity;
use crate::util::fs::write_atomic;
use crate::util::hash::ObjectHash;

#[derive(Debug, Error)]
pub enum CacheStoreError {
  #[error("failed to read cache entry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write cache entry {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("corrupt cache entry {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize cache entry: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported cache entry version {0}, expected {CACHE_ENTRY_VERSION}")]
  UnsupportedVersion(u32),
}

#[derive(Debug, Clone)]
pub struct CacheStore {
  dir: PathBuf,
}

impl CacheStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path_for(&self, identity: &SourceIdentity) -> PathBuf {
    self.dir.join(format!("{}.json", ObjectHash::of_key(&identity.0)))
  }

  /// Load the entry for `identity`.
  ///
  /// Returns `Ok(None)` if no entry exists, or if the file on disk belongs to
  /// another identity.
  pub fn load(&self, identity: &SourceIdentity) -> Result<Option<CacheEntry>, CacheStoreError> {
    let path = self.path_for(identity);
    let Some(entry) = read_entry(&path)? else {
      return Ok(None);
    };
    if entry.identity != *identity {
      warn!(path = %path.display(), identity = %identity, "cache file belongs to another identity, ignoring");
      return Ok(None);
    }
    Ok(Some(entry))
  }

  pub fn save(&self, entry: &CacheEntry) -> Result<(), CacheStoreError> {
    let path = self.path_for(&entry.identity);
    let content = serde_json::to_vec_pretty(entry).map_err(CacheStoreError::Serialize)?;
    write_atomic(&path, &content).map_err(|source| CacheStoreError::Write { path, source })
  }

  /// All readable entries, sorted by identity. Corrupt files are skipped.
  pub fn list(&self) -> Result<Vec<CacheEntry>, CacheStoreError> {
    let mut entries = Vec::new();
    for path in self.entry_files()? {
      match read_entry(&path) {
        Ok(Some(entry)) => entries.push(entry),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cache entry"),
      }
    }
    entries.sort_by(|a, b| a.identity.cmp(&b.identity));
    Ok(entries)
  }

  /// Delete every entry file. Returns how many were removed.
  pub fn clear(&self) -> Result<usize, CacheStoreError> {
    let mut removed = 0;
    for path in self.entry_files()? {
      fs::remove_file(&path).map_err(|source| CacheStoreError::Write { path, source })?;
      removed += 1;
    }
    Ok(removed)
  }

  fn entry_files(&self) -> Result<Vec<PathBuf>, CacheStoreError> {
    let read_dir = match fs::read_dir(&self.dir) {
      Ok(read_dir) => read_dir,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(CacheStoreError::Read {
          path: self.dir.clone(),
          source,
        });
      }
    };

    let mut files = Vec::new();
    for dir_entry in read_dir {
      let dir_entry = dir_entry.map_err(|source| CacheStoreError::Read {
        path: self.dir.clone(),
        source,
      })?;
      let path = dir_entry.path();
      if path.extension().is_some_and(|ext| ext == "json") {
        files.push(path);
      }
    }
    Ok(files)
  }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheStoreError> {
  let content = match fs::read(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(CacheStoreError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let entry: CacheEntry = serde_json::from_slice(&content).map_err(|source| CacheStoreError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  if entry.version != CACHE_ENTRY_VERSION {
    return Err(CacheStoreError::UnsupportedVersion(entry.version));
  }
  Ok(Some(entry))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use tempfile::TempDir;

  use super::*;
  use crate::artifact::{ArtifactFile, FunctionArtifact};

  fn temp_store() -> (TempDir, CacheStore) {
    let temp = TempDir::new().unwrap();
    let store = CacheStore::new(temp.path().join("cache"));
    (temp, store)
  }

  fn entry(id: &str) -> CacheEntry {
    let identity = SourceIdentity(id.to_string());
    let artifact = FunctionArtifact::new(identity.clone(), vec![ArtifactFile::new("f.py", id)]);
    CacheEntry::new(identity, ObjectHash::of_key(id), Arc::new(artifact), 100, 60)
  }

  #[test]
  fn load_missing_returns_none() {
    let (_temp, store) = temp_store();
    assert!(store.load(&SourceIdentity("nope".to_string())).unwrap().is_none());
  }

  #[test]
  fn save_then_load() {
    let (_temp, store) = temp_store();
    let e = entry("generated:a");
    store.save(&e).unwrap();

    let loaded = store.load(&e.identity).unwrap().unwrap();
    assert_eq!(loaded, e);
    assert!(loaded.artifact.verify());
  }

  #[test]
  fn file_name_is_identity_hash() {
    let (_temp, store) = temp_store();
    let path = store.path_for(&SourceIdentity("generated:a".to_string()));
    let name = path.file_stem().unwrap().to_str().unwrap();
    assert_eq!(name.len(), 20);
    assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn corrupt_entry_is_an_error_on_load() {
    let (_temp, store) = temp_store();
    let identity = SourceIdentity("generated:a".to_string());
    fs::create_dir_all(store.dir()).unwrap();
    fs::write(store.path_for(&identity), "{ not json").unwrap();

    assert!(matches!(store.load(&identity), Err(CacheStoreError::Parse { .. })));
  }

  #[test]
  fn list_skips_corrupt_entries() {
    let (_temp, store) = temp_store();
    store.save(&entry("generated:b")).unwrap();
    store.save(&entry("generated:a")).unwrap();
    fs::write(store.dir().join("garbage.json"), "nope").unwrap();

    let ids: Vec<_> = store.list().unwrap().into_iter().map(|e| e.identity.0).collect();
    assert_eq!(ids, vec!["generated:a", "generated:b"]);
  }

  #[test]
  fn clear_removes_entries() {
    let (_temp, store) = temp_store();
    store.save(&entry("generated:a")).unwrap();
    store.save(&entry("generated:b")).unwrap();

    assert_eq!(store.clear().unwrap(), 2);
    assert!(store.list().unwrap().is_empty());
  }

  #[test]
  fn list_of_missing_dir_is_empty() {
    let (_temp, store) = temp_store();
    assert!(store.list().unwrap().is_empty());
    assert_eq!(store.clear().unwrap(), 0);
  }
}
