//! Filesystem helpers.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path};

/// Write `content` to `path` so readers see either the old or the new file.
///
/// The data goes to a temporary file in the same directory, which is then
/// renamed over the target. Missing parent directories are created.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  fs::create_dir_all(parent)?;

  let mut temp = tempfile::NamedTempFile::new_in(parent)?;
  temp.write_all(content)?;
  temp.as_file().sync_all()?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

/// True when joining `name` onto a directory names an entry below it: the
/// path is relative and holds no `..` or root components.
pub fn is_contained(name: &str) -> bool {
  let path = Path::new(name);
  path.components().any(|c| matches!(c, Component::Normal(_)))
    && path
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// True when `name` is exactly one normal path component.
pub fn is_single_component(name: &str) -> bool {
  let mut components = Path::new(name).components();
  matches!(
    (components.next(), components.next()),
    (Some(Component::Normal(_)), None)
  )
}
