//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

pub const PRINTER_PY: &str = "def main(request):\n    print(request)\n";
pub const VALIDATOR_PY: &str = "def main(request):\n    return bool(request)\n";

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifest, the
/// function sources and every output directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, with the standard function files in place.
  ///
  /// Copies the fixture content to a temporary `microfunc.yaml`.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    std::fs::write(&env.manifest_path, fixture_content(name)).unwrap();
    env.write_file("functions/printer.py", PRINTER_PY);
    env.write_file("functions/validator.py", VALIDATOR_PY);
    env
  }

  /// Create an environment without a manifest.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("microfunc.yaml");
    Self { temp, manifest_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Read a file relative to the temp directory.
  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path))
      .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative_path, e))
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Get a pre-configured Command for the microfunc binary.
  ///
  /// Clears the path overrides so outputs land next to the manifest, and
  /// points `-f` at the test manifest.
  pub fn microfunc_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("microfunc");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("MICROFUNC_CACHE_DIR");
    cmd.env_remove("MICROFUNC_REGISTRY_DIR");
    cmd.env_remove("MICROFUNC_OUTPUT_DIR");
    cmd.env_remove("MICROFUNC_TEST_UNSET_KEY");
    cmd.env_remove("RUST_LOG");
    cmd.arg("-f").arg(&self.manifest_path);
    cmd
  }
}
