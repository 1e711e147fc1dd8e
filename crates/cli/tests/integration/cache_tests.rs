use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn cache_is_empty_before_build() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env
    .microfunc_cmd()
    .args(["cache", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Artifact cache is empty"));
}

#[test]
fn build_populates_cache() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  let output = env.microfunc_cmd().args(["cache", "list", "--json"]).output().unwrap();
  assert!(output.status.success());
  let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let entries = entries.as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert!(entries.iter().all(|e| e["fresh"] == true));
  assert!(
    entries
      .iter()
      .any(|e| e["identity"] == "local:./functions#printer.py")
  );
}

#[test]
fn cache_clear_removes_entries() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  env
    .microfunc_cmd()
    .args(["cache", "clear"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 2 cache entries"));

  env
    .microfunc_cmd()
    .args(["cache", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Artifact cache is empty"));
}
