use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn status_before_build() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env
    .microfunc_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No build records found"));
}

#[test]
fn status_lists_records_after_build() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  env
    .microfunc_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("printer-service success"))
    .stdout(predicate::str::contains("data-validator-service success"));
}

#[test]
fn status_json_keeps_last_success_after_failure() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  std::fs::remove_file(env.path("functions/printer.py")).unwrap();
  env
    .microfunc_cmd()
    .args(["build", "--fallback", "fail"])
    .assert()
    .failure();

  let output = env.microfunc_cmd().args(["status", "--json"]).output().unwrap();
  assert!(output.status.success());
  let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let printer = records
    .as_array()
    .unwrap()
    .iter()
    .find(|r| r["service"] == "printer-service")
    .unwrap();
  assert_eq!(printer["outcome"], "success");
}
