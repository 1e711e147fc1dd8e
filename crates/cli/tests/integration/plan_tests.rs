use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_orders_dependencies_first() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env
    .microfunc_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("2 service(s) in 2 wave(s)"))
    .stdout(predicate::str::is_match("(?s)Wave 1:.*printer-service.*Wave 2:.*data-validator-service").unwrap());
}

#[test]
fn plan_json_lists_waves() {
  let env = TestEnv::from_fixture("local_services.yaml");

  let output = env.microfunc_cmd().args(["plan", "--json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["waves"], 2);
  assert_eq!(json["services"][0]["name"], "printer-service");
  assert_eq!(json["services"][0]["wave"], 0);
  assert_eq!(json["services"][1]["name"], "data-validator-service");
  assert_eq!(json["services"][1]["dependsOn"][0], "printer-service");
}

#[test]
fn plan_reports_cycle_members() {
  let env = TestEnv::from_fixture("cycle.yaml");

  env
    .microfunc_cmd()
    .arg("plan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle"))
    .stderr(predicate::str::contains("alpha"))
    .stderr(predicate::str::contains("beta"));
}

#[test]
fn plan_reports_unknown_dependency() {
  let env = TestEnv::from_fixture("unknown_dependency.yaml");

  env
    .microfunc_cmd()
    .arg("plan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown service 'ghost'"));
}
