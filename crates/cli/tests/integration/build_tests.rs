use predicates::prelude::*;

use super::common::{PRINTER_PY, TestEnv, VALIDATOR_PY};

#[test]
fn build_emits_service_definitions() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env
    .microfunc_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("printer-service: success"))
    .stdout(predicate::str::contains("data-validator-service: success"));

  assert_eq!(env.read_file("generated/printer-service/printer.py"), PRINTER_PY);
  assert_eq!(env.read_file("generated/data-validator-service/main.py"), VALIDATOR_PY);

  let definition: serde_json::Value =
    serde_json::from_str(&env.read_file("generated/printer-service/service.json")).unwrap();
  assert_eq!(definition["name"], "printer-service");
  assert_eq!(definition["grpc"]["port"], 50051);
  assert_eq!(definition["grpc"]["tls"]["cert"], "main");
  assert_eq!(definition["environment"]["LOG_LEVEL"], "info");

  let validator: serde_json::Value =
    serde_json::from_str(&env.read_file("generated/data-validator-service/service.json")).unwrap();
  assert_eq!(validator["http"]["port"], 8080);
  assert_eq!(validator["dependsOn"][0], "printer-service");
}

#[test]
fn second_build_is_unchanged() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env.microfunc_cmd().arg("build").assert().success();
  env
    .microfunc_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("[unchanged]"));
}

#[test]
fn changed_source_is_rebuilt() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  env.write_file("functions/printer.py", "print('v2')\n");
  env.microfunc_cmd().arg("build").assert().success();

  assert_eq!(env.read_file("generated/printer-service/printer.py"), "print('v2')\n");
}

#[test]
fn edited_service_fields_are_re_emitted() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();

  let manifest = env.read_file("microfunc.yaml").replace("port: 50051", "port: 50061");
  env.write_file("microfunc.yaml", &manifest);
  env
    .microfunc_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::is_match("printer-service: success \\([0-9a-f]+\\)\n").unwrap());

  let definition: serde_json::Value =
    serde_json::from_str(&env.read_file("generated/printer-service/service.json")).unwrap();
  assert_eq!(definition["grpc"]["port"], 50061);
}

#[test]
fn build_json_report() {
  let env = TestEnv::from_fixture("local_services.yaml");

  let output = env.microfunc_cmd().args(["build", "--json"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["counts"]["success"], 2);
  assert_eq!(report["services"][0]["name"], "printer-service");
  assert_eq!(report["services"][0]["outcome"]["status"], "success");
}

#[test]
fn missing_local_file_fails_and_skips_dependents() {
  let env = TestEnv::from_fixture("local_services.yaml");
  std::fs::remove_file(env.path("functions/printer.py")).unwrap();

  env
    .microfunc_cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("printer-service: failed"))
    .stdout(predicate::str::contains("data-validator-service: skipped"));

  assert!(!env.path("generated/data-validator-service").exists());
}

#[test]
fn generation_failure_fails_build() {
  let env = TestEnv::from_fixture("failing_generation.yaml");

  let output = env.microfunc_cmd().args(["build", "--json"]).output().unwrap();
  assert!(!output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let outcome = |i: usize| report["services"][i]["outcome"]["status"].clone();
  assert_eq!(report["services"][0]["name"], "printer-service");
  assert_eq!(outcome(0), "success");
  assert_eq!(outcome(1), "failed");
  assert_eq!(outcome(2), "skipped");
  assert_eq!(
    report["services"][2]["outcome"]["failedDependency"],
    "data-validator-service"
  );
}

#[test]
fn missing_local_file_is_served_from_cache() {
  let env = TestEnv::from_fixture("local_services.yaml");
  env.microfunc_cmd().arg("build").assert().success();
  std::fs::remove_file(env.path("functions/printer.py")).unwrap();

  env
    .microfunc_cmd()
    .args(["build", "--fallback", "use-cached"])
    .assert()
    .success()
    .stdout(predicate::str::contains("printer-service: success"));

  env
    .microfunc_cmd()
    .args(["build", "--fallback", "fail"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("printer-service: failed"));
}

#[test]
fn missing_manifest_fails() {
  let env = TestEnv::empty();

  env
    .microfunc_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load manifest"));
}

#[test]
fn invalid_fallback_is_rejected() {
  let env = TestEnv::from_fixture("local_services.yaml");

  env
    .microfunc_cmd()
    .args(["build", "--fallback", "sometimes"])
    .assert()
    .failure();
}
