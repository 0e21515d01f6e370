//! Compile command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn compile_router_deployment() {
  let env = TestEnv::from_fixture("router");

  env
    .compile()
    .success()
    .stdout(predicate::str::contains("Compile complete!"))
    .stdout(predicate::str::contains("Rendered archives: 2"));

  assert_eq!(env.record_count("packages"), 2);
  assert_eq!(env.record_count("rendered"), 2);
  assert_eq!(env.record_count("jobs"), 1);
}

#[test]
fn compile_json_lists_instances() {
  let env = TestEnv::from_fixture("router");

  let output = env
    .converge_cmd()
    .args(["compile", "--output", "json"])
    .arg(&env.deployment_path)
    .output()
    .unwrap();

  assert!(output.status.success());
  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["deployment"], "cf");
  assert_eq!(summary["packages"], 2);
  assert_eq!(summary["instances"], serde_json::json!(["router-0", "router-1"]));
}

#[test]
fn compile_is_idempotent() {
  let env = TestEnv::from_fixture("router");
  env.compile().success();
  let blobs_before = std::fs::read_dir(env.store_path().join("blobs")).unwrap().count();

  env.compile().success();

  assert_eq!(env.record_count("rendered"), 2);
  assert_eq!(
    std::fs::read_dir(env.store_path().join("blobs")).unwrap().count(),
    blobs_before
  );
}

#[test]
fn compile_with_single_worker() {
  let env = TestEnv::from_fixture("router");

  env
    .converge_cmd()
    .args(["compile", "--jobs", "1"])
    .arg(&env.deployment_path)
    .assert()
    .success();

  assert_eq!(env.record_count("rendered"), 2);
}

#[test]
fn compile_fails_on_broken_packaging_script() {
  let env = TestEnv::from_fixture("router");
  let packaging = env.deployment_path.with_file_name("release/packages/ruby/packaging");
  std::fs::write(packaging, "echo broken >&2\nexit 3\n").unwrap();

  env
    .compile()
    .failure()
    .stderr(predicate::str::contains("Failed to compile packages of release app"));

  assert_eq!(env.record_count("rendered"), 0);
}

#[test]
fn compile_fails_on_malformed_template() {
  let env = TestEnv::from_fixture("router");
  let ctl = env
    .deployment_path
    .with_file_name("release/jobs/router/templates/ctl.erb");
  std::fs::write(ctl, "port=<%= p(\"router.port\"\n").unwrap();

  env
    .compile()
    .failure()
    .stderr(predicate::str::contains("Failed to precompile templates of release app"));
}
