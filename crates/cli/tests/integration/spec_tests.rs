//! Spec command integration tests.

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::TestEnv;

fn spec(env: &TestEnv, index: &str) -> Value {
  let output = env
    .converge_cmd()
    .arg("spec")
    .arg(&env.deployment_path)
    .args(["--job", "router", "--index", index])
    .output()
    .unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn spec_after_compile() {
  let env = TestEnv::from_fixture("router");
  env.compile().success();

  let spec = spec(&env, "1");

  assert_eq!(spec["deployment"], "cf");
  assert_eq!(spec["index"], 1);
  assert_eq!(spec["job"]["name"], "router");
  assert_eq!(spec["job"]["templates"], json!([{"name": "router", "version": "0.1"}]));
  assert_eq!(spec["networks"]["default"]["ip"], "10.244.0.11");
  assert_eq!(spec["networks"]["default"]["default"], json!(["dns", "gateway"]));

  let packages = spec["packages"].as_object().unwrap();
  assert_eq!(packages.keys().collect::<Vec<_>>(), ["nginx", "ruby"]);
  assert_eq!(packages["ruby"]["version"], "1.0");
  assert_eq!(packages["ruby"]["sha1"].as_str().unwrap().len(), 40);

  let archive = &spec["rendered_templates_archive"];
  assert_eq!(archive["sha1"].as_str().unwrap().len(), 40);
  assert!(env.store_path().join("blobs").join(archive["blobstore_id"].as_str().unwrap()).exists());
}

#[test]
fn instances_get_distinct_archives() {
  let env = TestEnv::from_fixture("router");
  env.compile().success();

  let first = spec(&env, "0");
  let second = spec(&env, "1");

  assert_ne!(
    first["rendered_templates_archive"]["sha1"],
    second["rendered_templates_archive"]["sha1"]
  );
  assert_eq!(first["packages"], second["packages"]);
}

#[test]
fn spec_before_compile_fails() {
  let env = TestEnv::from_fixture("router");

  env
    .converge_cmd()
    .arg("spec")
    .arg(&env.deployment_path)
    .args(["--job", "router"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to assemble apply spec for router-0"));
}

#[test]
fn spec_for_unknown_instance_fails() {
  let env = TestEnv::from_fixture("router");

  env
    .converge_cmd()
    .arg("spec")
    .arg(&env.deployment_path)
    .args(["--job", "router", "--index", "7"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("has no instance router/7"));
}
