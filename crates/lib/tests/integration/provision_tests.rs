//! Provision a machine root with runit and handshake with an HTTP agent.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use converge_lib::agent::{AgentClient, HttpAgentClientFactory};
use converge_lib::blobstore::BlobstoreConfig;
use converge_lib::provisioner::{
  AgentProvisioner, AgentProvisionerConfig, DirAssetManager, ProvisionError, RetryPolicy, RunitConfig,
  RunitSupervisor,
};

use super::common::router_instance;

type Provisioner = AgentProvisioner<RunitSupervisor, DirAssetManager, HttpAgentClientFactory>;

fn write_assets(dir: &Path) {
  for (name, content) in [
    ("agent/bosh-agent", "agent"),
    ("agent/bosh-agent-rc", "agent-rc"),
    ("agent/bosh-blobstore-dav", "dav"),
    ("agent/agent.cert", "cert"),
    ("agent/agent.key", "key"),
    ("agent/runit/run", "#!/bin/sh\nexec bosh-agent\n"),
    ("agent/runit/log/run", "#!/bin/sh\nexec svlogd\n"),
    ("monit/monit", "monit"),
    ("monit/runit/run", "#!/bin/sh\nexec monit -I\n"),
  ] {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
}

fn provisioner(temp: &TempDir, mbus: &str) -> Provisioner {
  let root = temp.path().join("root");
  let assets = temp.path().join("assets");
  write_assets(&assets);

  let runit = RunitConfig {
    sv_bin: "/bin/true".to_string(),
    ..RunitConfig::default()
  };
  let config = AgentProvisionerConfig {
    platform: "ubuntu".to_string(),
    configuration: json!({"Platform": {"Linux": {"UseDefaultTmpDir": true}}}),
    mbus: mbus.to_string(),
  };

  AgentProvisioner::new(
    &root,
    RunitSupervisor::new(&root, &assets, runit),
    DirAssetManager::new(&assets),
    HttpAgentClientFactory,
    BlobstoreConfig::Local {
      blobstore_path: temp.path().join("blobs"),
    },
    config,
  )
  .with_handshake(RetryPolicy::new(Duration::from_millis(10), 3))
}

#[tokio::test]
async fn provision_lays_out_machine() {
  let temp = TempDir::new().unwrap();
  let root = temp.path().join("root");

  provisioner(&temp, "http://127.0.0.1:1").provision().await.unwrap();

  for bin in ["bosh-agent", "bosh-agent-rc", "bosh-blobstore-dav", "monit"] {
    let mode = fs::metadata(root.join("var/vcap/bosh/bin").join(bin)).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "{bin} is executable");
  }
  assert_eq!(fs::read_to_string(root.join("var/vcap/bosh/agent.cert")).unwrap(), "cert");
  assert_eq!(fs::read_to_string(root.join("var/vcap/bosh/etc/platform")).unwrap(), "ubuntu");

  let agent_config: Value = serde_json::from_slice(&fs::read(root.join("var/vcap/bosh/agent.json")).unwrap()).unwrap();
  assert_eq!(agent_config["Platform"]["Linux"]["UseDefaultTmpDir"], true);

  assert_eq!(fs::read_link(root.join("var/vcap/sys")).unwrap(), Path::new("data/sys"));
  for service in ["agent", "monit"] {
    let link = root.join("etc/service").join(service);
    assert_eq!(fs::read_link(&link).unwrap(), root.join("etc/sv").join(service));
    assert!(root.join("etc/sv").join(service).join("run").is_file());
  }
  assert!(root.join("etc/sv/agent/log/run").is_file());
  assert!(!root.join("etc/sv/monit/log/run").exists());
}

#[tokio::test]
async fn provision_replaces_previous_install() {
  let temp = TempDir::new().unwrap();
  let provisioner = provisioner(&temp, "http://127.0.0.1:1");

  provisioner.provision().await.unwrap();
  fs::write(temp.path().join("assets/agent/bosh-agent"), "agent v2").unwrap();
  provisioner.provision().await.unwrap();

  assert_eq!(
    fs::read_to_string(temp.path().join("root/var/vcap/bosh/bin/bosh-agent")).unwrap(),
    "agent v2"
  );
}

#[tokio::test]
async fn configure_writes_settings_and_waits_for_agent() {
  let mut server = mockito::Server::new_async().await;
  let mock = server
    .mock("POST", "/agent")
    .with_status(200)
    .with_body(r#"{"value":"pong"}"#)
    .expect_at_least(2)
    .create_async()
    .await;
  let mbus = server.url().replacen("http://", "http://vcap:secret@", 1);

  let temp = TempDir::new().unwrap();
  let provisioner = provisioner(&temp, &mbus);
  provisioner.provision().await.unwrap();

  let client = provisioner.configure(&router_instance(0)).await.unwrap();
  assert_eq!(client.ping().await.unwrap(), "pong");
  mock.assert_async().await;

  let settings: Value = serde_json::from_slice(
    &fs::read(temp.path().join("root/var/vcap/bosh/warden-cpi-agent-env.json")).unwrap(),
  )
  .unwrap();
  assert_eq!(settings["agent_id"], "agent-id-router-0");
  assert_eq!(settings["vm"], json!({"name": "vm-name-router-0", "id": "vm-id-router-0"}));
  assert_eq!(settings["mbus"], mbus);
  assert_eq!(settings["blobstore"]["provider"], "local");
  assert_eq!(settings["networks"]["default"]["ip"], "10.244.0.10");
  assert_eq!(settings["networks"]["default"]["preconfigured"], true);
}

#[tokio::test]
async fn configure_times_out_when_agent_keeps_failing() {
  let mut server = mockito::Server::new_async().await;
  let mock = server
    .mock("POST", "/agent")
    .with_status(200)
    .with_body(r#"{"exception":{"message":"not ready"}}"#)
    .expect(3)
    .create_async()
    .await;

  let temp = TempDir::new().unwrap();
  let provisioner = provisioner(&temp, &server.url());

  let err = provisioner.configure(&router_instance(0)).await.unwrap_err();

  assert!(
    matches!(err, ProvisionError::HandshakeTimeout { attempts: 3, .. }),
    "{err}"
  );
  mock.assert_async().await;
}
