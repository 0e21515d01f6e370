//! Infrastructure settings read by the agent at boot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::blobstore::BlobstoreConfig;
use crate::deployment::{Instance, NetworkType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureSettings {
  pub agent_id: String,
  pub vm: VmSettings,
  pub networks: BTreeMap<String, NetworkSettings>,
  pub disks: DiskSettings,
  pub blobstore: BlobstoreConfig,
  pub mbus: String,
  pub env: serde_json::Map<String, serde_json::Value>,
  pub ntp: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSettings {
  pub name: String,
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
  #[serde(rename = "type")]
  pub kind: NetworkType,
  pub ip: String,
  pub netmask: String,
  pub gateway: String,
  pub dns_record_name: String,
  pub cloud_properties: serde_json::Map<String, serde_json::Value>,
  /// Networking is already configured on the machine.
  pub preconfigured: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSettings {
  pub persistent: BTreeMap<String, String>,
}

impl InfrastructureSettings {
  pub fn for_instance(instance: &Instance, blobstore: &BlobstoreConfig, mbus: &str) -> Self {
    let slug = instance.slug();

    let networks = instance
      .network_associations
      .iter()
      .map(|assoc| {
        let config = instance.network_configuration(assoc);
        let settings = NetworkSettings {
          kind: assoc.network.kind,
          ip: config.ip,
          netmask: config.netmask,
          gateway: config.gateway,
          dns_record_name: instance.dns_record_name(assoc),
          cloud_properties: assoc.network.cloud_properties.clone(),
          preconfigured: true,
        };
        (assoc.network.name.clone(), settings)
      })
      .collect();

    Self {
      agent_id: format!("agent-id-{}", slug),
      vm: VmSettings {
        name: format!("vm-name-{}", slug),
        id: format!("vm-id-{}", slug),
      },
      networks,
      disks: DiskSettings::default(),
      blobstore: blobstore.clone(),
      mbus: mbus.to_string(),
      env: serde_json::Map::new(),
      ntp: Vec::new(),
    }
  }
}
