use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::blobstore::BlobId;
use crate::deployment::{Instance, NetworkType};

/// Converged desired state for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplySpec {
  pub deployment: String,
  pub index: u32,
  pub job: JobSpec,
  pub packages: BTreeMap<String, PackageSpec>,
  pub networks: BTreeMap<String, NetworkSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rendered_templates_archive: Option<RenderedTemplatesArchiveSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
  pub name: String,
  /// Release jobs to run, in declared order. The agent reads this as
  /// `templates`.
  #[serde(rename = "templates")]
  pub template_specs: Vec<JobTemplateSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplateSpec {
  pub name: String,
  pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
  pub name: String,
  pub version: String,
  pub sha1: String,
  pub blobstore_id: BlobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
  #[serde(rename = "type")]
  pub kind: NetworkType,
  pub ip: String,
  pub netmask: String,
  pub gateway: String,
  #[serde(default)]
  pub dns: Vec<String>,
  /// Which settings this network provides by default (`dns`, `gateway`).
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub default: Vec<String>,
  #[serde(default)]
  pub cloud_properties: serde_json::Map<String, serde_json::Value>,
  pub dns_record_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplatesArchiveSpec {
  pub sha1: String,
  pub blobstore_id: BlobId,
}

impl ApplySpec {
  /// Spec describing the instance alone: identity and networks, no job
  /// content.
  ///
  /// The first non-VIP network provides the default DNS and gateway.
  pub fn empty(instance: &Instance) -> Self {
    let mut networks = BTreeMap::new();
    let mut default_assigned = false;

    for assoc in &instance.network_associations {
      let config = instance.network_configuration(assoc);
      let default = if !default_assigned && assoc.network.kind != NetworkType::Vip {
        default_assigned = true;
        vec!["dns".to_string(), "gateway".to_string()]
      } else {
        Vec::new()
      };

      networks.insert(
        assoc.network.name.clone(),
        NetworkSpec {
          kind: assoc.network.kind,
          ip: config.ip,
          netmask: config.netmask,
          gateway: config.gateway,
          dns: assoc.network.dns.clone(),
          default,
          cloud_properties: assoc.network.cloud_properties.clone(),
          dns_record_name: instance.dns_record_name(assoc),
        },
      );
    }

    Self {
      deployment: instance.deployment.clone(),
      index: instance.index,
      job: JobSpec {
        name: instance.job_name.clone(),
        template_specs: Vec::new(),
      },
      packages: BTreeMap::new(),
      networks,
      rendered_templates_archive: None,
    }
  }
}
