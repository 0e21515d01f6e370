//! Deployment model: jobs, templates, instances and their networks.
//!
//! Instances are created by deployment planning and consumed read-only.

use serde::{Deserialize, Serialize};

/// Reference from a deployment job to a release job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  /// Release job name.
  pub name: String,
  /// Release that ships the job.
  pub release: String,
  /// Version of the release job, reported in the apply spec.
  pub version: String,
}

/// A named unit of deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub name: String,
  pub templates: Vec<Template>,
  /// Deployment-level property values, nested by dotted name segments.
  #[serde(default)]
  pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
  Manual,
  Dynamic,
  Vip,
}

impl std::fmt::Display for NetworkType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      NetworkType::Manual => "manual",
      NetworkType::Dynamic => "dynamic",
      NetworkType::Vip => "vip",
    };
    write!(f, "{}", s)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: NetworkType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub netmask: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gateway: Option<String>,
  #[serde(default)]
  pub dns: Vec<String>,
  #[serde(default)]
  pub cloud_properties: serde_json::Map<String, serde_json::Value>,
}

/// Binding of an instance to a network, optionally with a static IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAssociation {
  pub network: Network,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ip: Option<String>,
}

/// Effective addressing for one association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfiguration {
  pub ip: String,
  pub netmask: String,
  pub gateway: String,
}

/// One VM slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
  pub deployment: String,
  pub job_name: String,
  pub index: u32,
  #[serde(default)]
  pub network_associations: Vec<NetworkAssociation>,
  /// Persistent disk size in MiB; 0 means none.
  #[serde(default)]
  pub persistent_disk: u64,
}

impl Instance {
  /// Addressing for an association. Dynamic networks have no address until
  /// the machine boots, so their fields are empty.
  pub fn network_configuration(&self, assoc: &NetworkAssociation) -> NetworkConfiguration {
    NetworkConfiguration {
      ip: assoc.ip.clone().unwrap_or_default(),
      netmask: assoc.network.netmask.clone().unwrap_or_default(),
      gateway: assoc.network.gateway.clone().unwrap_or_default(),
    }
  }

  /// `<index>.<job>.<network>.<deployment>.bosh`
  pub fn dns_record_name(&self, assoc: &NetworkAssociation) -> String {
    format!(
      "{}.{}.{}.{}.bosh",
      self.index,
      dns_label(&self.job_name),
      dns_label(&assoc.network.name),
      dns_label(&self.deployment)
    )
  }

  /// Identity used in agent ids and VM names.
  pub fn slug(&self) -> String {
    format!("{}-{}", self.job_name, self.index)
  }
}

/// Lowercases and replaces characters not allowed in DNS labels with `-`.
fn dns_label(s: &str) -> String {
  s.chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
    .collect()
}

/// Everything needed to converge a set of machines, as read from a deployment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
  pub name: String,
  #[serde(default)]
  pub releases: Vec<crate::release::Release>,
  #[serde(default)]
  pub jobs: Vec<Job>,
  #[serde(default)]
  pub instances: Vec<Instance>,
}

impl Deployment {
  pub fn find_job(&self, name: &str) -> Option<&Job> {
    self.jobs.iter().find(|j| j.name == name)
  }

  pub fn find_instance(&self, job_name: &str, index: u32) -> Option<&Instance> {
    self.instances.iter().find(|i| i.job_name == job_name && i.index == index)
  }
}
