//! Agent provisioning.
//!
//! Brings a machine's agent and monit into a known running state, writes the
//! settings the agent boots from, and waits until the agent answers.
//!
//! # Submodules
//!
//! - [`agent_provisioner`] - the provision/configure sequence
//! - [`assets`] - shipped binaries and certificates
//! - [`retry`] - fixed-interval retry for the readiness handshake
//! - [`settings`] - infrastructure settings document
//! - [`supervisor`] - runit-backed service supervision

pub mod agent_provisioner;
pub mod assets;
pub mod retry;
pub mod settings;
pub mod supervisor;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentError;

pub use agent_provisioner::AgentProvisioner;
pub use assets::{AssetError, AssetManager, DirAssetManager};
pub use retry::{RetryExhausted, RetryPolicy};
pub use settings::InfrastructureSettings;
pub use supervisor::{RunitConfig, RunitSupervisor, ServiceSupervisor, SupervisorError};

/// How the agent on a machine is bootstrapped. Fixed for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentProvisionerConfig {
  /// Written to the platform marker file read by the agent's run script.
  pub platform: String,
  /// Written verbatim as the agent configuration file.
  #[serde(default)]
  pub configuration: serde_json::Value,
  /// Message-bus endpoint the agent listens on.
  pub mbus: String,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error("deprovisioning {service}: {source}")]
  Deprovision {
    service: String,
    #[source]
    source: SupervisorError,
  },

  #[error("provisioning {service}: {source}")]
  Provision {
    service: String,
    #[source]
    source: SupervisorError,
  },

  #[error("placing {name}: {source}")]
  PlaceAsset {
    name: String,
    #[source]
    source: AssetError,
  },

  #[error("writing {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("serializing {what}: {source}")]
  Serialize {
    what: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("building agent client: {0}")]
  AgentClient(#[source] AgentError),

  #[error("agent did not respond after {attempts} attempts: {source}")]
  HandshakeTimeout {
    attempts: u32,
    #[source]
    source: AgentError,
  },
}
