use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agent::{AgentClient, AgentClientFactory};
use crate::blobstore::BlobstoreConfig;
use crate::consts::{machine, services};
use crate::deployment::Instance;

use super::supervisor::{set_executable, set_mode, symlink};
use super::{AgentProvisionerConfig, AssetManager, InfrastructureSettings, ProvisionError, RetryPolicy, ServiceSupervisor};

pub const AGENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const MONIT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Asset name and installed binary name, placed under the bosh bin dir.
const BINARIES: [(&str, &str); 4] = [
  ("agent/bosh-agent", "bosh-agent"),
  ("agent/bosh-agent-rc", "bosh-agent-rc"),
  ("agent/bosh-blobstore-dav", "bosh-blobstore-dav"),
  ("monit/monit", "monit"),
];

/// Certificate and key used by the agent's HTTPS handler.
const CERTS: [(&str, &str); 2] = [("agent/agent.cert", "agent.cert"), ("agent/agent.key", "agent.key")];

/// Places the agent and monit on a machine rooted at `root` and connects to
/// the agent once it is up.
pub struct AgentProvisioner<S, A, F> {
  root: PathBuf,
  supervisor: S,
  assets: A,
  clients: F,
  blobstore: BlobstoreConfig,
  config: AgentProvisionerConfig,
  handshake: RetryPolicy,
}

impl<S, A, F> AgentProvisioner<S, A, F>
where
  S: ServiceSupervisor,
  A: AssetManager,
  F: AgentClientFactory,
{
  pub fn new(
    root: impl Into<PathBuf>,
    supervisor: S,
    assets: A,
    clients: F,
    blobstore: BlobstoreConfig,
    config: AgentProvisionerConfig,
  ) -> Self {
    Self {
      root: root.into(),
      supervisor,
      assets,
      clients,
      blobstore,
      config,
      handshake: RetryPolicy::default(),
    }
  }

  pub fn with_handshake(mut self, handshake: RetryPolicy) -> Self {
    self.handshake = handshake;
    self
  }

  /// Replace the agent and monit with freshly placed binaries and
  /// configuration, then register both services again.
  ///
  /// Services are deregistered before anything is placed, so binaries are
  /// never replaced under a running process.
  pub async fn provision(&self) -> Result<(), ProvisionError> {
    info!(root = %self.root.display(), "updating agent");

    self.deprovision(services::AGENT, AGENT_STOP_TIMEOUT).await?;
    self.deprovision(services::MONIT, MONIT_STOP_TIMEOUT).await?;

    info!("placing binaries");
    self.place_binaries()?;

    info!("placing configuration files");
    self.place_conf_files()?;

    info!("registering monit service");
    self.register(services::MONIT, MONIT_STOP_TIMEOUT).await?;

    info!("registering agent service");
    self.register(services::AGENT, AGENT_STOP_TIMEOUT).await?;

    Ok(())
  }

  /// Write infrastructure settings for `instance` and wait until the agent
  /// answers a ping. Returns the connected client.
  pub async fn configure(&self, instance: &Instance) -> Result<F::Client, ProvisionError> {
    info!(instance = %instance.slug(), "configuring agent");
    self.place_infrastructure_settings(instance)?;

    let client = self.clients.build(&self.config.mbus).map_err(ProvisionError::AgentClient)?;

    let reply = self
      .handshake
      .run(|attempt| {
        debug!(attempt, "pinging agent");
        client.ping()
      })
      .await
      .map_err(|exhausted| {
        warn!(attempts = exhausted.attempts, "agent did not respond");
        ProvisionError::HandshakeTimeout {
          attempts: exhausted.attempts,
          source: exhausted.last,
        }
      })?;

    info!(reply = %reply, "agent is responding");
    Ok(client)
  }

  async fn deprovision(&self, service: &str, stop_timeout: Duration) -> Result<(), ProvisionError> {
    self
      .supervisor
      .deprovision(service, stop_timeout)
      .await
      .map_err(|source| ProvisionError::Deprovision {
        service: service.to_string(),
        source,
      })
  }

  async fn register(&self, service: &str, stop_timeout: Duration) -> Result<(), ProvisionError> {
    self
      .supervisor
      .provision(service, stop_timeout)
      .await
      .map_err(|source| ProvisionError::Provision {
        service: service.to_string(),
        source,
      })
  }

  fn path(&self, rel: &str) -> PathBuf {
    self.root.join(rel)
  }

  fn place_asset(&self, name: &str, dst: &Path) -> Result<(), ProvisionError> {
    self.assets.place(name, dst).map_err(|source| ProvisionError::PlaceAsset {
      name: name.to_string(),
      source,
    })
  }

  fn place_binaries(&self) -> Result<(), ProvisionError> {
    let bin_dir = self.path(machine::BIN_DIR);
    fs::create_dir_all(&bin_dir).map_err(|source| write_err(&bin_dir, source))?;

    for (asset, bin) in BINARIES {
      let dst = bin_dir.join(bin);
      self.place_asset(asset, &dst)?;
      set_executable(&dst).map_err(|source| write_err(&dst, source))?;
    }
    Ok(())
  }

  fn place_conf_files(&self) -> Result<(), ProvisionError> {
    self.set_up_data_dir()?;

    let bosh_dir = self.path(machine::BOSH_DIR);
    for (asset, file) in CERTS {
      self.place_asset(asset, &bosh_dir.join(file))?;
    }

    write_file(&self.path(machine::PLATFORM_FILE), self.config.platform.as_bytes())?;

    let configuration = serde_json::to_vec(&self.config.configuration).map_err(|source| ProvisionError::Serialize {
      what: "agent configuration",
      source,
    })?;
    write_file(&self.path(machine::AGENT_CONFIG_FILE), &configuration)?;

    Ok(())
  }

  /// `/var/vcap/sys -> data/sys` and a world-writable `/var/vcap/data`.
  fn set_up_data_dir(&self) -> Result<(), ProvisionError> {
    let link = self.path(machine::SYS_LINK);
    if let Some(parent) = link.parent() {
      fs::create_dir_all(parent).map_err(|source| write_err(parent, source))?;
    }
    if fs::symlink_metadata(&link).is_ok_and(|m| m.file_type().is_symlink()) {
      fs::remove_file(&link).map_err(|source| write_err(&link, source))?;
    }
    if fs::symlink_metadata(&link).is_err() {
      symlink(Path::new(machine::SYS_LINK_TARGET), &link).map_err(|source| write_err(&link, source))?;
    }

    let data_dir = self.path(machine::DATA_DIR);
    fs::create_dir_all(&data_dir).map_err(|source| write_err(&data_dir, source))?;
    set_mode(&data_dir, 0o777).map_err(|source| write_err(&data_dir, source))?;
    Ok(())
  }

  fn place_infrastructure_settings(&self, instance: &Instance) -> Result<(), ProvisionError> {
    let settings = InfrastructureSettings::for_instance(instance, &self.blobstore, &self.config.mbus);
    let json = serde_json::to_vec(&settings).map_err(|source| ProvisionError::Serialize {
      what: "infrastructure settings",
      source,
    })?;
    write_file(&self.path(machine::INFRASTRUCTURE_SETTINGS_FILE), &json)
  }
}

fn write_err(path: &Path, source: std::io::Error) -> ProvisionError {
  ProvisionError::Write {
    path: path.to_path_buf(),
    source,
  }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ProvisionError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|source| write_err(parent, source))?;
  }
  fs::write(path, contents).map_err(|source| write_err(path, source))?;
  debug!(path = %path.display(), "wrote file");
  Ok(())
}
