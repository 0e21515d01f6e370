//! Supervised services on the target machine.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SupervisorError {
  #[error("service {service}: asset {path} not found")]
  AssetMissing { service: String, path: PathBuf },

  #[error("service {service}: I/O error at {path}: {source}")]
  Io {
    service: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("service {service}: `{command}` failed with exit code {code:?}: {stderr}")]
  Command {
    service: String,
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

pub trait ServiceSupervisor: Send + Sync {
  /// Register `name` so the supervisor keeps it running.
  fn provision(&self, name: &str, stop_timeout: Duration)
  -> impl Future<Output = Result<(), SupervisorError>> + Send;

  /// Stop and unregister `name`. A service that was never provisioned is
  /// not an error.
  fn deprovision(&self, name: &str, stop_timeout: Duration)
  -> impl Future<Output = Result<(), SupervisorError>> + Send;
}

/// runit paths and the `sv` binary used to control services.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunitConfig {
  #[serde(default = "default_sv_bin")]
  pub sv_bin: String,
  /// Directory scanned by `runsvdir`, relative to the target root.
  #[serde(default = "default_service_dir")]
  pub service_dir: PathBuf,
  /// Where service definitions live, relative to the target root.
  #[serde(default = "default_sv_dir")]
  pub sv_dir: PathBuf,
}

fn default_sv_bin() -> String {
  "sv".to_string()
}

fn default_service_dir() -> PathBuf {
  PathBuf::from("etc/service")
}

fn default_sv_dir() -> PathBuf {
  PathBuf::from("etc/sv")
}

impl Default for RunitConfig {
  fn default() -> Self {
    Self {
      sv_bin: default_sv_bin(),
      service_dir: default_service_dir(),
      sv_dir: default_sv_dir(),
    }
  }
}

/// Supervises services with runit.
///
/// A service named `agent` is defined by `<assets>/agent/runit/run` (plus an
/// optional `log/run`), copied to `<sv_dir>/agent/` and enabled by linking
/// `<service_dir>/agent` to it.
#[derive(Debug, Clone)]
pub struct RunitSupervisor {
  root: PathBuf,
  assets_dir: PathBuf,
  config: RunitConfig,
}

impl RunitSupervisor {
  pub fn new(root: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>, config: RunitConfig) -> Self {
    Self {
      root: root.into(),
      assets_dir: assets_dir.into(),
      config,
    }
  }

  fn definition_dir(&self, name: &str) -> PathBuf {
    self.root.join(&self.config.sv_dir).join(name)
  }

  fn service_link(&self, name: &str) -> PathBuf {
    self.root.join(&self.config.service_dir).join(name)
  }

  async fn sv(&self, name: &str, action: &str, timeout: Duration, target: &Path) -> Result<(), SupervisorError> {
    let secs = timeout.as_secs().max(1).to_string();
    let command = format!("{} -w {} {} {}", self.config.sv_bin, secs, action, target.display());
    debug!(service = %name, command = %command, "running sv");

    let output = Command::new(&self.config.sv_bin)
      .args(["-w", secs.as_str(), action])
      .arg(target)
      .output()
      .await
      .map_err(|source| SupervisorError::Io {
        service: name.to_string(),
        path: PathBuf::from(&self.config.sv_bin),
        source,
      })?;

    if !output.status.success() {
      return Err(SupervisorError::Command {
        service: name.to_string(),
        command,
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(())
  }

  fn install_script(&self, name: &str, asset: &str, dst: &Path) -> Result<bool, SupervisorError> {
    let src = self.assets_dir.join(name).join(asset);
    if !src.is_file() {
      return Ok(false);
    }

    let io_err = |source| SupervisorError::Io {
      service: name.to_string(),
      path: dst.to_path_buf(),
      source,
    };
    if let Some(parent) = dst.parent() {
      fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::copy(&src, dst).map_err(io_err)?;
    set_executable(dst).map_err(io_err)?;
    Ok(true)
  }
}

impl ServiceSupervisor for RunitSupervisor {
  async fn provision(&self, name: &str, stop_timeout: Duration) -> Result<(), SupervisorError> {
    let definition = self.definition_dir(name);

    if !self.install_script(name, "runit/run", &definition.join("run"))? {
      return Err(SupervisorError::AssetMissing {
        service: name.to_string(),
        path: self.assets_dir.join(name).join("runit/run"),
      });
    }
    self.install_script(name, "runit/log/run", &definition.join("log/run"))?;

    let link = self.service_link(name);
    let link_err = |source| SupervisorError::Io {
      service: name.to_string(),
      path: link.clone(),
      source,
    };
    if let Some(parent) = link.parent() {
      fs::create_dir_all(parent).map_err(link_err)?;
    }
    remove_link(&link).map_err(link_err)?;
    symlink(&definition, &link).map_err(link_err)?;

    // A fresh link is picked up on the next runsvdir scan; an already
    // supervised service has to be told to come back up.
    if definition.join("supervise").is_dir() {
      self.sv(name, "start", stop_timeout, &link).await?;
    }

    info!(service = %name, "provisioned runit service");
    Ok(())
  }

  async fn deprovision(&self, name: &str, stop_timeout: Duration) -> Result<(), SupervisorError> {
    let link = self.service_link(name);

    if fs::symlink_metadata(&link).is_err() {
      debug!(service = %name, "service not provisioned");
      return Ok(());
    }

    self.sv(name, "stop", stop_timeout, &link).await?;
    remove_link(&link).map_err(|source| SupervisorError::Io {
      service: name.to_string(),
      path: link.clone(),
      source,
    })?;

    info!(service = %name, "deprovisioned runit service");
    Ok(())
  }
}

fn remove_link(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
pub(crate) fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
  Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks require a unix target"))
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
  Ok(())
}

pub(crate) fn set_executable(path: &Path) -> io::Result<()> {
  set_mode(path, 0o755)
}
