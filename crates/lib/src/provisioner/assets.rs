//! Files shipped alongside the provisioner: binaries, certificates, service
//! scripts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("asset {name} not found at {path}")]
  Missing { name: String, path: PathBuf },

  #[error("failed to place asset {name} at {path}: {source}")]
  Io {
    name: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub trait AssetManager: Send + Sync {
  /// Copy asset `name` to `dst`, creating parent directories.
  fn place(&self, name: &str, dst: &Path) -> Result<(), AssetError>;
}

/// Assets read from a directory, named by their relative path
/// (`agent/bosh-agent`, `monit/monit`, ...).
#[derive(Debug, Clone)]
pub struct DirAssetManager {
  dir: PathBuf,
}

impl DirAssetManager {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn path_of(&self, name: &str) -> PathBuf {
    self.dir.join(name)
  }
}

impl AssetManager for DirAssetManager {
  fn place(&self, name: &str, dst: &Path) -> Result<(), AssetError> {
    let src = self.path_of(name);
    if !src.is_file() {
      return Err(AssetError::Missing {
        name: name.to_string(),
        path: src,
      });
    }

    let io_err = |source| AssetError::Io {
      name: name.to_string(),
      path: dst.to_path_buf(),
      source,
    };

    if let Some(parent) = dst.parent() {
      fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::copy(&src, dst).map_err(io_err)?;

    debug!(asset = %name, dst = %dst.display(), "placed asset");
    Ok(())
  }
}
