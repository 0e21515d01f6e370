//! Package build sandbox.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::archive::{self, ArchiveError};
use crate::release::Package;

const PACKAGING_SCRIPT: &str = "packaging";

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("packaging script not found: {0}")]
  ScriptMissing(PathBuf),

  #[error("packaging script failed with exit code {code:?}: {stderr}")]
  Failed { code: Option<i32>, stderr: String },

  #[error("unpacking dependency {name}: {source}")]
  Dependency {
    name: String,
    #[source]
    source: ArchiveError,
  },

  #[error("build task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// Inputs for one package build.
#[derive(Debug)]
pub struct BuildRequest<'a> {
  pub package: &'a Package,
  /// Compiled archives of direct dependencies, by package name.
  pub dependencies: Vec<(String, PathBuf)>,
  /// Scratch directory owned by this build.
  pub work_dir: &'a Path,
}

pub trait PackageBuilder: Send + Sync {
  /// Build a package and return the directory holding its installed files.
  fn build(&self, request: BuildRequest<'_>) -> impl Future<Output = Result<PathBuf, BuildError>> + Send;
}

/// Runs a package's `packaging` script with `/bin/sh` in a cleared
/// environment.
///
/// The script runs from a copy of the package source and sees:
/// - `BOSH_COMPILE_TARGET`: the source copy
/// - `BOSH_INSTALL_TARGET`: where to install
/// - `BOSH_PACKAGES_DIR`: compiled dependencies, one directory per package
/// - `BOSH_PACKAGE_NAME`, `BOSH_PACKAGE_VERSION`
/// - `PATH` from configuration
#[derive(Debug, Clone)]
pub struct CmdPackageBuilder {
  path_env: String,
}

impl CmdPackageBuilder {
  pub fn new(path_env: impl Into<String>) -> Self {
    Self {
      path_env: path_env.into(),
    }
  }
}

impl PackageBuilder for CmdPackageBuilder {
  async fn build(&self, request: BuildRequest<'_>) -> Result<PathBuf, BuildError> {
    let package = request.package;
    let compile_dir = request.work_dir.join("compile").join(&package.name);
    let install_dir = request.work_dir.join("install").join(&package.name);
    let packages_dir = request.work_dir.join("packages");
    let tmp_dir = request.work_dir.join("tmp");

    info!(package = %package.name, version = %package.version, "building package");

    {
      let source = package.source_path.clone();
      let compile_dir = compile_dir.clone();
      let install_dir = install_dir.clone();
      let packages_dir = packages_dir.clone();
      let tmp_dir = tmp_dir.clone();
      let dependencies = request.dependencies;
      tokio::task::spawn_blocking(move || {
        for dir in [&install_dir, &packages_dir, &tmp_dir] {
          fs::create_dir_all(dir).map_err(|source| BuildError::Io {
            path: dir.clone(),
            source,
          })?;
        }
        copy_tree(&source, &compile_dir)?;
        for (name, archive_path) in dependencies {
          archive::extract(&archive_path, &packages_dir.join(&name))
            .map_err(|source| BuildError::Dependency { name, source })?;
        }
        Ok::<_, BuildError>(())
      })
      .await??;
    }

    let script = compile_dir.join(PACKAGING_SCRIPT);
    if !script.is_file() {
      return Err(BuildError::ScriptMissing(script));
    }

    let mut command = Command::new("/bin/sh");
    command
      .arg(PACKAGING_SCRIPT)
      .current_dir(&compile_dir)
      .env_clear()
      .env("PATH", &self.path_env)
      .env("HOME", &tmp_dir)
      .env("TMPDIR", &tmp_dir)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("BOSH_COMPILE_TARGET", &compile_dir)
      .env("BOSH_INSTALL_TARGET", &install_dir)
      .env("BOSH_PACKAGES_DIR", &packages_dir)
      .env("BOSH_PACKAGE_NAME", &package.name)
      .env("BOSH_PACKAGE_VERSION", &package.version);

    debug!(package = %package.name, compile_dir = %compile_dir.display(), "running packaging script");

    let output = command.output().await.map_err(|source| BuildError::Io {
      path: script.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
      debug!(package = %package.name, stdout = %stdout, "packaging stdout");
    }

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(BuildError::Failed {
        code: output.status.code(),
        stderr,
      });
    }

    info!(package = %package.name, "package built");
    Ok(install_dir)
  }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), BuildError> {
  for entry in WalkDir::new(src) {
    let entry = entry.map_err(|e| BuildError::Io {
      path: src.to_path_buf(),
      source: e.into(),
    })?;
    let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
    let target = dst.join(rel);
    let io_err = |source| BuildError::Io {
      path: target.clone(),
      source,
    };

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_err)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
      }
      fs::copy(entry.path(), &target).map_err(io_err)?;
    }
  }
  Ok(())
}
