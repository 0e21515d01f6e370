//! Shared test helpers for CLI integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture directory.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

fn copy_tree(src: &Path, dst: &Path) {
  fs::create_dir_all(dst).unwrap();
  for entry in fs::read_dir(src).unwrap() {
    let entry = entry.unwrap();
    let target = dst.join(entry.file_name());
    if entry.file_type().unwrap().is_dir() {
      copy_tree(&entry.path(), &target);
    } else {
      fs::copy(entry.path(), &target).unwrap();
    }
  }
}

/// Isolated test environment.
///
/// Each test gets its own copy of a fixture plus a private store and config.
pub struct TestEnv {
  pub temp: TempDir,
  pub deployment_path: PathBuf,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Copy the fixture directory `name` (which holds `deployment.yml`) into a
  /// temporary directory.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("workspace");
    copy_tree(&fixture_path(name), &workspace);

    let config_path = temp.path().join("config.yml");
    fs::write(&config_path, "{}\n").unwrap();

    Self {
      deployment_path: workspace.join("deployment.yml"),
      config_path,
      temp,
    }
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Number of published records of one kind (`packages`, `rendered`, `jobs`).
  pub fn record_count(&self, kind: &str) -> usize {
    match fs::read_dir(self.store_path().join("records").join(kind)) {
      Ok(entries) => entries.count(),
      Err(_) => 0,
    }
  }

  /// Get a pre-configured Command for the converge binary.
  ///
  /// Sets `CONVERGE_STORE` and `CONVERGE_CONFIG` so nothing outside the temp
  /// directory is read or written.
  pub fn converge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("converge");
    cmd.env("CONVERGE_STORE", self.store_path());
    cmd.env("CONVERGE_CONFIG", &self.config_path);
    cmd
  }

  pub fn compile(&self) -> assert_cmd::assert::Assert {
    self.converge_cmd().arg("compile").arg(&self.deployment_path).assert()
  }
}
