//! Host directory resolution for the local store and config.

use std::path::PathBuf;

use crate::consts::{APP_NAME, CONFIG_ENV, STORE_ENV};

/// Returns the user's home directory, falling back to `/` when `HOME` is unset.
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Store directory: `CONVERGE_STORE` if set, otherwise `<data_dir>/store`.
pub fn default_store_dir() -> PathBuf {
  if let Ok(path) = std::env::var(STORE_ENV) {
    return PathBuf::from(path);
  }
  data_dir().join("store")
}

/// Config file: `CONVERGE_CONFIG` if set, otherwise `<config_dir>/config.yml`.
pub fn default_config_path() -> PathBuf {
  if let Ok(path) = std::env::var(CONFIG_ENV) {
    return PathBuf::from(path);
  }
  config_dir().join("config.yml")
}
