//! Immutable JSON records keyed by fingerprint.
//!
//! A record is published at most once. Publishing writes a temp file next to
//! the destination and links it into place without replacing an existing
//! file, so readers observe either a complete record or nothing.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::util::hash::ObjectHash;

use super::paths::StorePaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
  /// `CompiledPackageRecord` keyed by package fingerprint.
  CompiledPackage,
  /// `RenderedArchiveRecord` keyed by job+instance fingerprint.
  RenderedArchive,
  /// Package names a release job depends on.
  JobPackages,
}

impl RecordKind {
  pub const ALL: [RecordKind; 3] = [
    RecordKind::CompiledPackage,
    RecordKind::RenderedArchive,
    RecordKind::JobPackages,
  ];

  pub fn dir_name(self) -> &'static str {
    match self {
      RecordKind::CompiledPackage => "packages",
      RecordKind::RenderedArchive => "rendered",
      RecordKind::JobPackages => "jobs",
    }
  }
}

#[derive(Debug, Error)]
pub enum RecordError {
  #[error("failed to read record {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse record {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write record {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct RecordStore {
  paths: StorePaths,
}

impl RecordStore {
  pub fn new(paths: StorePaths) -> Self {
    Self { paths }
  }

  pub fn paths(&self) -> &StorePaths {
    &self.paths
  }

  pub fn record_path(&self, kind: RecordKind, key: &ObjectHash) -> PathBuf {
    self.paths.records(kind).join(format!("{}.json", key))
  }

  /// Load a record. Returns `None` if nothing was published under `key`.
  pub fn load<T: DeserializeOwned>(&self, kind: RecordKind, key: &ObjectHash) -> Result<Option<T>, RecordError> {
    let path = self.record_path(kind, key);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(RecordError::Read { path, source }),
    };

    serde_json::from_str(&content)
      .map(Some)
      .map_err(|source| RecordError::Parse { path, source })
  }

  pub fn exists(&self, kind: RecordKind, key: &ObjectHash) -> bool {
    self.record_path(kind, key).is_file()
  }

  /// Publish a record under `key`.
  ///
  /// Returns `false` if a record already existed; the existing record is left
  /// untouched.
  pub fn publish<T: Serialize>(&self, kind: RecordKind, key: &ObjectHash, record: &T) -> Result<bool, RecordError> {
    let path = self.record_path(kind, key);
    let dir = self.paths.records(kind);
    let write_err = |source| RecordError::Write {
      path: path.clone(),
      source,
    };

    let content = serde_json::to_vec_pretty(record).map_err(RecordError::Serialize)?;

    fs::create_dir_all(&dir).map_err(write_err)?;
    let mut temp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    temp.write_all(&content).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;

    match temp.persist_noclobber(&path) {
      Ok(_) => {
        debug!(kind = kind.dir_name(), key = %key, "published record");
        Ok(true)
      }
      Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
        debug!(kind = kind.dir_name(), key = %key, "record already published");
        Ok(false)
      }
      Err(e) => Err(write_err(e.error)),
    }
  }
}
