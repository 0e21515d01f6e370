//! Blobstore collaborators.
//!
//! Compiled packages and rendered archives are uploaded to a blobstore and
//! referenced from records by their [`BlobId`]. Only the local provider is
//! implemented here; `dav` exists as configuration handed to the agent.

mod local;

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalBlobstore;

/// Identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl std::fmt::Display for BlobId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum BlobstoreError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to store blob {id}: {source}")]
  Write {
    id: BlobId,
    #[source]
    source: io::Error,
  },

  #[error("blob not found: {0}")]
  NotFound(BlobId),

  #[error("invalid blob id: {0}")]
  InvalidId(String),
}

pub trait Blobstore: Send + Sync {
  /// Store the file at `path` and return its identifier.
  fn put(&self, path: &Path) -> impl Future<Output = Result<BlobId, BlobstoreError>> + Send;

  /// Resolve a blob to a readable local path.
  fn get(&self, id: &BlobId) -> impl Future<Output = Result<PathBuf, BlobstoreError>> + Send;
}

/// Blobstore settings handed to the agent.
///
/// Serializes as `{"provider": "...", "options": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "options", rename_all = "lowercase")]
pub enum BlobstoreConfig {
  Local {
    blobstore_path: PathBuf,
  },
  Dav {
    endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tls: BTreeMap<String, serde_json::Value>,
  },
}

impl BlobstoreConfig {
  pub fn provider(&self) -> &'static str {
    match self {
      BlobstoreConfig::Local { .. } => "local",
      BlobstoreConfig::Dav { .. } => "dav",
    }
  }

  /// Directory backing a local blobstore, if this is one.
  pub fn local_path(&self) -> Option<&Path> {
    match self {
      BlobstoreConfig::Local { blobstore_path } => Some(blobstore_path),
      BlobstoreConfig::Dav { .. } => None,
    }
  }
}
