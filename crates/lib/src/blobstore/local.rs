use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use super::{BlobId, Blobstore, BlobstoreError};
use crate::util::hash::sha256_file;

/// Blobstore backed by a local directory.
///
/// Blobs are named by the SHA-256 of their content, so putting the same file
/// twice yields the same id and stores one copy.
#[derive(Debug, Clone)]
pub struct LocalBlobstore {
  dir: PathBuf,
}

impl LocalBlobstore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn blob_path(&self, id: &BlobId) -> Result<PathBuf, BlobstoreError> {
    let valid = !id.0.is_empty() && id.0.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
      return Err(BlobstoreError::InvalidId(id.0.clone()));
    }
    Ok(self.dir.join(&id.0))
  }
}

impl Blobstore for LocalBlobstore {
  async fn put(&self, path: &Path) -> Result<BlobId, BlobstoreError> {
    let read_err = |source| BlobstoreError::Read {
      path: path.to_path_buf(),
      source,
    };

    let source = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || sha256_file(&source))
      .await
      .map_err(|e| read_err(io::Error::other(e)))?
      .map_err(read_err)?;
    let id = BlobId(digest);
    let dest = self.blob_path(&id)?;

    if fs::try_exists(&dest).await.unwrap_or(false) {
      debug!(blob = %id, "blob already stored");
      return Ok(id);
    }

    let write_err = |source| BlobstoreError::Write { id: id.clone(), source };

    fs::create_dir_all(&self.dir).await.map_err(write_err)?;
    let temp = self.dir.join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4()));
    let size = fs::copy(path, &temp).await.map_err(write_err)?;
    if let Err(e) = fs::rename(&temp, &dest).await {
      let _ = fs::remove_file(&temp).await;
      return Err(write_err(e));
    }

    info!(blob = %id, size, "stored blob");
    Ok(id)
  }

  async fn get(&self, id: &BlobId) -> Result<PathBuf, BlobstoreError> {
    let path = self.blob_path(id)?;
    match fs::metadata(&path).await {
      Ok(_) => Ok(path),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobstoreError::NotFound(id.clone())),
      Err(source) => Err(BlobstoreError::Read { path, source }),
    }
  }
}
