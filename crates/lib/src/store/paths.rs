use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::default_store_dir;

use super::records::RecordKind;

const BLOBS_DIR: &str = "blobs";
const RECORDS_DIR: &str = "records";
const TMP_DIR: &str = "tmp";
const LOCK_FILENAME: &str = ".lock";

/// Resolved locations inside one store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
  root: PathBuf,
}

impl StorePaths {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store at `CONVERGE_STORE`, or the default data directory location.
  pub fn current() -> Self {
    Self::new(default_store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn blobs(&self) -> PathBuf {
    self.root.join(BLOBS_DIR)
  }

  pub fn records(&self, kind: RecordKind) -> PathBuf {
    self.root.join(RECORDS_DIR).join(kind.dir_name())
  }

  pub fn tmp(&self) -> PathBuf {
    self.root.join(TMP_DIR)
  }

  pub fn lock_file(&self) -> PathBuf {
    self.root.join(LOCK_FILENAME)
  }

  /// Create every directory of the layout.
  pub fn ensure(&self) -> io::Result<()> {
    fs::create_dir_all(self.blobs())?;
    fs::create_dir_all(self.tmp())?;
    for kind in RecordKind::ALL {
      fs::create_dir_all(self.records(kind))?;
    }
    Ok(())
  }
}
