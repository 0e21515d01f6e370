//! Advisory locking of the store directory.
//!
//! `compile` publishes records and holds the lock alone; `spec` only reads
//! records, so any number of spec runs may share it. The holder of the
//! exclusive lock leaves a note in the lock file naming the deployment it is
//! compiling so a blocked run can say who it is waiting on.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::store::StorePaths;

/// A converge run that needs the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum StoreOperation {
  /// Compiling packages and rendering archives for a deployment.
  Compile { deployment: String },
  /// Assembling the apply spec of one instance from compiled records.
  Spec { deployment: String, instance: String },
}

impl StoreOperation {
  fn exclusive(&self) -> bool {
    matches!(self, StoreOperation::Compile { .. })
  }
}

impl fmt::Display for StoreOperation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoreOperation::Compile { deployment } => write!(f, "compile of deployment '{deployment}'"),
      StoreOperation::Spec { deployment, instance } => {
        write!(f, "apply spec of {instance} in deployment '{deployment}'")
      }
    }
  }
}

/// Written into the lock file by the exclusive holder.
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
  pid: u32,
  started_at_unix: u64,
  #[serde(flatten)]
  operation: StoreOperation,
}

impl LockHolder {
  fn started_at(&self) -> String {
    let at = UNIX_EPOCH + Duration::from_secs(self.started_at_unix);
    humantime::format_rfc3339_seconds(at).to_string()
  }
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "Cannot start {wanted}: store is busy with the {held} (PID {pid}, started {started_at})\n\
     If no converge process is running, remove the lock file:\n  {lock_path}"
  )]
  Compiling {
    wanted: StoreOperation,
    held: StoreOperation,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "Cannot start {wanted}: another converge spec run is reading the store; retry once it finishes\n\
     If no converge process is running, remove the lock file:\n  {lock_path}"
  )]
  Reading { wanted: StoreOperation, lock_path: PathBuf },

  #[error("Failed to create store directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("Failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("Failed to record lock holder: {0}")]
  WriteHolder(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held for the duration of a store operation; released on drop.
pub struct StoreLock {
  file: File,
  operation: StoreOperation,
}

impl StoreLock {
  pub fn acquire(paths: &StorePaths, operation: StoreOperation) -> Result<Self, StoreLockError> {
    let lock_path = paths.lock_file();

    std::fs::create_dir_all(paths.root()).map_err(StoreLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, operation.exclusive()) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention(operation, &lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    if operation.exclusive() {
      let holder = LockHolder {
        pid: std::process::id(),
        started_at_unix: SystemTime::now()
          .duration_since(UNIX_EPOCH)
          .unwrap_or_default()
          .as_secs(),
        operation: operation.clone(),
      };
      write_holder(&file, &holder).map_err(StoreLockError::WriteHolder)?;
    }

    debug!(operation = %operation, lock = %lock_path.display(), "store locked");
    Ok(StoreLock { file, operation })
  }
}

impl Drop for StoreLock {
  fn drop(&mut self) {
    // Clear the note so later spec runs are not reported as a stale compile.
    if self.operation.exclusive() {
      let _ = self.file.set_len(0);
    }
  }
}

fn write_holder(file: &File, holder: &LockHolder) -> io::Result<()> {
  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  writer.seek(SeekFrom::Start(0))?;
  serde_json::to_writer_pretty(&mut writer, holder).map_err(io::Error::other)?;
  writer.flush()
}

fn read_holder(lock_path: &Path) -> Option<LockHolder> {
  let mut contents = String::new();
  File::open(lock_path).ok()?.read_to_string(&mut contents).ok()?;
  serde_json::from_str(&contents).ok()
}

fn contention(wanted: StoreOperation, lock_path: &Path) -> StoreLockError {
  match read_holder(lock_path) {
    Some(holder) => StoreLockError::Compiling {
      wanted,
      started_at: holder.started_at(),
      pid: holder.pid,
      held: holder.operation,
      lock_path: lock_path.to_path_buf(),
    },
    None => StoreLockError::Reading {
      wanted,
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock(file: &File, exclusive: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if exclusive {
    FlockOperation::NonBlockingLockExclusive
  } else {
    FlockOperation::NonBlockingLockShared
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, exclusive: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
  if exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }

  // SAFETY: a zeroed OVERLAPPED is valid and the handle is owned by `file`.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
