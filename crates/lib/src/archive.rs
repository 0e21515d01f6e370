//! Gzip-compressed tar archives of directory trees.
//!
//! Archives are deterministic: entries are added in sorted order with
//! normalized headers, so the same tree always produces the same bytes and
//! therefore the same digest.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType, Header};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to create archive {path}: {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to add {path} to archive: {source}")]
  Append {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot archive {path}: not a file, directory or symlink")]
  UnsupportedFileType { path: PathBuf },

  #[error("failed to extract {path}: {source}")]
  Extract {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Compress the contents of `dir` into a `.tgz` at `dest`.
///
/// Paths inside the archive are relative to `dir` and use `/` separators.
pub fn compress_dir(dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let file = File::create(dest).map_err(|source| ArchiveError::Create {
    path: dest.to_path_buf(),
    source,
  })?;
  let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
  let mut builder = Builder::new(encoder);

  for entry in WalkDir::new(dir).sort_by_file_name().min_depth(1) {
    let entry = entry.map_err(|e| ArchiveError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    let path = entry.path();
    let rel = path.strip_prefix(dir).unwrap_or(path);
    let name = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");

    let append_err = |source| ArchiveError::Append {
      path: path.to_path_buf(),
      source,
    };

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    if entry.file_type().is_dir() {
      header.set_entry_type(EntryType::Directory);
      header.set_mode(0o755);
      header.set_size(0);
      header.set_cksum();
      builder
        .append_data(&mut header, format!("{}/", name), io::empty())
        .map_err(append_err)?;
    } else if entry.file_type().is_file() {
      let metadata = entry.metadata().map_err(|e| ArchiveError::Walk {
        path: path.to_path_buf(),
        message: e.to_string(),
      })?;
      header.set_entry_type(EntryType::Regular);
      header.set_mode(if is_executable(&metadata) { 0o755 } else { 0o644 });
      header.set_size(metadata.len());
      header.set_cksum();
      let file = File::open(path).map_err(append_err)?;
      builder
        .append_data(&mut header, &name, BufReader::new(file))
        .map_err(append_err)?;
    } else if entry.file_type().is_symlink() {
      let target = fs::read_link(path).map_err(append_err)?;
      header.set_entry_type(EntryType::Symlink);
      header.set_mode(0o777);
      header.set_size(0);
      builder.append_link(&mut header, &name, &target).map_err(append_err)?;
    } else {
      return Err(ArchiveError::UnsupportedFileType {
        path: path.to_path_buf(),
      });
    }
  }

  let encoder = builder.into_inner().map_err(|source| ArchiveError::Create {
    path: dest.to_path_buf(),
    source,
  })?;
  let mut writer = encoder.finish().map_err(|source| ArchiveError::Create {
    path: dest.to_path_buf(),
    source,
  })?;
  io::Write::flush(&mut writer).map_err(|source| ArchiveError::Create {
    path: dest.to_path_buf(),
    source,
  })?;

  debug!(dir = %dir.display(), archive = %dest.display(), "compressed directory");
  Ok(())
}

/// Extract a `.tgz` into `dest`, creating it if needed.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let extract_err = |source| ArchiveError::Extract {
    path: archive_path.to_path_buf(),
    source,
  };

  fs::create_dir_all(dest).map_err(extract_err)?;
  let file = File::open(archive_path).map_err(extract_err)?;
  let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
  archive.unpack(dest).map_err(extract_err)?;
  Ok(())
}

/// List entry paths of a `.tgz` in archive order. Directories end with `/`.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>, ArchiveError> {
  let extract_err = |source| ArchiveError::Extract {
    path: archive_path.to_path_buf(),
    source,
  };

  let file = File::open(archive_path).map_err(extract_err)?;
  let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
  let mut names = Vec::new();

  for entry in archive.entries().map_err(extract_err)? {
    let entry = entry.map_err(extract_err)?;
    let mut name = entry.path().map_err(extract_err)?.to_string_lossy().to_string();
    if entry.header().entry_type().is_dir() && !name.ends_with('/') {
      name.push('/');
    }
    names.push(name);
  }

  Ok(names)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
  false
}
