//! Hashing utilities for fingerprints and content digests.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character SHA-256 used as a record fingerprint
//! - `Hashable`: Fingerprinting of any serializable identity
//! - `sha1_file()`: SHA1 digests recorded for archives and packages
//! - `sha256_file()`: content address for blobs

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A content-addressed hash identifying a unique record.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized struct.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string, e.g., `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> io::Result<String> {
  let mut hasher = D::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = reader.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// SHA1 of a file's contents as lowercase hex.
pub fn sha1_file(path: &Path) -> io::Result<String> {
  digest_reader::<Sha1>(fs::File::open(path)?)
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
  digest_reader::<Sha256>(fs::File::open(path)?)
}
