//! Package compilation and compiled-package lookup.
//!
//! Compiling is a separate, longer-running step; lookups never compile and
//! fail with [`PackagesCompilerError::NotCompiled`] instead.

pub mod builder;
pub mod compiler;

use std::future::Future;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::blobstore::{BlobId, BlobstoreError};
use crate::release::{Package, Release};
use crate::store::RecordError;
use crate::util::hash::HashError;

pub use builder::{BuildError, BuildRequest, CmdPackageBuilder, PackageBuilder};
pub use compiler::ConcretePackagesCompiler;

/// Published result of compiling a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPackageRecord {
  pub sha1: String,
  pub blob_id: BlobId,
}

#[derive(Debug, Error)]
pub enum PackagesCompilerError {
  #[error("package {name}/{version} has not been compiled")]
  NotCompiled { name: String, version: String },

  #[error("package {package} depends on unknown package {dependency}")]
  UnknownDependency { package: String, dependency: String },

  #[error("dependency cycle involving package {package}")]
  Cycle { package: String },

  #[error("building package {package}: {source}")]
  Build {
    package: String,
    #[source]
    source: BuildError,
  },

  #[error("archiving package {package}: {source}")]
  Archive {
    package: String,
    #[source]
    source: ArchiveError,
  },

  #[error("uploading package {package}: {source}")]
  Blobstore {
    package: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("failed to prepare {path}: {source}")]
  Scratch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to digest {path}: {source}")]
  Digest {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("record error: {0}")]
  Record(#[from] RecordError),

  #[error("failed to compute fingerprint: {0}")]
  Fingerprint(#[from] HashError),

  #[error("compile task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub trait PackagesCompiler: Send + Sync {
  /// Compile every package of `release` not compiled yet, dependencies first.
  fn compile(&self, release: &Release) -> impl Future<Output = Result<(), PackagesCompilerError>> + Send;

  fn find_compiled_package(&self, package: &Package) -> Result<CompiledPackageRecord, PackagesCompilerError>;
}
