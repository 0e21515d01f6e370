//! Templates compiler.
//!
//! Precompiles a release's job templates, compiles rendered-templates
//! archives per job + instance, and answers lookups against the published
//! records.
//!
//! # Submodules
//!
//! - [`rendered_archive`] - renders and compresses one job + instance
//! - [`compiler`] - store-backed [`TemplatesCompiler`] implementation

pub mod compiler;
pub mod rendered_archive;

use std::future::Future;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blobstore::{BlobId, BlobstoreError};
use crate::deployment::{Instance, Job, Template};
use crate::release::{Package, Release};
use crate::store::RecordError;
use crate::template::RenderError;
use crate::util::hash::HashError;

pub use compiler::ConcreteTemplatesCompiler;
pub use rendered_archive::{RenderedArchiveError, RenderedArchivesCompiler};

/// Published result of compiling a job + instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArchiveRecord {
  pub sha1: String,
  pub blob_id: BlobId,
}

#[derive(Debug, Error)]
pub enum TemplatesCompilerError {
  #[error("template {dst} of job {job} is invalid: {source}")]
  Render {
    job: String,
    dst: String,
    #[source]
    source: RenderError,
  },

  #[error("compiling rendered archive for job {job}: {source}")]
  Archive {
    job: String,
    #[source]
    source: RenderedArchiveError,
  },

  #[error("uploading rendered archive for job {job}: {source}")]
  Blobstore {
    job: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("record error: {0}")]
  Record(#[from] RecordError),

  #[error("failed to digest {path}: {source}")]
  Digest {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to compute fingerprint: {0}")]
  Fingerprint(#[from] HashError),

  #[error("release job {name} from release {release} was not precompiled")]
  ReleaseJobNotFound { name: String, release: String },

  #[error("job {job} depends on package {package} which is not in release {release}")]
  UnknownPackage {
    job: String,
    package: String,
    release: String,
  },

  #[error("rendered archive for job {job} instance {instance} not found")]
  RenderedArchiveNotFound { job: String, instance: String },

  #[error("packages for template {template} not found")]
  PackagesNotFound { template: String },

  #[error("compile task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub trait TemplatesCompiler: Send + Sync {
  /// Validate every template of every job in `release` and record which
  /// packages each job needs.
  fn precompile(&self, release: &Release) -> impl Future<Output = Result<(), TemplatesCompilerError>> + Send;

  /// Compile and publish the rendered archive for `job` on `instance`.
  ///
  /// Idempotent; concurrent calls for the same pair wait for each other and
  /// publish a single record.
  fn compile(&self, job: &Job, instance: &Instance) -> impl Future<Output = Result<(), TemplatesCompilerError>> + Send;

  fn find_rendered_archive(&self, job: &Job, instance: &Instance) -> Result<RenderedArchiveRecord, TemplatesCompilerError>;

  /// Packages the release job behind `template` depends on.
  fn find_packages(&self, template: &Template) -> Result<Vec<Package>, TemplatesCompilerError>;
}
