//! Renders a job's templates into one archive per job + instance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{self, ArchiveError};
use crate::deployment::{Instance, Job};
use crate::release::ReleaseJob;
use crate::template::{RenderError, Renderer, TemplateEvaluationContext};

const SCRATCH_PREFIX: &str = "rendered-";
const ARCHIVE_PREFIX: &str = "rendered-archive-";

#[derive(Debug, Error)]
pub enum RenderedArchiveError {
  #[error("failed to create scratch directory in {path}: {source}")]
  Scratch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("rendering {dst} of job {job}: {source}")]
  Render {
    job: String,
    dst: String,
    #[source]
    source: RenderError,
  },

  #[error("compressing templates: {0}")]
  Compress(#[source] ArchiveError),

  #[error("failed to remove {path}: {source}")]
  CleanUp {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Produces rendered-templates archives.
///
/// Holds no per-call state; concurrent calls only share `work_dir`, inside
/// which each call gets its own scratch directory.
#[derive(Debug, Clone)]
pub struct RenderedArchivesCompiler {
  work_dir: PathBuf,
}

impl RenderedArchivesCompiler {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
    }
  }

  /// Render every template of `release_jobs` for `instance` and compress the
  /// result. Returns the path of the produced archive.
  ///
  /// The archive holds `<release job>/monit` and
  /// `<release job>/<dst_path_end>` for each template. The scratch tree is
  /// removed before returning whether or not rendering succeeded.
  pub fn compile(
    &self,
    release_jobs: &[ReleaseJob],
    job: &Job,
    instance: &Instance,
  ) -> Result<PathBuf, RenderedArchiveError> {
    fs::create_dir_all(&self.work_dir).map_err(|source| RenderedArchiveError::Scratch {
      path: self.work_dir.clone(),
      source,
    })?;

    let scratch = tempfile::Builder::new()
      .prefix(SCRATCH_PREFIX)
      .tempdir_in(&self.work_dir)
      .map_err(|source| RenderedArchiveError::Scratch {
        path: self.work_dir.clone(),
        source,
      })?;
    debug!(scratch = %scratch.path().display(), job = %job.name, "allocated scratch directory");

    for release_job in release_jobs {
      let renderer = Renderer::new(TemplateEvaluationContext::new(release_job, job, instance));
      let job_dir = scratch.path().join(&release_job.name);

      render_one(&renderer, release_job, &release_job.monit_template.path, &job_dir, "monit")?;

      for template in &release_job.templates {
        render_one(&renderer, release_job, &template.path, &job_dir, &template.dst_path_end)?;
      }
    }

    let archive_path = self.compress(&scratch)?;
    info!(job = %job.name, instance = %instance.slug(), archive = %archive_path.display(), "compiled rendered archive");

    Ok(archive_path)
  }

  /// Remove an archive produced by [`compile`](Self::compile). Removing a
  /// path that does not exist succeeds.
  pub fn clean_up(&self, path: &Path) -> Result<(), RenderedArchiveError> {
    let result = if path.is_dir() {
      fs::remove_dir_all(path)
    } else {
      fs::remove_file(path)
    };

    match result {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(RenderedArchiveError::CleanUp {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  fn compress(&self, scratch: &TempDir) -> Result<PathBuf, RenderedArchiveError> {
    let archive_file = tempfile::Builder::new()
      .prefix(ARCHIVE_PREFIX)
      .suffix(".tgz")
      .tempfile_in(&self.work_dir)
      .map_err(|source| RenderedArchiveError::Scratch {
        path: self.work_dir.clone(),
        source,
      })?;

    archive::compress_dir(scratch.path(), archive_file.path()).map_err(RenderedArchiveError::Compress)?;

    let (_, path) = archive_file.keep().map_err(|e| RenderedArchiveError::Scratch {
      path: self.work_dir.clone(),
      source: e.error,
    })?;
    Ok(path)
  }
}

fn render_one(
  renderer: &Renderer,
  release_job: &ReleaseJob,
  src: &Path,
  job_dir: &Path,
  dst_path_end: &str,
) -> Result<(), RenderedArchiveError> {
  let dst = job_dir.join(dst_path_end);
  renderer
    .render(src, &dst)
    .map_err(|source| RenderedArchiveError::Render {
      job: release_job.name.clone(),
      dst: dst_path_end.to_string(),
      source,
    })?;
  debug!(job = %release_job.name, dst = %dst_path_end, "rendered template");
  Ok(())
}
