use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blobstore::Blobstore;
use crate::deployment::{Instance, Job, Template};
use crate::release::{Package, Release, ReleaseJob};
use crate::store::{RecordKind, RecordStore};
use crate::template::{RenderError, parse};
use crate::util::flight::KeyedLocks;
use crate::util::hash::{Hashable, ObjectHash, sha1_file};

use super::{RenderedArchiveRecord, RenderedArchivesCompiler, TemplatesCompiler, TemplatesCompilerError};

/// Identity of a rendered archive: everything that feeds rendering.
#[derive(Serialize)]
struct RenderedArchiveKey<'a> {
  job: &'a Job,
  instance: &'a Instance,
}

impl Hashable for RenderedArchiveKey<'_> {}

#[derive(Serialize)]
struct JobPackagesKey<'a> {
  release: &'a str,
  job: &'a str,
  version: &'a str,
}

impl Hashable for JobPackagesKey<'_> {}

impl<'a> From<&'a Template> for JobPackagesKey<'a> {
  fn from(template: &'a Template) -> Self {
    Self {
      release: &template.release,
      job: &template.name,
      version: &template.version,
    }
  }
}

/// Templates compiler backed by the record store and a blobstore.
pub struct ConcreteTemplatesCompiler<B> {
  archives: RenderedArchivesCompiler,
  blobstore: B,
  records: RecordStore,
  /// Release jobs seen by `precompile`, by (release name, job name).
  release_jobs: RwLock<HashMap<(String, String), ReleaseJob>>,
  flights: KeyedLocks<ObjectHash>,
}

impl<B: Blobstore> ConcreteTemplatesCompiler<B> {
  pub fn new(records: RecordStore, blobstore: B) -> Self {
    Self {
      archives: RenderedArchivesCompiler::new(records.paths().tmp()),
      blobstore,
      records,
      release_jobs: RwLock::new(HashMap::new()),
      flights: KeyedLocks::new(),
    }
  }

  fn release_jobs_for(&self, job: &Job) -> Result<Vec<ReleaseJob>, TemplatesCompilerError> {
    let registry = self.release_jobs.read().unwrap_or_else(PoisonError::into_inner);

    job
      .templates
      .iter()
      .map(|template| {
        registry
          .get(&(template.release.clone(), template.name.clone()))
          .cloned()
          .ok_or_else(|| TemplatesCompilerError::ReleaseJobNotFound {
            name: template.name.clone(),
            release: template.release.clone(),
          })
      })
      .collect()
  }

  async fn validate(&self, release_job: &ReleaseJob) -> Result<(), TemplatesCompilerError> {
    for (template, dst) in release_job
      .all_templates()
      .zip(std::iter::once("monit").chain(release_job.templates.iter().map(|t| t.dst_path_end.as_str())))
    {
      let render_err = |source| TemplatesCompilerError::Render {
        job: release_job.name.clone(),
        dst: dst.to_string(),
        source,
      };

      let content = tokio::fs::read_to_string(&template.path)
        .await
        .map_err(|source| {
          render_err(RenderError::Read {
            path: template.path.clone(),
            source,
          })
        })?;
      parse(&content).map_err(|source| {
        render_err(RenderError::Parse {
          path: template.path.clone(),
          source,
        })
      })?;
    }
    Ok(())
  }

  fn resolve_packages(release: &Release, release_job: &ReleaseJob) -> Result<Vec<Package>, TemplatesCompilerError> {
    release_job
      .packages
      .iter()
      .map(|name| {
        release
          .find_package(name)
          .cloned()
          .ok_or_else(|| TemplatesCompilerError::UnknownPackage {
            job: release_job.name.clone(),
            package: name.clone(),
            release: release.name.clone(),
          })
      })
      .collect()
  }

  async fn upload(&self, key: &ObjectHash, job: &Job, archive: &Path) -> Result<(), TemplatesCompilerError> {
    let path: PathBuf = archive.to_path_buf();
    let sha1 = tokio::task::spawn_blocking(move || sha1_file(&path))
      .await?
      .map_err(|source| TemplatesCompilerError::Digest {
        path: archive.to_path_buf(),
        source,
      })?;

    let blob_id = self
      .blobstore
      .put(archive)
      .await
      .map_err(|source| TemplatesCompilerError::Blobstore {
        job: job.name.clone(),
        source,
      })?;
    info!(job = %job.name, sha1 = %sha1, blob = %blob_id, "uploaded rendered archive");

    let record = RenderedArchiveRecord { sha1, blob_id };
    self.records.publish(RecordKind::RenderedArchive, key, &record)?;
    Ok(())
  }
}

impl<B: Blobstore> TemplatesCompiler for ConcreteTemplatesCompiler<B> {
  async fn precompile(&self, release: &Release) -> Result<(), TemplatesCompilerError> {
    for release_job in &release.jobs {
      self.validate(release_job).await?;

      let packages = Self::resolve_packages(release, release_job)?;
      let key = JobPackagesKey {
        release: &release.name,
        job: &release_job.name,
        version: &release_job.version,
      }
      .compute_hash()?;
      self.records.publish(RecordKind::JobPackages, &key, &packages)?;

      self
        .release_jobs
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert((release.name.clone(), release_job.name.clone()), release_job.clone());

      debug!(release = %release.name, job = %release_job.name, packages = packages.len(), "precompiled job");
    }

    info!(release = %release.name, jobs = release.jobs.len(), "precompiled release templates");
    Ok(())
  }

  async fn compile(&self, job: &Job, instance: &Instance) -> Result<(), TemplatesCompilerError> {
    let key = RenderedArchiveKey { job, instance }.compute_hash()?;
    let _flight = self.flights.lock(&key).await;

    if self.records.exists(RecordKind::RenderedArchive, &key) {
      debug!(job = %job.name, instance = %instance.slug(), fingerprint = %key, "rendered archive already compiled");
      return Ok(());
    }

    let release_jobs = self.release_jobs_for(job)?;
    let archives = self.archives.clone();
    let (owned_job, owned_instance) = (job.clone(), instance.clone());
    let archive = tokio::task::spawn_blocking(move || archives.compile(&release_jobs, &owned_job, &owned_instance))
      .await?
      .map_err(|source| TemplatesCompilerError::Archive {
        job: job.name.clone(),
        source,
      })?;

    let result = self.upload(&key, job, &archive).await;

    if let Err(e) = self.archives.clean_up(&archive) {
      warn!(archive = %archive.display(), error = %e, "failed to remove rendered archive");
    }

    result
  }

  fn find_rendered_archive(&self, job: &Job, instance: &Instance) -> Result<RenderedArchiveRecord, TemplatesCompilerError> {
    let key = RenderedArchiveKey { job, instance }.compute_hash()?;

    self
      .records
      .load(RecordKind::RenderedArchive, &key)?
      .ok_or_else(|| TemplatesCompilerError::RenderedArchiveNotFound {
        job: job.name.clone(),
        instance: instance.slug(),
      })
  }

  fn find_packages(&self, template: &Template) -> Result<Vec<Package>, TemplatesCompilerError> {
    let key = JobPackagesKey::from(template).compute_hash()?;

    self
      .records
      .load(RecordKind::JobPackages, &key)?
      .ok_or_else(|| TemplatesCompilerError::PackagesNotFound {
        template: template.name.clone(),
      })
  }
}
