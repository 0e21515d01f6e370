use thiserror::Error;
use tracing::debug;

use crate::deployment::{Instance, Job};
use crate::packages_compiler::{PackagesCompiler, PackagesCompilerError};
use crate::templates_compiler::{TemplatesCompiler, TemplatesCompilerError};

use super::spec::{ApplySpec, JobTemplateSpec, PackageSpec, RenderedTemplatesArchiveSpec};

#[derive(Debug, Error)]
pub enum ApplyError {
  #[error("finding packages for template {template}: {source}")]
  FindPackages {
    template: String,
    #[source]
    source: TemplatesCompilerError,
  },

  #[error("finding compiled package {package}: {source}")]
  FindCompiledPackage {
    package: String,
    #[source]
    source: PackagesCompilerError,
  },

  #[error("finding rendered archive {job}: {source}")]
  FindRenderedArchive {
    job: String,
    #[source]
    source: TemplatesCompilerError,
  },

  #[error("package {package} resolves to different compiled records ({first} and {second})")]
  ConflictingPackage {
    package: String,
    first: String,
    second: String,
  },
}

/// State of a machine that should run one deployment job.
///
/// Assembly only reads published records; everything must already be
/// compiled.
pub struct JobState<'a, T, P> {
  job: &'a Job,
  instance: &'a Instance,
  templates_compiler: &'a T,
  packages_compiler: &'a P,
}

impl<'a, T: TemplatesCompiler, P: PackagesCompiler> JobState<'a, T, P> {
  pub fn new(job: &'a Job, instance: &'a Instance, templates_compiler: &'a T, packages_compiler: &'a P) -> Self {
    Self {
      job,
      instance,
      templates_compiler,
      packages_compiler,
    }
  }

  pub fn as_apply_spec(&self) -> Result<ApplySpec, ApplyError> {
    let mut spec = ApplySpec::empty(self.instance);

    spec.job.name = self.job.name.clone();
    spec.job.template_specs = self.job_template_specs();
    self.add_package_specs(&mut spec)?;
    spec.rendered_templates_archive = Some(self.rendered_templates_archive()?);

    debug!(
      job = %self.job.name,
      instance = %self.instance.slug(),
      packages = spec.packages.len(),
      "assembled apply spec"
    );
    Ok(spec)
  }

  fn job_template_specs(&self) -> Vec<JobTemplateSpec> {
    self
      .job
      .templates
      .iter()
      .map(|template| JobTemplateSpec {
        name: template.name.clone(),
        version: template.version.clone(),
      })
      .collect()
  }

  fn add_package_specs(&self, spec: &mut ApplySpec) -> Result<(), ApplyError> {
    for template in &self.job.templates {
      let packages = self
        .templates_compiler
        .find_packages(template)
        .map_err(|source| ApplyError::FindPackages {
          template: template.name.clone(),
          source,
        })?;

      for package in packages {
        let record = self
          .packages_compiler
          .find_compiled_package(&package)
          .map_err(|source| ApplyError::FindCompiledPackage {
            package: package.name.clone(),
            source,
          })?;

        let package_spec = PackageSpec {
          name: package.name.clone(),
          version: package.version,
          sha1: record.sha1,
          blobstore_id: record.blob_id,
        };

        match spec.packages.get(&package.name) {
          Some(existing) if *existing != package_spec => {
            return Err(ApplyError::ConflictingPackage {
              package: package.name,
              first: format!("{}@{}", existing.version, existing.sha1),
              second: format!("{}@{}", package_spec.version, package_spec.sha1),
            });
          }
          Some(_) => {}
          None => {
            spec.packages.insert(package.name, package_spec);
          }
        }
      }
    }
    Ok(())
  }

  fn rendered_templates_archive(&self) -> Result<RenderedTemplatesArchiveSpec, ApplyError> {
    let record = self
      .templates_compiler
      .find_rendered_archive(self.job, self.instance)
      .map_err(|source| ApplyError::FindRenderedArchive {
        job: self.job.name.clone(),
        source,
      })?;

    Ok(RenderedTemplatesArchiveSpec {
      sha1: record.sha1,
      blobstore_id: record.blob_id,
    })
  }
}
