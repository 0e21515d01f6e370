mod clean_archive;
mod compile;
mod configure;
mod provision;
mod spec;

pub use clean_archive::cmd_clean_archive;
pub use compile::cmd_compile;
pub use configure::cmd_configure;
pub use provision::cmd_provision;
pub use spec::cmd_spec;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use converge_lib::agent::HttpAgentClientFactory;
use converge_lib::blobstore::LocalBlobstore;
use converge_lib::config::ConvergeConfig;
use converge_lib::deployment::{Deployment, Instance, Job};
use converge_lib::provisioner::{AgentProvisioner, DirAssetManager, RunitSupervisor};

pub type MachineProvisioner = AgentProvisioner<RunitSupervisor, DirAssetManager, HttpAgentClientFactory>;

/// Load a deployment file. Relative template and package source paths are
/// resolved against the file's directory.
pub fn load_deployment(path: &Path) -> Result<Deployment> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("Failed to read deployment {}", path.display()))?;
  let mut deployment: Deployment =
    serde_yaml::from_str(&content).with_context(|| format!("Invalid deployment {}", path.display()))?;

  let base = path.parent().unwrap_or(Path::new("."));
  let rebase = |p: &mut PathBuf| {
    if p.is_relative() {
      *p = base.join(&*p);
    }
  };
  for release in &mut deployment.releases {
    for job in &mut release.jobs {
      rebase(&mut job.monit_template.path);
      for template in &mut job.templates {
        rebase(&mut template.path);
      }
    }
    for package in &mut release.packages {
      rebase(&mut package.source_path);
    }
  }

  Ok(deployment)
}

pub fn find_target<'a>(deployment: &'a Deployment, job: &str, index: u32) -> Result<(&'a Job, &'a Instance)> {
  let Some(found) = deployment.find_job(job) else {
    bail!("Job '{}' is not part of deployment '{}'", job, deployment.name);
  };
  let Some(instance) = deployment.find_instance(job, index) else {
    bail!("Deployment '{}' has no instance {}/{}", deployment.name, job, index);
  };
  Ok((found, instance))
}

/// The compilers only publish into a local blobstore.
pub fn local_blobstore(config: &ConvergeConfig) -> Result<LocalBlobstore> {
  let blobstore = config.blobstore();
  match blobstore.local_path() {
    Some(dir) => Ok(LocalBlobstore::new(dir)),
    None => bail!("Blobstore provider '{}' cannot be used for compilation", blobstore.provider()),
  }
}

pub fn machine_provisioner(config: &ConvergeConfig) -> Result<MachineProvisioner> {
  let agent = config.agent()?.clone();
  let assets_dir = config.assets_dir()?;
  let supervisor = RunitSupervisor::new(&config.target_root, assets_dir, config.runit.clone());

  Ok(
    AgentProvisioner::new(
      &config.target_root,
      supervisor,
      DirAssetManager::new(assets_dir),
      HttpAgentClientFactory,
      config.blobstore(),
      agent,
    )
    .with_handshake(config.handshake_policy()),
  )
}
