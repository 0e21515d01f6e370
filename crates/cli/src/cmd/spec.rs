//! Implementation of the `converge spec` command.

use std::path::Path;

use anyhow::{Context, Result};

use converge_lib::applier::JobState;
use converge_lib::config::ConvergeConfig;
use converge_lib::packages_compiler::{CmdPackageBuilder, ConcretePackagesCompiler};
use converge_lib::store::RecordStore;
use converge_lib::store_lock::{StoreLock, StoreOperation};
use converge_lib::templates_compiler::ConcreteTemplatesCompiler;

use super::{find_target, load_deployment, local_blobstore};
use crate::output::print_json;

/// Print the apply spec for `job/index` from previously compiled records.
pub fn cmd_spec(config: &ConvergeConfig, file: &Path, job: &str, index: u32) -> Result<()> {
  let deployment = load_deployment(file)?;
  let (job, instance) = find_target(&deployment, job, index)?;

  let paths = config.store_paths();
  let operation = StoreOperation::Spec {
    deployment: deployment.name.clone(),
    instance: instance.slug(),
  };
  let _lock = StoreLock::acquire(&paths, operation).context("Failed to acquire store lock")?;

  let templates = ConcreteTemplatesCompiler::new(RecordStore::new(paths.clone()), local_blobstore(config)?);
  let packages = ConcretePackagesCompiler::new(
    RecordStore::new(paths.clone()),
    CmdPackageBuilder::new(config.package_path.clone()),
    local_blobstore(config)?,
  );

  let spec = JobState::new(job, instance, &templates, &packages)
    .as_apply_spec()
    .with_context(|| format!("Failed to assemble apply spec for {}", instance.slug()))?;

  print_json(&spec)
}
