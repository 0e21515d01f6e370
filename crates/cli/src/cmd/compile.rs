//! Implementation of the `converge compile` command.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use converge_lib::config::ConvergeConfig;
use converge_lib::deployment::Deployment;
use converge_lib::packages_compiler::{CmdPackageBuilder, ConcretePackagesCompiler, PackagesCompiler};
use converge_lib::store::{RecordStore, StorePaths};
use converge_lib::store_lock::{StoreLock, StoreOperation};
use converge_lib::templates_compiler::{ConcreteTemplatesCompiler, TemplatesCompiler};

use super::{load_deployment, local_blobstore};
use crate::output::{Outcome, OutputFormat, Report, print_json};

#[derive(Debug, Serialize)]
struct CompileSummary {
  deployment: String,
  releases: usize,
  packages: usize,
  instances: Vec<String>,
}

/// Execute the compile command.
///
/// Precompiles every release's templates, compiles its packages in
/// dependency order, then renders one archive per instance with at most
/// `jobs` instances in flight. Work already recorded in the store is reused.
pub fn cmd_compile(config: &ConvergeConfig, file: &Path, jobs: usize, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let deployment = load_deployment(file)?;

  let paths = config.store_paths();
  paths.ensure().context("Failed to create store")?;
  let operation = StoreOperation::Compile {
    deployment: deployment.name.clone(),
  };
  let _lock = StoreLock::acquire(&paths, operation).context("Failed to acquire store lock")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(compile(config, &paths, deployment, jobs))?;

  if output.is_json() {
    print_json(&summary)?;
  } else {
    Report::new(Outcome::Compiled)
      .fact("Deployment", &summary.deployment)
      .fact("Releases", summary.releases)
      .fact("Packages", summary.packages)
      .fact("Rendered archives", summary.instances.len())
      .took(start)
      .print();
  }

  Ok(())
}

async fn compile(
  config: &ConvergeConfig,
  paths: &StorePaths,
  deployment: Deployment,
  jobs: usize,
) -> Result<CompileSummary> {
  let templates = Arc::new(ConcreteTemplatesCompiler::new(
    RecordStore::new(paths.clone()),
    local_blobstore(config)?,
  ));
  let packages = ConcretePackagesCompiler::new(
    RecordStore::new(paths.clone()),
    CmdPackageBuilder::new(config.package_path.clone()),
    local_blobstore(config)?,
  );

  for release in &deployment.releases {
    templates
      .precompile(release)
      .await
      .with_context(|| format!("Failed to precompile templates of release {}", release.name))?;
    packages
      .compile(release)
      .await
      .with_context(|| format!("Failed to compile packages of release {}", release.name))?;
  }

  let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
  let mut tasks = JoinSet::new();
  for instance in &deployment.instances {
    let job = deployment
      .find_job(&instance.job_name)
      .cloned()
      .with_context(|| format!("Instance {} references unknown job {}", instance.slug(), instance.job_name))?;
    let instance = instance.clone();
    let templates = Arc::clone(&templates);
    let semaphore = Arc::clone(&semaphore);

    tasks.spawn(async move {
      let _permit = semaphore.acquire_owned().await?;
      templates
        .compile(&job, &instance)
        .await
        .with_context(|| format!("Failed to compile rendered archive for {}", instance.slug()))?;
      Ok::<_, anyhow::Error>(instance.slug())
    });
  }

  let mut instances = Vec::with_capacity(deployment.instances.len());
  while let Some(joined) = tasks.join_next().await {
    let slug = joined.context("Compile task failed")??;
    debug!(instance = %slug, "rendered archive ready");
    instances.push(slug);
  }
  instances.sort();

  Ok(CompileSummary {
    releases: deployment.releases.len(),
    packages: deployment.releases.iter().map(|r| r.packages.len()).sum(),
    deployment: deployment.name,
    instances,
  })
}
