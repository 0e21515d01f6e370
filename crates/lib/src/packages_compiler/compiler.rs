use std::collections::HashMap;
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::archive;
use crate::blobstore::Blobstore;
use crate::release::{Package, Release};
use crate::store::{RecordKind, RecordStore};
use crate::util::flight::KeyedLocks;
use crate::util::hash::{Hashable, ObjectHash, sha1_file};

use super::{BuildRequest, CompiledPackageRecord, PackageBuilder, PackagesCompiler, PackagesCompilerError};

/// Packages compiler backed by the record store and a blobstore.
pub struct ConcretePackagesCompiler<P, B> {
  builder: P,
  blobstore: B,
  records: RecordStore,
  flights: KeyedLocks<ObjectHash>,
}

impl<P: PackageBuilder, B: Blobstore> ConcretePackagesCompiler<P, B> {
  pub fn new(records: RecordStore, builder: P, blobstore: B) -> Self {
    Self {
      builder,
      blobstore,
      records,
      flights: KeyedLocks::new(),
    }
  }

  async fn compile_package(&self, release: &Release, package: &Package) -> Result<(), PackagesCompilerError> {
    let key = package.identity().compute_hash()?;
    let _flight = self.flights.lock(&key).await;

    if self.records.exists(RecordKind::CompiledPackage, &key) {
      debug!(package = %package.name, fingerprint = %key, "package already compiled");
      return Ok(());
    }

    let mut dependencies = Vec::with_capacity(package.dependencies.len());
    for name in &package.dependencies {
      let dependency = release
        .find_package(name)
        .ok_or_else(|| PackagesCompilerError::UnknownDependency {
          package: package.name.clone(),
          dependency: name.clone(),
        })?;
      let record = self.find_compiled_package(dependency)?;
      let path = self
        .blobstore
        .get(&record.blob_id)
        .await
        .map_err(|source| PackagesCompilerError::Blobstore {
          package: dependency.name.clone(),
          source,
        })?;
      dependencies.push((name.clone(), path));
    }

    let tmp = self.records.paths().tmp();
    let scratch_err = |source| PackagesCompilerError::Scratch {
      path: tmp.clone(),
      source,
    };
    std::fs::create_dir_all(&tmp).map_err(scratch_err)?;
    let scratch = tempfile::Builder::new()
      .prefix("package-")
      .tempdir_in(&tmp)
      .map_err(scratch_err)?;

    let install_dir = self
      .builder
      .build(BuildRequest {
        package,
        dependencies,
        work_dir: scratch.path(),
      })
      .await
      .map_err(|source| PackagesCompilerError::Build {
        package: package.name.clone(),
        source,
      })?;

    let archive_path: PathBuf = scratch.path().join(format!("{}.tgz", package.name));
    let (sha1, archive_path) = {
      let install_dir = install_dir.clone();
      let package_name = package.name.clone();
      tokio::task::spawn_blocking(move || {
        archive::compress_dir(&install_dir, &archive_path).map_err(|source| PackagesCompilerError::Archive {
          package: package_name,
          source,
        })?;
        let sha1 = sha1_file(&archive_path).map_err(|source| PackagesCompilerError::Digest {
          path: archive_path.clone(),
          source,
        })?;
        Ok::<_, PackagesCompilerError>((sha1, archive_path))
      })
      .await??
    };

    let blob_id = self
      .blobstore
      .put(&archive_path)
      .await
      .map_err(|source| PackagesCompilerError::Blobstore {
        package: package.name.clone(),
        source,
      })?;

    let record = CompiledPackageRecord { sha1, blob_id };
    self.records.publish(RecordKind::CompiledPackage, &key, &record)?;
    info!(package = %package.name, sha1 = %record.sha1, blob = %record.blob_id, "compiled package");

    Ok(())
  }
}

/// Packages of `release` ordered so every package follows its dependencies.
pub fn compile_order(release: &Release) -> Result<Vec<&Package>, PackagesCompilerError> {
  let mut graph: DiGraph<&Package, ()> = DiGraph::new();
  let nodes: HashMap<&str, NodeIndex> = release
    .packages
    .iter()
    .map(|package| (package.name.as_str(), graph.add_node(package)))
    .collect();

  for package in &release.packages {
    for dependency in &package.dependencies {
      let from = nodes
        .get(dependency.as_str())
        .ok_or_else(|| PackagesCompilerError::UnknownDependency {
          package: package.name.clone(),
          dependency: dependency.clone(),
        })?;
      graph.add_edge(*from, nodes[package.name.as_str()], ());
    }
  }

  let sorted = toposort(&graph, None).map_err(|cycle| PackagesCompilerError::Cycle {
    package: graph[cycle.node_id()].name.clone(),
  })?;

  Ok(sorted.into_iter().map(|idx| graph[idx]).collect())
}

impl<P: PackageBuilder, B: Blobstore> PackagesCompiler for ConcretePackagesCompiler<P, B> {
  async fn compile(&self, release: &Release) -> Result<(), PackagesCompilerError> {
    let order = compile_order(release)?;
    info!(release = %release.name, packages = order.len(), "compiling packages");

    for package in order {
      self.compile_package(release, package).await?;
    }

    Ok(())
  }

  fn find_compiled_package(&self, package: &Package) -> Result<CompiledPackageRecord, PackagesCompilerError> {
    let key = package.identity().compute_hash()?;

    self
      .records
      .load(RecordKind::CompiledPackage, &key)?
      .ok_or_else(|| PackagesCompilerError::NotCompiled {
        name: package.name.clone(),
        version: package.version.clone(),
      })
  }
}
