//! Fixtures and test doubles shared by unit tests.
//!
//! The doubles record calls into a shared [`Journal`] so tests can assert on
//! the order collaborators were driven in.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::agent::{AgentClient, AgentClientFactory, AgentError};
use crate::blobstore::BlobId;
use crate::deployment::{Instance, Job, Network, NetworkAssociation, NetworkType, Template};
use crate::packages_compiler::{CompiledPackageRecord, PackagesCompiler, PackagesCompilerError};
use crate::provisioner::{AssetError, AssetManager, ServiceSupervisor, SupervisorError};
use crate::release::{Package, PropertyDefinition, Release, ReleaseJob, TemplateFile};
use crate::templates_compiler::{RenderedArchiveRecord, TemplatesCompiler, TemplatesCompilerError};

pub const ROUTER_MONIT: &str = "check process router\n  with pidfile /var/vcap/sys/run/router/router.pid\n  group vcap\n";

pub const ROUTER_CTL: &str = "#!/bin/sh\n# <%= name %>\nindex=<%= index %>\nip=<%= spec.networks.default.ip %>\nport=<%= p(\"router.port\") %>\n";

/// Writes the router release (templates and package sources) under `root`.
///
/// Job `router` renders `monit` and `bin/ctl` and depends on `ruby` and
/// `nginx`; `nginx` depends on `ruby`.
pub fn router_release(root: &Path) -> Release {
  let job_dir = root.join("release/jobs/router/templates");
  fs::create_dir_all(&job_dir).unwrap();
  fs::write(job_dir.join("router.monit.erb"), ROUTER_MONIT).unwrap();
  fs::write(job_dir.join("ctl.erb"), ROUTER_CTL).unwrap();

  let ruby = write_package(root, "ruby", &[], "echo ruby > \"$BOSH_INSTALL_TARGET/ruby\"\n");
  let nginx = write_package(
    root,
    "nginx",
    &["ruby"],
    "cp \"$BOSH_PACKAGES_DIR/ruby/ruby\" \"$BOSH_INSTALL_TARGET/\"\necho nginx > \"$BOSH_INSTALL_TARGET/nginx\"\n",
  );

  let mut properties = BTreeMap::new();
  properties.insert(
    "router.port".to_string(),
    PropertyDefinition {
      description: Some("Listen port".to_string()),
      default: Some(json!(8080)),
    },
  );

  Release {
    name: "app".to_string(),
    version: "1".to_string(),
    jobs: vec![ReleaseJob {
      name: "router".to_string(),
      version: "0.1".to_string(),
      monit_template: TemplateFile {
        path: job_dir.join("router.monit.erb"),
        dst_path_end: "monit".to_string(),
      },
      templates: vec![TemplateFile {
        path: job_dir.join("ctl.erb"),
        dst_path_end: "bin/ctl".to_string(),
      }],
      packages: vec!["ruby".to_string(), "nginx".to_string()],
      properties,
    }],
    packages: vec![nginx, ruby],
  }
}

pub fn router_release_job(root: &Path) -> ReleaseJob {
  router_release(root).jobs.remove(0)
}

fn write_package(root: &Path, name: &str, deps: &[&str], packaging: &str) -> Package {
  let source_path = root.join("release/packages").join(name);
  fs::create_dir_all(&source_path).unwrap();
  fs::write(source_path.join("packaging"), packaging).unwrap();
  Package {
    name: name.to_string(),
    version: "1.0".to_string(),
    fingerprint: format!("{name}-fingerprint"),
    dependencies: deps.iter().map(|d| d.to_string()).collect(),
    source_path,
  }
}

pub fn test_package(name: &str) -> Package {
  Package {
    name: name.to_string(),
    version: "1.0".to_string(),
    fingerprint: format!("{name}-fingerprint"),
    dependencies: vec![],
    source_path: PathBuf::from("/nonexistent").join(name),
  }
}

pub fn router_job() -> Job {
  Job {
    name: "router".to_string(),
    templates: vec![Template {
      name: "router".to_string(),
      release: "app".to_string(),
      version: "0.1".to_string(),
    }],
    properties: serde_json::Map::new(),
  }
}

/// Instance `index` of `router` in deployment `cf` on manual network
/// `default` at `10.244.0.<10 + index>`.
pub fn router_instance(index: u32) -> Instance {
  Instance {
    deployment: "cf".to_string(),
    job_name: "router".to_string(),
    index,
    network_associations: vec![NetworkAssociation {
      network: Network {
        name: "default".to_string(),
        kind: NetworkType::Manual,
        netmask: Some("255.255.255.0".to_string()),
        gateway: Some("10.244.0.1".to_string()),
        dns: vec!["10.244.0.2".to_string()],
        cloud_properties: serde_json::Map::new(),
      },
      ip: Some(format!("10.244.0.{}", 10 + index)),
    }],
    persistent_disk: 0,
  }
}

/// Ordered record of calls made on test doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
  pub fn record(&self, entry: impl Into<String>) {
    self.0.lock().unwrap().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

/// Templates compiler answering from preset records.
#[derive(Debug, Default)]
pub struct FakeTemplatesCompiler {
  packages: Mutex<HashMap<String, Vec<Package>>>,
  archives: Mutex<HashMap<String, RenderedArchiveRecord>>,
}

impl FakeTemplatesCompiler {
  pub fn set_packages(&self, template: &str, packages: Vec<Package>) {
    self.packages.lock().unwrap().insert(template.to_string(), packages);
  }

  pub fn set_rendered_archive(&self, job: &str, sha1: &str, blob_id: &str) {
    self.archives.lock().unwrap().insert(
      job.to_string(),
      RenderedArchiveRecord {
        sha1: sha1.to_string(),
        blob_id: BlobId(blob_id.to_string()),
      },
    );
  }
}

impl TemplatesCompiler for FakeTemplatesCompiler {
  async fn precompile(&self, _release: &Release) -> Result<(), TemplatesCompilerError> {
    Ok(())
  }

  async fn compile(&self, _job: &Job, _instance: &Instance) -> Result<(), TemplatesCompilerError> {
    Ok(())
  }

  fn find_rendered_archive(&self, job: &Job, instance: &Instance) -> Result<RenderedArchiveRecord, TemplatesCompilerError> {
    self
      .archives
      .lock()
      .unwrap()
      .get(&job.name)
      .cloned()
      .ok_or_else(|| TemplatesCompilerError::RenderedArchiveNotFound {
        job: job.name.clone(),
        instance: instance.slug(),
      })
  }

  fn find_packages(&self, template: &Template) -> Result<Vec<Package>, TemplatesCompilerError> {
    self
      .packages
      .lock()
      .unwrap()
      .get(&template.name)
      .cloned()
      .ok_or_else(|| TemplatesCompilerError::PackagesNotFound {
        template: template.name.clone(),
      })
  }
}

/// Packages compiler answering from preset records keyed by package name.
#[derive(Debug, Default)]
pub struct FakePackagesCompiler {
  records: Mutex<HashMap<String, CompiledPackageRecord>>,
}

impl FakePackagesCompiler {
  pub fn set_record(&self, package: &str, sha1: &str, blob_id: &str) {
    self.records.lock().unwrap().insert(
      package.to_string(),
      CompiledPackageRecord {
        sha1: sha1.to_string(),
        blob_id: BlobId(blob_id.to_string()),
      },
    );
  }
}

impl PackagesCompiler for FakePackagesCompiler {
  async fn compile(&self, _release: &Release) -> Result<(), PackagesCompilerError> {
    Ok(())
  }

  fn find_compiled_package(&self, package: &Package) -> Result<CompiledPackageRecord, PackagesCompilerError> {
    self
      .records
      .lock()
      .unwrap()
      .get(&package.name)
      .cloned()
      .ok_or_else(|| PackagesCompilerError::NotCompiled {
        name: package.name.clone(),
        version: package.version.clone(),
      })
  }
}

/// Supervisor that journals `provision <name> <timeout>` and
/// `deprovision <name> <timeout>`.
pub struct FakeSupervisor {
  journal: Journal,
  fail_deprovision: Option<String>,
}

impl FakeSupervisor {
  pub fn new(journal: Journal) -> Self {
    Self {
      journal,
      fail_deprovision: None,
    }
  }

  pub fn failing_deprovision(journal: Journal, service: &str) -> Self {
    Self {
      journal,
      fail_deprovision: Some(service.to_string()),
    }
  }
}

impl ServiceSupervisor for FakeSupervisor {
  async fn provision(&self, name: &str, stop_timeout: Duration) -> Result<(), SupervisorError> {
    self
      .journal
      .record(format!("provision {} {}s", name, stop_timeout.as_secs()));
    Ok(())
  }

  async fn deprovision(&self, name: &str, stop_timeout: Duration) -> Result<(), SupervisorError> {
    self
      .journal
      .record(format!("deprovision {} {}s", name, stop_timeout.as_secs()));
    if self.fail_deprovision.as_deref() == Some(name) {
      return Err(SupervisorError::Command {
        service: name.to_string(),
        command: "sv stop".to_string(),
        code: Some(1),
        stderr: "timeout".to_string(),
      });
    }
    Ok(())
  }
}

/// Asset manager that journals `place <name>` and writes a stub file.
pub struct FakeAssetManager {
  journal: Journal,
  missing: Option<String>,
}

impl FakeAssetManager {
  pub fn new(journal: Journal) -> Self {
    Self { journal, missing: None }
  }

  pub fn missing(journal: Journal, name: &str) -> Self {
    Self {
      journal,
      missing: Some(name.to_string()),
    }
  }
}

impl AssetManager for FakeAssetManager {
  fn place(&self, name: &str, dst: &Path) -> Result<(), AssetError> {
    if self.missing.as_deref() == Some(name) {
      return Err(AssetError::Missing {
        name: name.to_string(),
        path: PathBuf::from(name),
      });
    }
    self.journal.record(format!("place {}", name));
    fs::create_dir_all(dst.parent().unwrap()).unwrap();
    fs::write(dst, name).unwrap();
    Ok(())
  }
}

/// Builds clients that fail the first `n` pings (or every ping) and share
/// one attempt counter.
pub struct FakeAgentClientFactory {
  pub attempts: Arc<AtomicU32>,
  succeed_after: Option<u32>,
}

impl FakeAgentClientFactory {
  pub fn succeeding_after(failures: u32) -> Self {
    Self {
      attempts: Arc::new(AtomicU32::new(0)),
      succeed_after: Some(failures),
    }
  }

  pub fn never_succeeding() -> Self {
    Self {
      attempts: Arc::new(AtomicU32::new(0)),
      succeed_after: None,
    }
  }
}

#[derive(Debug)]
pub struct FakeAgentClient {
  attempts: Arc<AtomicU32>,
  succeed_after: Option<u32>,
}

impl AgentClient for FakeAgentClient {
  async fn ping(&self) -> Result<String, AgentError> {
    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    match self.succeed_after {
      Some(failures) if attempt > failures => Ok("pong".to_string()),
      _ => Err(AgentError::Response("agent not ready".to_string())),
    }
  }
}

impl AgentClientFactory for FakeAgentClientFactory {
  type Client = FakeAgentClient;

  fn build(&self, _mbus: &str) -> Result<FakeAgentClient, AgentError> {
    Ok(FakeAgentClient {
      attempts: Arc::clone(&self.attempts),
      succeed_after: self.succeed_after,
    })
  }
}
