//! Compile a release and assemble the apply spec from the published records.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use converge_lib::applier::{ApplyError, JobState};
use converge_lib::archive;
use converge_lib::blobstore::{Blobstore, LocalBlobstore};
use converge_lib::packages_compiler::{CmdPackageBuilder, ConcretePackagesCompiler, PackagesCompiler};
use converge_lib::store::{RecordStore, StorePaths};
use converge_lib::templates_compiler::{ConcreteTemplatesCompiler, TemplatesCompiler};
use converge_lib::util::hash::sha1_file;

use super::common::{router_instance, router_job, router_release};

struct Fixture {
  temp: TempDir,
  templates: Arc<ConcreteTemplatesCompiler<LocalBlobstore>>,
  packages: ConcretePackagesCompiler<CmdPackageBuilder, LocalBlobstore>,
  blobstore: LocalBlobstore,
}

fn fixture() -> Fixture {
  let temp = TempDir::new().unwrap();
  let paths = StorePaths::new(temp.path().join("store"));
  paths.ensure().unwrap();

  Fixture {
    templates: Arc::new(ConcreteTemplatesCompiler::new(
      RecordStore::new(paths.clone()),
      LocalBlobstore::new(paths.blobs()),
    )),
    packages: ConcretePackagesCompiler::new(
      RecordStore::new(paths.clone()),
      CmdPackageBuilder::new("/usr/bin:/bin"),
      LocalBlobstore::new(paths.blobs()),
    ),
    blobstore: LocalBlobstore::new(paths.blobs()),
    temp,
  }
}

#[tokio::test]
async fn router_converges_to_apply_spec() {
  let fx = fixture();
  let release = router_release(&fx.temp.path().join("src"));
  let (job, instance) = (router_job(), router_instance(0));

  fx.templates.precompile(&release).await.unwrap();
  fx.packages.compile(&release).await.unwrap();
  fx.templates.compile(&job, &instance).await.unwrap();

  let spec = JobState::new(&job, &instance, fx.templates.as_ref(), &fx.packages)
    .as_apply_spec()
    .unwrap();

  assert_eq!(spec.deployment, "cf");
  assert_eq!(spec.job.name, "router");
  assert_eq!(spec.job.template_specs.len(), 1);
  assert_eq!(spec.job.template_specs[0].name, "router");
  assert_eq!(spec.job.template_specs[0].version, "0.1");
  assert_eq!(spec.packages.keys().collect::<Vec<_>>(), ["nginx", "ruby"]);
  assert_eq!(spec.networks["default"].ip, "10.244.0.10");

  for (name, package) in &spec.packages {
    let blob = fx.blobstore.get(&package.blobstore_id).await.unwrap();
    assert_eq!(sha1_file(&blob).unwrap(), package.sha1);
    assert!(archive::list_entries(&blob).unwrap().contains(name), "{name} archive content");
  }

  let rendered = spec.rendered_templates_archive.unwrap();
  let blob = fx.blobstore.get(&rendered.blobstore_id).await.unwrap();
  assert_eq!(sha1_file(&blob).unwrap(), rendered.sha1);

  let out = fx.temp.path().join("out");
  archive::extract(&blob, &out).unwrap();
  assert_eq!(
    fs::read_to_string(out.join("router/monit")).unwrap(),
    super::common::ROUTER_MONIT
  );
  assert_eq!(
    fs::read_to_string(out.join("router/bin/ctl")).unwrap(),
    "#!/bin/sh\nindex=0\nip=10.244.0.10\nport=9090\nworkers=2\n"
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_instances_compile_once_each() {
  let fx = fixture();
  let release = router_release(&fx.temp.path().join("src"));
  fx.templates.precompile(&release).await.unwrap();
  let job = router_job();

  let mut tasks = tokio::task::JoinSet::new();
  for round in 0..3 {
    for index in 0..2 {
      let templates = Arc::clone(&fx.templates);
      let job = job.clone();
      tasks.spawn(async move {
        templates.compile(&job, &router_instance(index)).await.map(|()| (round, index))
      });
    }
  }
  while let Some(joined) = tasks.join_next().await {
    joined.unwrap().unwrap();
  }

  let first = fx.templates.find_rendered_archive(&job, &router_instance(0)).unwrap();
  let second = fx.templates.find_rendered_archive(&job, &router_instance(1)).unwrap();
  assert_ne!(first.sha1, second.sha1);

  let records = fs::read_dir(fx.temp.path().join("store/records/rendered")).unwrap().count();
  assert_eq!(records, 2);
  let blobs = fs::read_dir(fx.temp.path().join("store/blobs")).unwrap().count();
  assert_eq!(blobs, 2);
}

#[tokio::test]
async fn apply_spec_requires_compiled_packages() {
  let fx = fixture();
  let release = router_release(&fx.temp.path().join("src"));
  let (job, instance) = (router_job(), router_instance(0));

  fx.templates.precompile(&release).await.unwrap();
  fx.templates.compile(&job, &instance).await.unwrap();

  let err = JobState::new(&job, &instance, fx.templates.as_ref(), &fx.packages)
    .as_apply_spec()
    .unwrap_err();

  assert!(matches!(err, ApplyError::FindCompiledPackage { .. }), "{err}");
}

#[tokio::test]
async fn records_survive_a_new_compiler() {
  let fx = fixture();
  let release = router_release(&fx.temp.path().join("src"));
  let (job, instance) = (router_job(), router_instance(3));

  fx.templates.precompile(&release).await.unwrap();
  fx.packages.compile(&release).await.unwrap();
  fx.templates.compile(&job, &instance).await.unwrap();
  let before = fx.templates.find_rendered_archive(&job, &instance).unwrap();

  let paths = StorePaths::new(fx.temp.path().join("store"));
  let templates = ConcreteTemplatesCompiler::new(RecordStore::new(paths.clone()), LocalBlobstore::new(paths.blobs()));
  let packages = ConcretePackagesCompiler::new(
    RecordStore::new(paths.clone()),
    CmdPackageBuilder::new("/usr/bin:/bin"),
    LocalBlobstore::new(paths.blobs()),
  );

  assert_eq!(templates.find_rendered_archive(&job, &instance).unwrap(), before);
  let spec = JobState::new(&job, &instance, &templates, &packages)
    .as_apply_spec()
    .unwrap();
  assert_eq!(spec.rendered_templates_archive.unwrap().sha1, before.sha1);
}
