//! Evaluation context for a release job rendered for one instance.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::deployment::{Instance, Job};
use crate::release::{PropertyDefinition, ReleaseJob};

/// Values a template can reach: the instance spec and the job's properties.
#[derive(Debug, Clone)]
pub struct TemplateEvaluationContext {
  spec: Value,
  properties: Map<String, Value>,
  definitions: BTreeMap<String, PropertyDefinition>,
}

impl TemplateEvaluationContext {
  pub fn new(release_job: &ReleaseJob, job: &Job, instance: &Instance) -> Self {
    let mut networks = Map::new();
    for assoc in &instance.network_associations {
      let config = instance.network_configuration(assoc);
      networks.insert(
        assoc.network.name.clone(),
        json!({
          "ip": config.ip,
          "netmask": config.netmask,
          "gateway": config.gateway,
          "dns_record_name": instance.dns_record_name(assoc),
        }),
      );
    }

    let spec = json!({
      "deployment": instance.deployment,
      "name": job.name,
      "index": instance.index,
      "job": { "name": job.name },
      "release_job": { "name": release_job.name, "version": release_job.version },
      "networks": networks,
      "properties": job.properties,
    });

    Self {
      spec,
      properties: job.properties.clone(),
      definitions: release_job.properties.clone(),
    }
  }

  /// Property by dotted name: deployment value first, then the release job's
  /// declared default.
  pub fn property(&self, name: &str) -> Option<&Value> {
    lookup(&self.properties, name.split('.'))
      .or_else(|| self.definitions.get(name).and_then(|def| def.default.as_ref()))
  }

  /// Spec value by path segments.
  pub fn spec_value<'a>(&self, path: impl IntoIterator<Item = &'a str>) -> Option<&Value> {
    let mut current = &self.spec;
    for key in path {
      current = current.as_object()?.get(key)?;
    }
    Some(current)
  }
}

fn lookup<'a, 'k>(map: &'a Map<String, Value>, mut keys: impl Iterator<Item = &'k str>) -> Option<&'a Value> {
  let first = keys.next()?;
  let mut current = map.get(first)?;
  for key in keys {
    current = current.as_object()?.get(key)?;
  }
  Some(current)
}
