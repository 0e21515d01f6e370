//! Release model: release jobs, their template files, and packages.
//!
//! These types are produced by manifest parsing elsewhere and consumed
//! read-only here. They derive `Deserialize` so a deployment file can carry
//! them directly.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::hash::Hashable;

/// A named, versioned set of jobs and packages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub jobs: Vec<ReleaseJob>,
  #[serde(default)]
  pub packages: Vec<Package>,
}

impl Release {
  pub fn find_package(&self, name: &str) -> Option<&Package> {
    self.packages.iter().find(|p| p.name == name)
  }
}

/// A template source file and where it lands inside the job directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFile {
  /// Path of the template source on the local filesystem.
  pub path: PathBuf,
  /// Destination relative to `<job name>/` in the rendered archive.
  pub dst_path_end: String,
}

/// Property declared by a release job spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
}

/// A job as shipped inside a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseJob {
  pub name: String,
  pub version: String,
  pub monit_template: TemplateFile,
  #[serde(default)]
  pub templates: Vec<TemplateFile>,
  /// Names of packages within the same release this job depends on.
  #[serde(default)]
  pub packages: Vec<String>,
  /// Declared properties keyed by dotted name.
  #[serde(default)]
  pub properties: BTreeMap<String, PropertyDefinition>,
}

impl ReleaseJob {
  /// Monit template first, then job templates in declared order.
  pub fn all_templates(&self) -> impl Iterator<Item = &TemplateFile> {
    std::iter::once(&self.monit_template).chain(self.templates.iter())
  }
}

/// A named, versioned build unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
  pub name: String,
  pub version: String,
  /// Source fingerprint as declared by the release.
  pub fingerprint: String,
  /// Names of packages this package needs at compile time.
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Directory holding the `packaging` script and sources.
  pub source_path: PathBuf,
}

impl Package {
  /// Fields that identify compiled output. The source location is not part
  /// of it, so the same release unpacked elsewhere reuses compiled records.
  pub fn identity(&self) -> PackageIdentity<'_> {
    PackageIdentity {
      name: &self.name,
      version: &self.version,
      fingerprint: &self.fingerprint,
      dependencies: &self.dependencies,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct PackageIdentity<'a> {
  pub name: &'a str,
  pub version: &'a str,
  pub fingerprint: &'a str,
  pub dependencies: &'a [String],
}

impl Hashable for PackageIdentity<'_> {}
