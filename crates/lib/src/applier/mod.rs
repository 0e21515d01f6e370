//! Apply spec synthesis.
//!
//! The apply spec is the desired state of one instance handed to its agent:
//! which job templates to run, which compiled packages to install, and where
//! to fetch the rendered templates archive.

pub mod job_state;
pub mod spec;

pub use job_state::{ApplyError, JobState};
pub use spec::{ApplySpec, JobSpec, JobTemplateSpec, NetworkSpec, PackageSpec, RenderedTemplatesArchiveSpec};
