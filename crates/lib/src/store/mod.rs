//! Local store for compiled artifacts and their records.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── blobs/                  # Local blobstore (content-addressed by SHA-256)
//! │   └── <sha256>
//! ├── records/
//! │   ├── packages/           # CompiledPackageRecord per package fingerprint
//! │   │   └── <hash>.json
//! │   ├── rendered/           # RenderedArchiveRecord per job+instance fingerprint
//! │   │   └── <hash>.json
//! │   └── jobs/               # Package dependencies of a release job
//! │       └── <hash>.json
//! ├── tmp/                    # Scratch space for renders and builds
//! └── .lock
//! ```

pub mod paths;
pub mod records;

pub use paths::StorePaths;
pub use records::{RecordError, RecordKind, RecordStore};
