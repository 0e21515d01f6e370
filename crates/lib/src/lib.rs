//! converge-lib: compile releases and bootstrap a machine's agent.
//!
//! This crate provides the pieces the `converge` CLI drives:
//! - `packages_compiler`: compile release packages in dependency order
//! - `templates_compiler`: render job templates into per-instance archives
//! - `applier`: assemble the apply spec an agent consumes
//! - `provisioner`: install, supervise and handshake with the agent
//! - `store`: the local record store that makes all of the above idempotent

pub mod agent;
pub mod applier;
pub mod archive;
pub mod blobstore;
pub mod config;
pub mod consts;
pub mod deployment;
pub mod packages_compiler;
pub mod paths;
pub mod provisioner;
pub mod release;
pub mod store;
pub mod store_lock;
pub mod template;
pub mod templates_compiler;
pub mod util;
