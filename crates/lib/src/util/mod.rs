//! Shared utilities.
//!
//! Common utilities used across the crate including hashing, per-key locking
//! and test helpers.

pub mod flight;
pub mod hash;

#[cfg(test)]
pub mod testutil;
