//! Third-party source bootstrapper library.
//!
//! This crate fetches pinned source archives, verifies them against SHA-256
//! digests recorded in a lockfile, and unpacks them into a vendor tree with
//! path-traversal protection. It is used by the `thirdparty-bootstrap` CLI
//! binary and can be driven programmatically with injected downloaders and
//! extractors.
//!
//! # Modules
//!
//! - [`archive`] - Format detection and safe tar/zip extraction
//! - [`checksum`] - SHA-256 hashing and digest comparison
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Package declarations and project layout
//! - [`download`] - HTTP downloads into the archive cache
//! - [`error`] - Run-level error type and exit codes
//! - [`lockfile`] - The JSON lockfile of pinned digests
//! - [`orchestrator`] - Per-package fetch, verify, and extract pipeline
//! - [`output`] - Progress and summary formatting
//! - [`package_key`] - Semantic wrapper for `name@version` keys

pub mod archive;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod lockfile;
pub mod orchestrator;
pub mod output;
pub mod package_key;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
