//! Safe unpacking of vendored source archives.
//!
//! Tar (plain, gzip, bzip2, xz, zstd) and zip containers are supported.
//! Extraction strips a single shared top-level directory, refuses any
//! member that would land outside the destination, never materialises
//! links, and leaves an ignore marker behind so repeated runs can tell an
//! untouched destination from one that still needs populating.
//!
//! # Sub-modules
//!
//! - [`error`] - [`ExtractionError`](error::ExtractionError) variants.
//! - [`format`] - Container and compression detection.
//! - [`path_safety`] - Member-name validation, top-level stripping, and
//!   containment checks.
//! - [`reader`] - Uniform member listing and streaming over tar and zip.
//! - [`extraction`] - The [`Extractor`](extraction::Extractor) seam and its
//!   production implementation.

pub mod error;
pub mod extraction;
pub mod format;
pub mod path_safety;
pub mod reader;
