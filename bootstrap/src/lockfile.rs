//! Persistent record of the archives fetched for each pinned package.
//!
//! The lockfile is a pretty-printed JSON document:
//!
//! ```json
//! {
//!   "packages": {
//!     "glfw@3.4": {
//!       "name": "glfw",
//!       "version": "3.4",
//!       "url": "https://github.com/glfw/glfw/archive/refs/tags/3.4.tar.gz",
//!       "archive": ".bootstrap_cache/glfw-3.4.tar.gz",
//!       "sha256": "…",
//!       "destination": "src/thirdparty/glfw"
//!     }
//!   }
//! }
//! ```
//!
//! Saving writes a temporary file beside the lockfile and renames it into
//! place, so readers never observe a half-written document.

use crate::package_key::PackageKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One recorded package.
///
/// Missing fields load as empty strings, so a hand-trimmed entry reads as
/// unpinned instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockEntry {
    /// Package name.
    pub name: String,
    /// Pinned version.
    pub version: String,
    /// URL the archive was fetched from.
    pub url: String,
    /// Cached archive path, relative to the project root.
    pub archive: String,
    /// Lowercase hex SHA-256 of the archive.
    pub sha256: String,
    /// Extraction destination, relative to the project root.
    pub destination: String,
}

/// In-memory lockfile.
///
/// Top-level keys other than `packages` are preserved verbatim across a
/// load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    packages: BTreeMap<PackageKey, LockEntry>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// Errors reading or writing the lockfile.
#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    /// The lockfile exists but could not be read.
    #[error("failed to read lockfile {}: {source}", path.display())]
    Read {
        /// Lockfile path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The lockfile is not valid JSON of the expected shape.
    #[error("malformed lockfile {}: {source}", path.display())]
    Parse {
        /// Lockfile path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialising the lockfile failed.
    #[error("failed to serialise lockfile: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing or renaming the lockfile failed.
    #[error("failed to write lockfile {}: {source}", path.display())]
    Write {
        /// Lockfile path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Lockfile {
    /// Load the lockfile at `path`; an absent file yields an empty lockfile.
    ///
    /// # Errors
    ///
    /// Returns [`LockfileError::Read`] or [`LockfileError::Parse`] when an
    /// existing file cannot be used.
    pub fn load(path: &Path) -> Result<Self, LockfileError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(LockfileError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| LockfileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Atomically write the lockfile to `path` with two-space indentation
    /// and a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`LockfileError::Serialise`] or [`LockfileError::Write`].
    pub fn save(&self, path: &Path) -> Result<(), LockfileError> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|source| LockfileError::Serialise { source })?;
        json.push('\n');

        let write_error = |source| LockfileError::Write {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_error)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
        temp.write_all(json.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(path).map_err(|err| write_error(err.error))?;
        Ok(())
    }

    /// Look up the entry recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &PackageKey) -> Option<&LockEntry> {
        self.packages.get(key)
    }

    /// Record `entry` under `key`, replacing any previous entry.
    pub fn record(&mut self, key: PackageKey, entry: LockEntry) {
        self.packages.insert(key, entry);
    }

    /// Number of recorded packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// True when no package has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
