//! Top-level error type for a bootstrap run.
//!
//! Component errors are wrapped with the key of the package being
//! processed, so every message names the package that failed.

use crate::archive::error::ExtractionError;
use crate::checksum::ChecksumError;
use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::lockfile::LockfileError;
use crate::package_key::PackageKey;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Process exit status for any failed run.
pub const EXIT_FAILURE: i32 = 1;

/// Process exit status after a user interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors that abort a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The lockfile could not be read or written.
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    /// Fetching a package archive failed.
    #[error("[{key}] {source}")]
    Download {
        /// Package being fetched.
        key: PackageKey,
        /// Underlying failure.
        #[source]
        source: DownloadError,
    },

    /// A package archive did not match its recorded digest, or could not
    /// be hashed.
    #[error("[{key}] {source}")]
    Checksum {
        /// Package being verified.
        key: PackageKey,
        /// Underlying failure.
        #[source]
        source: ChecksumError,
    },

    /// Unpacking a package archive failed.
    #[error("[{key}] extraction failed: {source}")]
    Extraction {
        /// Package being extracted.
        key: PackageKey,
        /// Underlying failure.
        #[source]
        source: ExtractionError,
    },

    /// A working directory could not be created.
    #[error("failed to create {path}: {source}")]
    Prepare {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the cache lock.
    #[error("another bootstrap run is in progress (lock held on {path})")]
    AlreadyRunning {
        /// Lock file path.
        path: Utf8PathBuf,
    },

    /// Removing a directory during `--clean` failed.
    #[error("failed to remove {path}: {source}")]
    Clean {
        /// Directory that could not be removed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// Key of the package being processed when the error occurred.
    #[must_use]
    pub fn package(&self) -> Option<&PackageKey> {
        match self {
            Self::Download { key, .. }
            | Self::Checksum { key, .. }
            | Self::Extraction { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn checksum_error_names_package_and_digests() {
        let err = BootstrapError::Checksum {
            key: PackageKey::new("glfw", "3.4"),
            source: ChecksumError::Mismatch {
                expected: "a".repeat(64),
                actual: "b".repeat(64),
                path: PathBuf::from(".bootstrap_cache/glfw-3.4.tar.gz"),
            },
        };

        let message = err.to_string();
        assert!(message.starts_with("[glfw@3.4] checksum mismatch"));
        assert!(message.contains(&"a".repeat(64)));
        assert!(message.contains(&"b".repeat(64)));
        assert!(message.contains("glfw-3.4.tar.gz"));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn traversal_error_names_package_and_member() {
        let err = BootstrapError::Extraction {
            key: PackageKey::new("cglm", "0.9.2"),
            source: ExtractionError::PathTraversal {
                path: "../../etc/passwd".to_owned(),
            },
        };

        assert_eq!(err.package().map(PackageKey::as_str), Some("cglm@0.9.2"));
        assert!(err.to_string().contains("../../etc/passwd"));
    }

    #[test]
    fn layout_errors_carry_no_package() {
        let err = BootstrapError::AlreadyRunning {
            path: Utf8PathBuf::from(".bootstrap_cache/.bootstrap.lock"),
        };
        assert!(err.package().is_none());
    }
}
