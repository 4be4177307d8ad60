//! Error types for archive extraction.

use std::path::PathBuf;

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive filename does not carry a recognised suffix.
    #[error("unsupported archive type: {}", path.display())]
    UnsupportedFormat {
        /// The archive whose suffix was not recognised.
        path: PathBuf,
    },

    /// A member would be written outside the destination directory.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending member name, or the resolved path that escaped.
        path: String,
    },

    /// The expected top-level directory is absent and none could be inferred.
    #[error(
        "could not find extracted top directory {expected} in {}",
        archive.display()
    )]
    MissingTopDirectory {
        /// Archive that was inspected.
        archive: PathBuf,
        /// The top-level directory named by the package declaration.
        expected: String,
    },

    /// The container itself is malformed or uses an unsupported feature.
    #[error("malformed archive {}: {reason}", archive.display())]
    Archive {
        /// Archive that could not be read.
        archive: PathBuf,
        /// Description reported by the container reader.
        reason: String,
    },
}
