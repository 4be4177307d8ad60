//! Container and compression detection.
//!
//! The container is chosen once from the archive filename. Tar streams are
//! then decompressed according to their leading magic bytes, so a gzip
//! payload published under a `.tar.xz` name still unpacks.

use super::error::ExtractionError;
use std::path::Path;

/// Filename suffixes that select the tar container.
const TAR_SUFFIXES: &[&str] = &[
    ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tbz", ".tar.xz", ".txz", ".tar.zst", ".tzst",
];

/// Filename suffixes that select the zip container.
const ZIP_SUFFIXES: &[&str] = &[".zip"];

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// The closed set of supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A tar stream, optionally compressed.
    Tar,
    /// A zip archive.
    Zip,
}

impl ArchiveFormat {
    /// Select the container format from the archive filename.
    ///
    /// Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedFormat`] when no known suffix
    /// matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use thirdparty_bootstrap::archive::format::ArchiveFormat;
    ///
    /// let format = ArchiveFormat::from_path(Path::new("glfw-3.4.tar.gz"));
    /// assert_eq!(format.ok(), Some(ArchiveFormat::Tar));
    /// ```
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if TAR_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
            return Ok(Self::Tar);
        }
        if ZIP_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
            return Ok(Self::Zip);
        }
        Err(ExtractionError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

/// Compression applied to a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    /// Uncompressed tar.
    None,
    /// gzip (`.tar.gz`, `.tgz`).
    Gzip,
    /// bzip2 (`.tar.bz2`).
    Bzip2,
    /// xz / LZMA2 (`.tar.xz`).
    Xz,
    /// Zstandard (`.tar.zst`).
    Zstd,
}

impl TarCompression {
    /// Identify the compression from the first bytes of the stream.
    ///
    /// Anything without a recognised magic number is read as plain tar.
    #[must_use]
    pub fn sniff(header: &[u8]) -> Self {
        if header.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if header.starts_with(BZIP2_MAGIC) {
            Self::Bzip2
        } else if header.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if header.starts_with(ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}
