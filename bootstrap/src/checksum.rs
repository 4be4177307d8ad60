//! SHA-256 hashing and digest comparison for downloaded archives.
//!
//! The digest recorded in the lockfile is the trust anchor for a pinned
//! `name@version`. Every run rehashes the cached archive, including cache
//! hits, and compares it with that anchor before anything is extracted.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Size of the read buffer used while hashing.
const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// A validated, lowercase, hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use thirdparty_bootstrap::checksum::Sha256Digest;
///
/// let hex = "a".repeat(64);
/// let digest = Sha256Digest::try_from(hex.as_str()).expect("valid digest");
/// assert_eq!(digest.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ChecksumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_sha256(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ChecksumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_sha256(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors arising from hashing or digest verification.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// The file could not be read while hashing.
    #[error("failed to hash {}: {source}", path.display())]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A digest string is not 64 lowercase hex characters.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidDigest {
        /// Why the digest was rejected.
        reason: String,
    },

    /// The archive bytes do not match the digest pinned in the lockfile.
    #[error(
        "checksum mismatch\n  expected: {expected}\n  actual:   {actual}\n  file:     {}",
        path.display()
    )]
    Mismatch {
        /// Digest recorded in the lockfile.
        expected: String,
        /// Digest computed from the archive on disk.
        actual: String,
        /// Archive that was hashed.
        path: PathBuf,
    },
}

/// Outcome of comparing a pinned digest with a freshly computed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The digests are identical.
    Match,
    /// The digests differ.
    Mismatch,
}

/// Compute the SHA-256 digest of the file at `path`.
///
/// The file is streamed through the hasher in fixed-size chunks, so memory
/// use does not grow with the archive size.
///
/// # Errors
///
/// Returns [`ChecksumError::Read`] if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<Sha256Digest, ChecksumError> {
    let read_error = |source| ChecksumError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_error)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(Sha256Digest::from_hasher(hasher))
}

/// Compute the SHA-256 digest of an in-memory byte slice.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Sha256Digest::from_hasher(hasher)
}

/// Compare an expected digest string with an actual digest.
///
/// Comparison is case-insensitive so that lockfiles edited by hand with
/// uppercase hex still verify.
#[must_use]
pub fn compare(expected: &str, actual: &Sha256Digest) -> Comparison {
    if expected.eq_ignore_ascii_case(actual.as_str()) {
        Comparison::Match
    } else {
        Comparison::Mismatch
    }
}

/// Verify `actual` against `expected`, producing a descriptive mismatch.
///
/// # Errors
///
/// Returns [`ChecksumError::Mismatch`] naming both digests and the archive
/// path when the digests differ.
pub fn verify(expected: &str, actual: &Sha256Digest, path: &Path) -> Result<(), ChecksumError> {
    match compare(expected, actual) {
        Comparison::Match => Ok(()),
        Comparison::Mismatch => Err(ChecksumError::Mismatch {
            expected: expected.to_owned(),
            actual: actual.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

fn validate_sha256(value: &str) -> Result<(), ChecksumError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(ChecksumError::InvalidDigest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ChecksumError::InvalidDigest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ChecksumError::InvalidDigest {
            reason: "digest must be lowercase".to_owned(),
        });
    }
    Ok(())
}
