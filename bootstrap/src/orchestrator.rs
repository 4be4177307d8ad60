//! Fetch, verify, extract, and record every declared package.
//!
//! Packages are processed strictly in declaration order. Each one is
//! downloaded unless a cached archive exists, rehashed, checked against the
//! digest pinned in the lockfile, extracted unless its destination is
//! already populated, and recorded. The lockfile is written once, after the
//! last package succeeds; any failure aborts the run before that write.

use crate::archive::extraction::{
    ExtractOutcome, ExtractRequest, Extractor, SafeExtractor, is_effectively_empty, remove_tree,
};
use crate::checksum::{Sha256Digest, hash_file, verify};
use crate::config::{BootstrapConfig, ProjectLayout, ResolvedPackage};
use crate::download::{Downloader, HttpDownloader};
use crate::error::{BootstrapError, Result};
use crate::lockfile::{LockEntry, Lockfile};
use crate::output::write_line;
use crate::package_key::PackageKey;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Advisory lock file created inside the cache directory for each run.
pub const RUN_LOCK_FILE: &str = ".bootstrap.lock";

/// Flags controlling a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-download and re-extract every package.
    pub force: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

/// How a package archive was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Downloaded during this run.
    Downloaded {
        /// Size of the archive.
        bytes: u64,
    },
    /// Reused from the cache.
    Cached,
}

/// What happened to a package destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    /// The archive was unpacked.
    Extracted {
        /// Number of regular files written.
        files: usize,
    },
    /// The destination already existed, so the extractor was not called.
    AlreadyPresent,
    /// The extractor found user content in the destination and kept it.
    SkippedPopulated,
}

/// Outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// Lockfile key.
    pub key: PackageKey,
    /// How the archive was obtained.
    pub fetch: FetchStatus,
    /// What happened to the destination.
    pub extract: ExtractStatus,
    /// Digest of the archive.
    pub sha256: Sha256Digest,
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Per-package outcomes, in declaration order.
    pub packages: Vec<PackageReport>,
    /// Vendor root.
    pub vendor_dir: Utf8PathBuf,
    /// Download cache.
    pub cache_dir: Utf8PathBuf,
    /// Lockfile written at the end of the run.
    pub lockfile: Utf8PathBuf,
}

/// Collaborators and settings shared by every package in a run.
pub struct PackageContext<'a> {
    /// Project paths.
    pub layout: &'a ProjectLayout,
    /// Run flags.
    pub options: RunOptions,
    /// Archive fetcher.
    pub downloader: &'a dyn Downloader,
    /// Archive unpacker.
    pub extractor: &'a dyn Extractor,
}

/// Process every package with the production downloader and extractor.
///
/// # Errors
///
/// Returns the first [`BootstrapError`] encountered; the lockfile is left
/// as it was before the run.
pub fn run_bootstrap(
    config: &BootstrapConfig,
    options: RunOptions,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let downloader = HttpDownloader::new(!options.quiet);
    run_bootstrap_with(config, options, &downloader, &SafeExtractor, out)
}

/// Testable inner function with injected dependencies.
///
/// # Errors
///
/// See [`run_bootstrap`].
pub fn run_bootstrap_with(
    config: &BootstrapConfig,
    options: RunOptions,
    downloader: &dyn Downloader,
    extractor: &dyn Extractor,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let layout = &config.layout;
    ensure_dir(&layout.vendor_dir)?;
    ensure_dir(&layout.cache_dir)?;
    let _run_lock = RunLock::acquire(&layout.cache_dir.join(RUN_LOCK_FILE))?;

    let mut lock = Lockfile::load(layout.lockfile.as_std_path())?;
    let context = PackageContext {
        layout,
        options,
        downloader,
        extractor,
    };

    let mut packages = Vec::with_capacity(config.packages.len());
    for package in config.resolved_packages() {
        packages.push(process_package(&context, &package, &mut lock, out)?);
    }

    lock.save(layout.lockfile.as_std_path())?;
    debug!("recorded {} packages in {}", lock.len(), layout.lockfile);

    Ok(RunSummary {
        packages,
        vendor_dir: layout.vendor_dir.clone(),
        cache_dir: layout.cache_dir.clone(),
        lockfile: layout.lockfile.clone(),
    })
}

/// Fetch, verify, extract, and record one package.
///
/// # Errors
///
/// Returns [`BootstrapError::Download`], [`BootstrapError::Checksum`], or
/// [`BootstrapError::Extraction`] tagged with the package key. A checksum
/// mismatch, or a malformed pinned digest, is reported before the
/// destination is touched. An entry with no digest is treated as unpinned.
pub fn process_package(
    context: &PackageContext<'_>,
    package: &ResolvedPackage,
    lock: &mut Lockfile,
    out: &mut dyn Write,
) -> Result<PackageReport> {
    let mut progress = Progress::new(out, context.options.quiet);
    let force = context.options.force;
    let key = &package.key;
    progress.line(format!("[{} {}]", package.name, package.version));

    let fetch = if force || !package.cache_path.exists() {
        progress.line(format!("  - fetching: {}", package.url));
        let bytes = context
            .downloader
            .download(&package.url, package.cache_path.as_std_path())
            .map_err(|source| BootstrapError::Download {
                key: key.clone(),
                source,
            })?;
        FetchStatus::Downloaded { bytes }
    } else {
        progress.line(format!("  - using cached: {}", package.archive_filename));
        FetchStatus::Cached
    };

    let checksum_error = |source| BootstrapError::Checksum {
        key: key.clone(),
        source,
    };
    let sha256 = hash_file(package.cache_path.as_std_path()).map_err(checksum_error)?;
    progress.line(format!("  - sha256: {sha256}"));

    if let Some(pinned) = pinned_digest(lock, key) {
        let expected =
            Sha256Digest::try_from(pinned.to_ascii_lowercase()).map_err(checksum_error)?;
        verify(expected.as_str(), &sha256, package.cache_path.as_std_path())
            .map_err(checksum_error)?;
        progress.line(format!(
            "  - checksum OK ({})",
            context.layout.lockfile.file_name().unwrap_or("lockfile")
        ));
    }

    let extract = if force || needs_extraction(&package.destination) {
        progress.line(format!("  - extracting to: {}", package.destination));
        let request = ExtractRequest::new(
            package.cache_path.as_std_path(),
            package.destination.as_std_path(),
            package.inner_top.as_deref(),
        )
        .with_force(force);
        let outcome = context
            .extractor
            .extract(&request)
            .map_err(|source| BootstrapError::Extraction {
                key: key.clone(),
                source,
            })?;
        match outcome {
            ExtractOutcome::Extracted { files, .. } => ExtractStatus::Extracted { files },
            ExtractOutcome::SkippedPopulated => ExtractStatus::SkippedPopulated,
        }
    } else {
        progress.line(format!("  - already extracted: {}", package.destination));
        ExtractStatus::AlreadyPresent
    };

    lock.record(
        key.clone(),
        LockEntry {
            name: package.name.clone(),
            version: package.version.clone(),
            url: package.url.clone(),
            archive: context.layout.relative(&package.cache_path),
            sha256: sha256.to_string(),
            destination: context.layout.relative(&package.destination),
        },
    );

    Ok(PackageReport {
        key: key.clone(),
        fetch,
        extract,
        sha256,
    })
}

/// The digest recorded for `key`; entries without one are unpinned.
fn pinned_digest<'l>(lock: &'l Lockfile, key: &PackageKey) -> Option<&'l str> {
    lock.get(key)
        .map(|entry| entry.sha256.trim())
        .filter(|digest| !digest.is_empty())
}

/// A destination needs extracting when it is absent or holds nothing but
/// the ignore marker.
fn needs_extraction(destination: &Utf8Path) -> bool {
    match is_effectively_empty(destination.as_std_path()) {
        Ok(empty) => empty,
        Err(err) => {
            debug!("cannot inspect {destination}: {err}; treating as populated");
            false
        }
    }
}

/// Remove the vendor root and the download cache.
///
/// The lockfile is never removed. Missing directories are not an error.
///
/// # Errors
///
/// Returns [`BootstrapError::AlreadyRunning`] when another run holds the
/// cache lock, or [`BootstrapError::Clean`] when a directory cannot be
/// removed.
pub fn clean(layout: &ProjectLayout, options: RunOptions, out: &mut dyn Write) -> Result<()> {
    let mut progress = Progress::new(out, options.quiet);
    progress.line("Cleaning thirdparty and cache...");

    let lock_path = layout.cache_dir.join(RUN_LOCK_FILE);
    if lock_path.exists() {
        drop(RunLock::acquire(&lock_path)?);
    }

    for dir in [&layout.vendor_dir, &layout.cache_dir] {
        remove_path(dir)?;
    }

    progress.line("Done.");
    Ok(())
}

fn remove_path(path: &Utf8Path) -> Result<()> {
    let clean_error = |source| BootstrapError::Clean {
        path: path.to_owned(),
        source,
    };
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(clean_error(err)),
    };
    debug!("removing {path}");
    if metadata.is_dir() {
        remove_tree(path.as_std_path()).map_err(clean_error)
    } else {
        std::fs::remove_file(path).map_err(clean_error)
    }
}

fn ensure_dir(path: &Utf8Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| BootstrapError::Prepare {
        path: path.to_owned(),
        source,
    })
}

/// Exclusive advisory lock held for the duration of a run.
///
/// Dropping the guard closes the file, which releases the lock.
#[derive(Debug)]
struct RunLock {
    _file: File,
}

impl RunLock {
    fn acquire(path: &Utf8Path) -> Result<Self> {
        use fs2::FileExt;

        let prepare_error = |source| BootstrapError::Prepare {
            path: path.to_owned(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(prepare_error)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(err) if is_contended(&err) => Err(BootstrapError::AlreadyRunning {
                path: path.to_owned(),
            }),
            Err(err) => Err(prepare_error(err)),
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Progress lines, suppressed in quiet mode.
struct Progress<'w> {
    out: &'w mut dyn Write,
    quiet: bool,
}

impl<'w> Progress<'w> {
    fn new(out: &'w mut dyn Write, quiet: bool) -> Self {
        Self { out, quiet }
    }

    fn line(&mut self, message: impl std::fmt::Display) {
        if !self.quiet {
            write_line(self.out, message);
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
