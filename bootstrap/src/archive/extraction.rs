//! Archive extraction into a package destination directory.
//!
//! Extraction is idempotent: a destination that already holds content is
//! left alone unless the caller forces a refresh, while a destination that
//! is effectively empty (nothing but the ignore marker) is rebuilt from
//! scratch. Member names are all validated before the destination is
//! touched, so an archive carrying `../` or absolute names never writes a
//! byte.

use super::error::ExtractionError;
use super::format::ArchiveFormat;
use super::path_safety::{
    contains_top, detect_top, resolve_within, strip_top, validate_member_name,
};
use super::reader::{Member, MemberInfo, MemberKind, open_source};
use log::{debug, trace, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the marker file written into every populated destination.
pub const IGNORE_MARKER: &str = ".gitignore";

/// Content of the ignore marker: ignore everything in this directory.
pub const IGNORE_MARKER_CONTENT: &str = "*\n";

/// Permission bits honoured when restoring archived file modes.
#[cfg(unix)]
const PERMISSION_MASK: u32 = 0o777;

/// Inputs for one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    /// Archive to unpack.
    pub archive_path: PathBuf,
    /// Directory that receives the archive content.
    pub destination: PathBuf,
    /// Top-level directory to strip, when known ahead of time.
    pub inner_top: Option<String>,
    /// Replace the destination even when it already holds content.
    pub force: bool,
}

impl ExtractRequest {
    /// Build a non-forced request.
    #[must_use]
    pub fn new(archive_path: &Path, destination: &Path, inner_top: Option<&str>) -> Self {
        Self {
            archive_path: archive_path.to_path_buf(),
            destination: destination.to_path_buf(),
            inner_top: inner_top.map(str::to_owned),
            force: false,
        }
    }

    /// Set whether existing content is replaced.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of a successful extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The archive was unpacked.
    Extracted {
        /// Number of regular files written.
        files: usize,
        /// Top-level directory that was stripped, if any.
        stripped_top: Option<String>,
    },
    /// The destination already held content and was left untouched.
    SkippedPopulated,
}

/// Trait for extracting package archives, enabling test mocking.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use thirdparty_bootstrap::archive::extraction::{ExtractRequest, Extractor, SafeExtractor};
///
/// let request = ExtractRequest::new(
///     Path::new(".bootstrap_cache/glfw-3.4.tar.gz"),
///     Path::new("src/thirdparty/glfw"),
///     Some("glfw-3.4"),
/// );
/// let outcome = SafeExtractor.extract(&request);
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Extractor {
    /// Unpack `request.archive_path` into `request.destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedFormat`] for unknown suffixes,
    /// [`ExtractionError::PathTraversal`] when a member would escape the
    /// destination, [`ExtractionError::MissingTopDirectory`] when the
    /// declared top directory cannot be found or inferred, and
    /// [`ExtractionError::Io`] on filesystem failures.
    fn extract(&self, request: &ExtractRequest) -> Result<ExtractOutcome, ExtractionError>;
}

/// Production extractor backed by the tar and zip readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeExtractor;

impl Extractor for SafeExtractor {
    fn extract(&self, request: &ExtractRequest) -> Result<ExtractOutcome, ExtractionError> {
        extract_archive(request)
    }
}

/// Return true when `dir` is absent, empty, or holds only the ignore marker.
///
/// # Errors
///
/// Returns an I/O error when an existing directory cannot be listed.
pub fn is_effectively_empty(dir: &Path) -> io::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    let mut entries = fs::read_dir(dir)?;
    let Some(first) = entries.next().transpose()? else {
        return Ok(true);
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    Ok(first.file_name() == IGNORE_MARKER && first.file_type()?.is_file())
}

/// Clear read-only permissions on `root` and everything beneath it.
///
/// Failures on individual entries are logged and skipped so that one
/// unreadable file cannot block cleanup of the rest of the tree. Links are
/// not followed. Returns the number of entries that could not be fixed.
pub fn make_tree_writable(root: &Path) -> usize {
    let mut failures = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("cannot inspect {}: {err}", path.display());
                failures += 1;
                continue;
            }
        };
        if metadata.file_type().is_symlink() {
            continue;
        }
        if let Err(err) = grant_owner_write(&path, &metadata) {
            warn!("cannot make {} writable: {err}", path.display());
            failures += 1;
        }
        if metadata.is_dir() {
            match fs::read_dir(&path) {
                Ok(entries) => pending.extend(entries.filter_map(|entry| match entry {
                    Ok(entry) => Some(entry.path()),
                    Err(err) => {
                        warn!("cannot list entry in {}: {err}", path.display());
                        None
                    }
                })),
                Err(err) => {
                    warn!("cannot list {}: {err}", path.display());
                    failures += 1;
                }
            }
        }
    }

    failures
}

#[cfg(unix)]
fn grant_owner_write(path: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let wanted = if metadata.is_dir() { 0o700 } else { 0o600 };
    if mode & wanted == wanted {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | wanted))
}

#[cfg(not(unix))]
fn grant_owner_write(path: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

/// Remove a directory tree after making it writable.
///
/// # Errors
///
/// Returns the error from the final removal; permission fix-ups are
/// best-effort.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let failures = make_tree_writable(path);
    if failures > 0 {
        debug!(
            "{failures} entries under {} could not be made writable",
            path.display()
        );
    }
    fs::remove_dir_all(path)
}

/// Write the ignore marker into `dir` unless one already exists.
///
/// Returns true when a marker was created.
///
/// # Errors
///
/// Returns an I/O error if the marker cannot be written.
pub fn write_ignore_marker(dir: &Path) -> io::Result<bool> {
    let marker = dir.join(IGNORE_MARKER);
    if marker.exists() {
        return Ok(false);
    }
    fs::write(&marker, IGNORE_MARKER_CONTENT)?;
    Ok(true)
}

/// Unpack an archive according to `request`.
///
/// # Errors
///
/// See [`Extractor::extract`].
pub fn extract_archive(request: &ExtractRequest) -> Result<ExtractOutcome, ExtractionError> {
    let destination = request.destination.as_path();

    if destination.exists() && !request.force && !is_effectively_empty(destination)? {
        debug!(
            "{} already populated; skipping extraction",
            destination.display()
        );
        return Ok(ExtractOutcome::SkippedPopulated);
    }

    let format = ArchiveFormat::from_path(&request.archive_path)?;
    let source = open_source(format, &request.archive_path);

    let members = source.member_names()?;
    for member in &members {
        validate_member_name(&member.name)?;
    }
    let top = choose_top(&request.archive_path, &members, request.inner_top.as_deref())?;
    debug!(
        "extracting {} ({} members, top {:?}) into {}",
        request.archive_path.display(),
        members.len(),
        top,
        destination.display()
    );

    if destination.exists() {
        remove_tree(destination)?;
    }
    fs::create_dir_all(destination)?;
    let root = destination.canonicalize()?;

    let mut files = 0;
    let result = source.unpack_members(&mut |member: Member<'_>| {
        if write_member(&root, top.as_deref(), member)? {
            files += 1;
        }
        Ok(())
    });

    if let Err(err) = result {
        if let Err(cleanup) = remove_tree(destination) {
            warn!(
                "could not remove partial extraction at {}: {cleanup}",
                destination.display()
            );
        }
        return Err(err);
    }

    write_ignore_marker(destination)?;
    Ok(ExtractOutcome::Extracted {
        files,
        stripped_top: top,
    })
}

/// Decide which top-level directory to strip.
///
/// A declared top is used when any member lives beneath it; otherwise the
/// inferred top is used. A declared top that matches nothing, in an archive
/// with no inferable top, is an error, except for empty archives.
fn choose_top(
    archive: &Path,
    members: &[MemberInfo],
    declared: Option<&str>,
) -> Result<Option<String>, ExtractionError> {
    let inferred = detect_top(members);
    let Some(declared) = declared else {
        return Ok(inferred);
    };
    if contains_top(members, declared) {
        return Ok(Some(declared.to_owned()));
    }
    if let Some(inferred) = inferred {
        warn!(
            "{} has no top directory {declared}; stripping {inferred} instead",
            archive.display()
        );
        return Ok(Some(inferred));
    }
    if members.iter().all(|m| m.kind == MemberKind::Other) {
        return Ok(None);
    }
    Err(ExtractionError::MissingTopDirectory {
        archive: archive.to_path_buf(),
        expected: declared.to_owned(),
    })
}

/// Write one member beneath `root`. Returns true when a file was written.
fn write_member(
    root: &Path,
    top: Option<&str>,
    member: Member<'_>,
) -> Result<bool, ExtractionError> {
    let Member { info, content } = member;
    validate_member_name(&info.name)?;

    match info.kind {
        MemberKind::Link | MemberKind::Other => {
            trace!("skipping {:?} member {}", info.kind, info.name);
            return Ok(false);
        }
        MemberKind::Directory | MemberKind::File => {}
    }

    let relative = strip_top(&info.name, top);
    let target = resolve_within(root, &relative)?;

    if info.kind == MemberKind::Directory {
        fs::create_dir_all(&target)?;
        return Ok(false);
    }
    if relative.is_empty() {
        warn!("skipping file member {} that maps onto the destination root", info.name);
        return Ok(false);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(&target).is_ok_and(|m| m.is_dir()) {
        return Err(ExtractionError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} is a directory", target.display()),
        )));
    }
    let mut file = fs::File::create(&target)?;
    io::copy(content, &mut file)?;
    drop(file);
    apply_mode(&target, info.mode)?;
    Ok(true)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode.map(|m| m & PERMISSION_MASK) {
        Some(bits) if bits != 0 => {
            // Keep the file owner-writable so later runs can clean it up.
            fs::set_permissions(path, fs::Permissions::from_mode(bits | 0o200))
        }
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
