//! Uniform member access over tar and zip containers.
//!
//! Each container is opened afresh for every pass, so a member listing
//! can be taken before anything is written and the stream can then be
//! replayed for the actual unpacking.

use super::error::ExtractionError;
use super::format::{ArchiveFormat, TarCompression};
use log::trace;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Unix file-type bits for a symbolic link, as stored in zip attributes.
const UNIX_SYMLINK_BITS: u32 = 0o120_000;
/// Mask selecting the file-type bits of a Unix mode.
const UNIX_FILE_TYPE_MASK: u32 = 0o170_000;

/// What an archive member represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A directory.
    Directory,
    /// A regular file with content.
    File,
    /// A symbolic or hard link. Never materialised.
    Link,
    /// Device nodes, FIFOs, and other special entries. Never materialised.
    Other,
}

/// Name and type of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// The raw member name as stored in the archive.
    pub name: String,
    /// The member type.
    pub kind: MemberKind,
    /// Unix permission bits, when the archive records them.
    pub mode: Option<u32>,
}

impl MemberInfo {
    /// Create member metadata without permission bits.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: None,
        }
    }
}

/// A member handed to an unpacking visitor, with its content stream.
pub struct Member<'a> {
    /// Name, type, and mode of the member.
    pub info: MemberInfo,
    /// The member's content. Empty for anything but regular files.
    pub content: &'a mut dyn Read,
}

/// Callback invoked for every member during an unpacking pass.
pub type MemberVisitor<'v> = dyn FnMut(Member<'_>) -> Result<(), ExtractionError> + 'v;

/// Listing and streaming capability shared by every container.
pub trait MemberSource {
    /// List every member in archive order without reading content.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive cannot be opened or parsed.
    fn member_names(&self) -> Result<Vec<MemberInfo>, ExtractionError>;

    /// Stream every member, in archive order, to `visitor`.
    ///
    /// The first error returned by `visitor` stops the pass.
    ///
    /// # Errors
    ///
    /// Returns container errors, or the error produced by `visitor`.
    fn unpack_members(&self, visitor: &mut MemberVisitor<'_>) -> Result<(), ExtractionError>;
}

/// Open the reader matching `format` for the archive at `path`.
#[must_use]
pub fn open_source(format: ArchiveFormat, path: &Path) -> Box<dyn MemberSource> {
    match format {
        ArchiveFormat::Tar => Box::new(TarStream::new(path)),
        ArchiveFormat::Zip => Box::new(ZipStream::new(path)),
    }
}

/// Tar reader with automatic decompression.
#[derive(Debug, Clone)]
pub struct TarStream {
    path: PathBuf,
}

impl TarStream {
    /// Create a reader for the tar archive at `path`.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn open(&self) -> Result<tar::Archive<Box<dyn Read>>, ExtractionError> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let compression = TarCompression::sniff(reader.fill_buf()?);
        trace!("{} detected as {compression:?}", self.path.display());

        let decoded: Box<dyn Read> = match compression {
            TarCompression::None => Box::new(reader),
            TarCompression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            TarCompression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            TarCompression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
            TarCompression::Zstd => Box::new(zstd::Decoder::with_buffer(reader)?),
        };
        Ok(tar::Archive::new(decoded))
    }
}

fn tar_member_info<R: Read>(entry: &tar::Entry<'_, R>) -> MemberInfo {
    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    let header = entry.header();
    let kind = match header.entry_type() {
        tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
            MemberKind::File
        }
        tar::EntryType::Directory => MemberKind::Directory,
        tar::EntryType::Symlink | tar::EntryType::Link => MemberKind::Link,
        _ => MemberKind::Other,
    };
    MemberInfo {
        name,
        kind,
        mode: header.mode().ok(),
    }
}

impl MemberSource for TarStream {
    fn member_names(&self) -> Result<Vec<MemberInfo>, ExtractionError> {
        let mut archive = self.open()?;
        let mut members = Vec::new();
        for entry in archive.entries()? {
            members.push(tar_member_info(&entry?));
        }
        Ok(members)
    }

    fn unpack_members(&self, visitor: &mut MemberVisitor<'_>) -> Result<(), ExtractionError> {
        let mut archive = self.open()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let info = tar_member_info(&entry);
            visitor(Member {
                info,
                content: &mut entry,
            })?;
        }
        Ok(())
    }
}

/// Zip reader.
#[derive(Debug, Clone)]
pub struct ZipStream {
    path: PathBuf,
}

impl ZipStream {
    /// Create a reader for the zip archive at `path`.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn open(&self) -> Result<zip::ZipArchive<BufReader<File>>, ExtractionError> {
        let reader = BufReader::new(File::open(&self.path)?);
        zip::ZipArchive::new(reader).map_err(|err| self.malformed(&err))
    }

    fn malformed(&self, err: &zip::result::ZipError) -> ExtractionError {
        match err {
            zip::result::ZipError::Io(io) => {
                ExtractionError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => ExtractionError::Archive {
                archive: self.path.clone(),
                reason: other.to_string(),
            },
        }
    }
}

fn zip_member_info(name: &str, is_dir: bool, mode: Option<u32>) -> MemberInfo {
    let kind = if mode.is_some_and(|m| m & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK_BITS) {
        MemberKind::Link
    } else if is_dir {
        MemberKind::Directory
    } else {
        MemberKind::File
    };
    MemberInfo {
        name: name.to_owned(),
        kind,
        mode,
    }
}

impl MemberSource for ZipStream {
    fn member_names(&self) -> Result<Vec<MemberInfo>, ExtractionError> {
        let mut archive = self.open()?;
        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|err| self.malformed(&err))?;
            members.push(zip_member_info(file.name(), file.is_dir(), file.unix_mode()));
        }
        Ok(members)
    }

    fn unpack_members(&self, visitor: &mut MemberVisitor<'_>) -> Result<(), ExtractionError> {
        let mut archive = self.open()?;
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|err| self.malformed(&err))?;
            let info = zip_member_info(file.name(), file.is_dir(), file.unix_mode());
            visitor(Member {
                info,
                content: &mut file,
            })?;
        }
        Ok(())
    }
}
