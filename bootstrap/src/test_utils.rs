//! Shared test utilities for the bootstrap crate.
//!
//! Archive builders write member names verbatim into tar headers and zip
//! directories, so fixtures can carry `../` segments and absolute names
//! that ordinary archiving tools refuse to produce.

use crate::download::{DownloadError, Downloader};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::path::Path;

/// One member of a fixture archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEntry {
    /// A directory entry.
    Dir {
        /// Raw member name.
        name: String,
    },
    /// A regular file.
    File {
        /// Raw member name.
        name: String,
        /// File content.
        content: Vec<u8>,
        /// Unix permission bits.
        mode: u32,
    },
    /// A symbolic link.
    Symlink {
        /// Raw member name.
        name: String,
        /// Link target.
        target: String,
    },
    /// A hard link. Zip fixtures store it as a symbolic link.
    HardLink {
        /// Raw member name.
        name: String,
        /// Link target.
        target: String,
    },
}

impl FixtureEntry {
    /// A directory entry.
    #[must_use]
    pub fn dir(name: &str) -> Self {
        Self::Dir {
            name: name.to_owned(),
        }
    }

    /// A regular file with mode `0o644`.
    #[must_use]
    pub fn file(name: &str, content: &[u8]) -> Self {
        Self::File {
            name: name.to_owned(),
            content: content.to_vec(),
            mode: 0o644,
        }
    }

    /// A regular file with mode `0o755`.
    #[must_use]
    pub fn executable(name: &str, content: &[u8]) -> Self {
        Self::File {
            name: name.to_owned(),
            content: content.to_vec(),
            mode: 0o755,
        }
    }

    /// A symbolic link to `target`.
    #[must_use]
    pub fn symlink(name: &str, target: &str) -> Self {
        Self::Symlink {
            name: name.to_owned(),
            target: target.to_owned(),
        }
    }

    /// A hard link to `target`.
    #[must_use]
    pub fn hard_link(name: &str, target: &str) -> Self {
        Self::HardLink {
            name: name.to_owned(),
            target: target.to_owned(),
        }
    }
}

/// Compression applied to a fixture tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCodec {
    /// No compression.
    Plain,
    /// gzip.
    Gzip,
    /// bzip2.
    Bzip2,
    /// xz.
    Xz,
    /// Zstandard.
    Zstd,
}

/// Build a tar archive holding `entries`, compressed with `codec`.
///
/// # Errors
///
/// Returns an error when a name does not fit a classic tar header or
/// compression fails.
pub fn tar_bytes(entries: &[FixtureEntry], codec: TarCodec) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        match entry {
            FixtureEntry::Dir { name } => {
                let header = tar_header(name, tar::EntryType::Directory, 0, 0o755, None)?;
                builder.append(&header, io::empty())?;
            }
            FixtureEntry::File {
                name,
                content,
                mode,
            } => {
                let size = u64::try_from(content.len()).map_err(io::Error::other)?;
                let header = tar_header(name, tar::EntryType::Regular, size, *mode, None)?;
                builder.append(&header, content.as_slice())?;
            }
            FixtureEntry::Symlink { name, target } => {
                let header =
                    tar_header(name, tar::EntryType::Symlink, 0, 0o777, Some(target))?;
                builder.append(&header, io::empty())?;
            }
            FixtureEntry::HardLink { name, target } => {
                let header = tar_header(name, tar::EntryType::Link, 0, 0o644, Some(target))?;
                builder.append(&header, io::empty())?;
            }
        }
    }
    let tar = builder.into_inner()?;
    compress(&tar, codec)
}

fn tar_header(
    name: &str,
    kind: tar::EntryType,
    size: u64,
    mode: u32,
    link_target: Option<&str>,
) -> io::Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    copy_raw(&mut header.as_old_mut().name, name)?;
    if let Some(target) = link_target {
        copy_raw(&mut header.as_old_mut().linkname, target)?;
    }
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_cksum();
    Ok(header)
}

fn copy_raw(slot: &mut [u8; 100], value: &str) -> io::Result<()> {
    let bytes = value.as_bytes();
    let target = slot.get_mut(..bytes.len()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{value} does not fit a tar header"),
        )
    })?;
    target.copy_from_slice(bytes);
    Ok(())
}

fn compress(tar: &[u8], codec: TarCodec) -> io::Result<Vec<u8>> {
    match codec {
        TarCodec::Plain => Ok(tar.to_vec()),
        TarCodec::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(tar)?;
            encoder.finish()
        }
        TarCodec::Bzip2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(tar)?;
            encoder.finish()
        }
        TarCodec::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(tar)?;
            encoder.finish()
        }
        TarCodec::Zstd => zstd::encode_all(tar, 0),
    }
}

/// Build a zip archive holding `entries`.
///
/// # Errors
///
/// Returns an error when the zip writer fails.
pub fn zip_bytes(entries: &[FixtureEntry]) -> io::Result<Vec<u8>> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        match entry {
            FixtureEntry::Dir { name } => {
                let options = SimpleFileOptions::default().unix_permissions(0o755);
                writer
                    .add_directory(name.as_str(), options)
                    .map_err(io::Error::other)?;
            }
            FixtureEntry::File {
                name,
                content,
                mode,
            } => {
                let options = SimpleFileOptions::default().unix_permissions(*mode);
                writer
                    .start_file(name.as_str(), options)
                    .map_err(io::Error::other)?;
                writer.write_all(content)?;
            }
            FixtureEntry::Symlink { name, target } | FixtureEntry::HardLink { name, target } => {
                writer
                    .add_symlink(name.as_str(), target.as_str(), SimpleFileOptions::default())
                    .map_err(io::Error::other)?;
            }
        }
    }
    let cursor = writer.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}

/// Write a tar fixture to `path`.
///
/// # Errors
///
/// See [`tar_bytes`]; also fails when the file cannot be written.
pub fn write_tar(path: &Path, entries: &[FixtureEntry], codec: TarCodec) -> io::Result<()> {
    std::fs::write(path, tar_bytes(entries, codec)?)
}

/// Write a zip fixture to `path`.
///
/// # Errors
///
/// See [`zip_bytes`]; also fails when the file cannot be written.
pub fn write_zip(path: &Path, entries: &[FixtureEntry]) -> io::Result<()> {
    std::fs::write(path, zip_bytes(entries)?)
}

/// The `foo-2.0` source tree: a README and one C file below a shared top
/// directory.
#[must_use]
pub fn sample_source_tree() -> Vec<FixtureEntry> {
    vec![
        FixtureEntry::dir("foo-2.0/"),
        FixtureEntry::file("foo-2.0/README", b"foo readme\n"),
        FixtureEntry::dir("foo-2.0/src/"),
        FixtureEntry::file("foo-2.0/src/a.c", b"int main(void) { return 0; }\n"),
    ]
}

/// A [`Downloader`] serving canned bytes per URL.
///
/// Unknown URLs fail with [`DownloadError::NotFound`]. Every requested URL
/// is recorded, including failed ones.
#[derive(Debug, Default)]
pub struct StubDownloader {
    responses: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl StubDownloader {
    /// Create a stub with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    #[must_use]
    pub fn with_response(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_owned(), body);
        self
    }

    /// Replace the body served for `url`.
    pub fn set_response(&mut self, url: &str, body: Vec<u8>) {
        self.responses.insert(url.to_owned(), body);
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Downloader for StubDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.calls.borrow_mut().push(url.to_owned());
        let body = self
            .responses
            .get(url)
            .ok_or_else(|| DownloadError::NotFound {
                url: url.to_owned(),
            })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, body)?;
        Ok(u64::try_from(body.len()).unwrap_or(u64::MAX))
    }
}
