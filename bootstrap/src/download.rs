//! Archive download over HTTP(S).
//!
//! Provides a trait-based abstraction for fetching one package archive
//! into the cache, enabling dependency injection for testing. Downloads
//! stream into a temporary file beside the cache entry and are renamed
//! into place only once the body has been read completely, so an
//! interrupted transfer never leaves a truncated archive behind.

use crate::output::{download_progress_line, write_line};
use log::debug;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Connection timeout for archive downloads.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Time allowed for the server to start responding.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
/// Size of each read from the response body.
const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;
/// User-Agent header sent with every request.
const USER_AGENT: &str = concat!("thirdparty-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Trait for downloading package archives.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use thirdparty_bootstrap::download::{Downloader, HttpDownloader};
///
/// let downloader = HttpDownloader::new(false);
/// let bytes = downloader.download(
///     "https://github.com/glfw/glfw/archive/refs/tags/3.4.tar.gz",
///     Path::new(".bootstrap_cache/glfw-3.4.tar.gz"),
/// );
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Downloader {
    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with an
    /// error status, or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Errors arising from archive downloads.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested archive was not found (HTTP 404).
    #[error("archive not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP-based downloader using `ureq`.
///
/// Progress is drawn on stdout, on a single line rewritten per chunk.
#[derive(Debug, Clone, Copy)]
pub struct HttpDownloader {
    show_progress: bool,
}

impl HttpDownloader {
    /// Create a downloader that draws progress when `show_progress` is set.
    #[must_use]
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        debug!("GET {url}");
        let response = http_agent()
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let mut body = response.into_body();
        let total = body.content_length();
        let display_name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_owned());

        let mut stdout = std::io::stdout();
        let mut report = |read: u64| {
            if self.show_progress {
                let line = download_progress_line(&display_name, read, total);
                if write!(stdout, "\r{line}").and_then(|()| stdout.flush()).is_err() {
                    // Progress is cosmetic; ignore terminal write failures.
                }
            }
        };

        let written = stream_to_file(&mut body.as_reader(), dest, &mut report).map_err(|err| {
            DownloadError::HttpError {
                url: url.to_owned(),
                reason: err.to_string(),
            }
        })?;
        if self.show_progress {
            write_line(&mut std::io::stdout(), "");
        }
        Ok(written)
    }
}

/// Copy `reader` into a temporary sibling of `dest`, then rename it over
/// `dest`.
///
/// `report` receives the running byte count after every chunk.
///
/// # Errors
///
/// Returns an I/O error if reading, writing, or the final rename fails.
pub fn stream_to_file(
    reader: &mut dyn Read,
    dest: &Path,
    report: &mut dyn FnMut(u64),
) -> std::io::Result<u64> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;

    let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        temp.write_all(buffer.get(..bytes_read).unwrap_or_default())?;
        written = written.saturating_add(u64::try_from(bytes_read).unwrap_or(u64::MAX));
        report(written);
    }
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|err| err.error)?;
    Ok(written)
}

/// Shared `ureq` agent with timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(RESPONSE_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(code) => DownloadError::HttpError {
            url: url.to_owned(),
            reason: format!("HTTP error {code}"),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
