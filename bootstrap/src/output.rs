//! User-facing output formatting.
//!
//! Progress reporting goes through an injected writer so that the binary
//! can send it to stdout while tests capture it in a buffer.

use crate::orchestrator::{ExtractStatus, FetchStatus, RunSummary};
use std::io::Write;

const KIB: u64 = 1024;
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Write one line, ignoring failures.
pub fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Format a byte count with one decimal place.
///
/// Units step by 1024 and stop at `GB`.
///
/// # Examples
///
/// ```
/// use thirdparty_bootstrap::output::human_size;
///
/// assert_eq!(human_size(512), "512.0B");
/// assert_eq!(human_size(1536), "1.5KB");
/// assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0GB");
/// ```
#[must_use]
pub fn human_size(bytes: u64) -> String {
    let mut divisor: u128 = 1;
    let mut unit = SIZE_UNITS[0];
    for candidate in SIZE_UNITS {
        unit = candidate;
        if u128::from(bytes) < divisor * u128::from(KIB) || candidate == "GB" {
            break;
        }
        divisor *= u128::from(KIB);
    }
    let tenths = (u128::from(bytes) * 10 + divisor / 2) / divisor;
    format!("{}.{}{unit}", tenths / 10, tenths % 10)
}

/// Format the download progress line for `name`.
///
/// With a known total the line carries a whole-number percentage;
/// otherwise only the running size is shown.
#[must_use]
pub fn download_progress_line(name: &str, read: u64, total: Option<u64>) -> String {
    match total.filter(|t| *t > 0) {
        Some(total) => {
            let pct = u128::from(read) * 100 / u128::from(total);
            format!(
                "  - downloading {name}: {pct}% ({}/{})",
                human_size(read),
                human_size(total)
            )
        }
        None => format!("  - downloading {name}: {}", human_size(read)),
    }
}

/// Render the end-of-run summary.
#[must_use]
pub fn summary_text(summary: &RunSummary) -> String {
    let mut lines = vec![String::new(), "All done".to_owned()];
    for report in &summary.packages {
        let fetch = match report.fetch {
            FetchStatus::Downloaded { .. } => "downloaded",
            FetchStatus::Cached => "cached",
        };
        let extract = match report.extract {
            ExtractStatus::Extracted { .. } => "extracted",
            ExtractStatus::AlreadyPresent => "already present",
            ExtractStatus::SkippedPopulated => "kept existing",
        };
        lines.push(format!("  {}: {fetch}, {extract}", report.key));
    }
    lines.push(format!("- thirdparty root : {}", summary.vendor_dir));
    lines.push(format!("- cache           : {}", summary.cache_dir));
    lines.push(format!("- lockfile        : {}", summary.lockfile));
    lines.join("\n")
}
