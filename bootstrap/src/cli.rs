//! CLI argument definitions for the bootstrapper.
//!
//! Kept apart from the entrypoint so that parsing can be tested without
//! touching the filesystem or the network.

use crate::orchestrator::RunOptions;
use camino::Utf8PathBuf;
use clap::Parser;
use log::LevelFilter;

/// Fetch, verify, and unpack vendored third-party sources.
#[derive(Parser, Debug, Default)]
#[command(name = "thirdparty-bootstrap")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, verify, and unpack vendored third-party sources.\n\n",
    "Every declared package is downloaded into the cache (unless already ",
    "cached), hashed, checked against the SHA-256 pinned in the lockfile, and ",
    "extracted below the vendor root with its top-level directory stripped. ",
    "Runs are idempotent: with a warm cache and populated destinations, a ",
    "rerun performs no network requests and rewrites nothing but the lockfile.\n\n",
    "Packages are declared in bootstrap.toml at the project root; without one, ",
    "the built-in GLFW and cglm pins are used.",
))]
#[command(after_help = concat!(
    "EXIT STATUS:\n",
    "  0    success\n",
    "  1    any failure (message on standard error)\n",
    "  130  interrupted\n\n",
    "EXAMPLES:\n",
    "  Vendor every declared package:\n",
    "    $ thirdparty-bootstrap\n\n",
    "  Re-download and re-extract everything:\n",
    "    $ thirdparty-bootstrap --force\n\n",
    "  Remove the vendor root and the download cache:\n",
    "    $ thirdparty-bootstrap --clean",
))]
pub struct Cli {
    /// Re-download and re-extract every package.
    #[arg(long, conflicts_with = "clean")]
    pub force: bool,

    /// Remove the vendor root and the download cache, then exit.
    #[arg(long)]
    pub clean: bool,

    /// Project root [default: current directory].
    #[arg(long, value_name = "DIR")]
    pub root: Option<Utf8PathBuf>,

    /// Configuration file [default: <root>/bootstrap.toml].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Increase diagnostic logging (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Cli {
    /// Run flags derived from the command line.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            force: self.force,
            quiet: self.quiet,
        }
    }

    /// Default log level when `RUST_LOG` is unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use log::LevelFilter;
    /// use thirdparty_bootstrap::cli::Cli;
    ///
    /// let cli = Cli::parse_from(["thirdparty-bootstrap", "-vv"]);
    /// assert_eq!(cli.log_level(), LevelFilter::Debug);
    /// ```
    #[must_use]
    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
