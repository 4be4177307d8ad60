//! Third-party bootstrap CLI entrypoint.
//!
//! Vendors pinned source archives below the project root. Progress and the
//! final summary go to standard output; failures are reported on standard
//! error with a non-zero exit status.

use clap::Parser;
use log::warn;
use std::io::Write;
use thirdparty_bootstrap::cli::Cli;
use thirdparty_bootstrap::config::{BootstrapConfig, ProjectLayout, resolve_root};
use thirdparty_bootstrap::error::{EXIT_INTERRUPTED, Result};
use thirdparty_bootstrap::orchestrator::{clean, run_bootstrap};
use thirdparty_bootstrap::output::{summary_text, write_line};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    let mut stdout = std::io::stdout();
    let run_result = run(&cli, &mut stdout);
    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        write_line(&mut std::io::stderr(), "\nAborted.");
        std::process::exit(EXIT_INTERRUPTED);
    });
    if let Err(err) = installed {
        warn!("interrupt handler not installed: {err}");
    }
}

fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let root = resolve_root(cli.root.as_deref())?;
    let options = cli.run_options();

    if cli.clean {
        let layout = ProjectLayout::load(&root, cli.config.as_deref())?;
        return clean(&layout, options, out);
    }

    let config = BootstrapConfig::load(&root, cli.config.as_deref())?;
    let summary = run_bootstrap(&config, options, out)?;
    if !options.quiet {
        write_line(out, summary_text(&summary));
    }
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_line(stderr, format!("ERROR: {err}"));
            err.exit_code()
        }
    }
}
