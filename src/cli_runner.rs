//! Command dispatch for the `apgbuild` binary.
//!
//! Results go to stdout; diagnostics go through `tracing` to stderr.

use std::io::{self, Write};
use std::path::PathBuf;

use crate::archive;
use crate::builder;
use crate::cli::{self, Args, Commands};
use crate::compress::CompressionAlgo;
use crate::config::ExtractLimits;
use crate::metadata::Wizard;
use tracing_subscriber::EnvFilter;

/// Outcome the binary maps to its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The command ran but found problems (verification failures).
    Failed,
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Parses the command line and runs the selected command.
pub fn run_cli_app() -> Result<Outcome, Box<dyn std::error::Error>> {
    let args = cli::run()?;
    init_logging(args.verbose);
    run_command(args)
}

pub fn run_command(args: Args) -> Result<Outcome, Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Create { source, output, level, store } => {
            let output = output.unwrap_or_else(|| archive::default_package_name(&source));
            let algo = if store { CompressionAlgo::Store } else { CompressionAlgo::lzma2(level)? };
            let summary = builder::create_package(&source, &output, algo)?;
            writeln!(
                out,
                "Created {} ({} files, {} bytes)",
                output.display(),
                summary.stats.files_added,
                summary.stats.total_size
            )?;
        }
        Commands::Extract { package, output, max_file_size, max_archive_size, max_entries } => {
            let limits = ExtractLimits::from_env_with_overrides(
                max_file_size,
                max_archive_size,
                max_entries,
            )?;
            let dest = output.unwrap_or_else(|| PathBuf::from("."));
            let report = builder::extract_package(&package, &dest, &limits)?;
            writeln!(
                out,
                "Extracted {} entries ({} bytes) to {}",
                report.files_extracted,
                report.bytes_written,
                dest.display()
            )?;
            for skipped in &report.skipped {
                writeln!(out, "  skipped {}: {}", skipped.path, skipped.reason)?;
            }
        }
        Commands::List { package } => {
            for name in builder::list_package(&package)? {
                writeln!(out, "{name}")?;
            }
        }
        Commands::Sums { directory, output } => {
            let count = builder::generate_checksums(&directory, &output)?;
            writeln!(out, "Wrote {count} checksums to {}", output.display())?;
        }
        Commands::Verify { manifest, base } => {
            let report = builder::verify_checksums(&manifest, &base)?;
            for path in &report.passed {
                writeln!(out, "OK      {path}")?;
            }
            for path in &report.failed {
                writeln!(out, "FAILED  {path}")?;
            }
            writeln!(out, "Passed: {}, Failed: {}", report.passed.len(), report.failed.len())?;
            if !report.is_clean() {
                return Ok(Outcome::Failed);
            }
        }
        Commands::Metadata { output } => {
            let stdin = io::stdin();
            let meta = Wizard::new(stdin.lock(), &mut out).run()?;
            meta.save(&output)?;
            writeln!(out, "Wrote {}", output.display())?;
        }
    }

    Ok(Outcome::Success)
}
