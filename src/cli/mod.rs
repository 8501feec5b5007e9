use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::archive::METADATA_FILE;
use crate::checksum::MANIFEST_FILE;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build, inspect and verify APGv2 packages", long_about = None)]
pub struct Args {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Build a package from a package directory.
    #[command(alias = "c")]
    Create {
        /// Package directory containing metadata.json and data/.
        #[arg(required = true)]
        source: PathBuf,

        /// The path for the output package. Defaults to `<dir name>.apg`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// LZMA2 compression preset (0-9).
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(0..=9),
            default_value_t = crate::compress::DEFAULT_PRESET
        )]
        level: u32,

        /// Write a plain tar stream without compression.
        #[arg(long, conflicts_with = "level")]
        store: bool,
    },

    /// Extract a package.
    #[command(alias = "x")]
    Extract {
        /// The package file to extract.
        #[arg(required = true)]
        package: PathBuf,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Largest single file to extract, in bytes. Larger entries are skipped.
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Largest total declared content size, in bytes.
        #[arg(long)]
        max_archive_size: Option<u64>,

        /// Largest number of entries.
        #[arg(long)]
        max_entries: Option<u64>,
    },

    /// List the contents of a package without extracting it.
    #[command(alias = "l")]
    List {
        #[arg(required = true)]
        package: PathBuf,
    },

    /// Generate a CRC32 checksum manifest for a directory.
    Sums {
        #[arg(required = true)]
        directory: PathBuf,

        #[arg(short, long, default_value = MANIFEST_FILE)]
        output: PathBuf,
    },

    /// Verify files against a checksum manifest.
    Verify {
        #[arg(required = true)]
        manifest: PathBuf,

        /// Directory the manifest paths are relative to.
        #[arg(short, long, default_value = ".")]
        base: PathBuf,
    },

    /// Interactively write a metadata.json.
    Metadata {
        #[arg(short, long, default_value = METADATA_FILE)]
        output: PathBuf,
    },
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::try_parse()?)
}
