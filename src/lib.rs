//! # apgbuild Core Library
//!
//! This crate provides the core functionality for the `apgbuild` tool, which
//! builds, inspects and verifies APGv2 packages (`.apg`: an xz-compressed tar
//! of a package directory).
//!
//! ## Key Modules
//!
//! - [`archive`]: Packs a directory tree into a package container.
//! - [`extract`]: Lists and safely unpacks containers, enforcing path safety and resource ceilings.
//! - [`checksum`]: Generates and verifies `crc32sums` manifests.
//! - [`compress`]: LZMA2 (xz) stream encoding and decoding.
//! - [`metadata`]: The `metadata.json` record.
//! - [`builder`]: Package-level workflows used by the CLI.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use apgbuild::{builder, compress::CompressionAlgo, config::ExtractLimits};
//!
//! # fn main() -> apgbuild::Result<()> {
//! builder::create_package(Path::new("hello"), Path::new("hello.apg"), CompressionAlgo::default())?;
//! let report = builder::extract_package(Path::new("hello.apg"), Path::new("out"), &ExtractLimits::default())?;
//! assert!(report.skipped.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod builder;
pub mod checksum;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod compress;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;

pub use error::{ApgError, Result};

// Cross-platform filesystem wrapper
pub mod fsx;
