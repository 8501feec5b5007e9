//! Package-level workflows on top of the archive engine and the checksum
//! manifest. These are what the CLI calls.

use std::path::Path;

use crate::archive::{self, PackStats, METADATA_FILE};
use crate::checksum::{self, VerifyReport, HOME_MANIFEST_FILE, MANIFEST_FILE};
use crate::compress::CompressionAlgo;
use crate::config::ExtractLimits;
use crate::error::{ApgError, Result};
use crate::extract::{self, ExtractReport};
use crate::fsx as fs;
use crate::metadata::PackageMetadata;

/// Tree holding files installed under `/`.
pub const DATA_DIR: &str = "data";
/// Tree holding files installed under the user's home directory.
pub const HOME_DIR: &str = "home";

/// What [`create_package`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub stats: PackStats,
    /// Records written to `crc32sums`, if `data/` exists.
    pub data_checksums: Option<usize>,
    /// Records written to `crc32sums.home`, if `home/` exists and hashing succeeded.
    pub home_checksums: Option<usize>,
    /// Package name from `metadata.json`, when it loaded and validated.
    pub package_name: Option<String>,
}

fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ApgError::InvalidInput(format!(
            "directory does not exist: {}",
            path.display()
        )))
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ApgError::InvalidInput(format!(
            "package does not exist: {}",
            path.display()
        )))
    }
}

fn check_metadata(source: &Path) -> Option<String> {
    let path = source.join(METADATA_FILE);
    if !path.exists() {
        // pack_directory reports the missing file itself
        return None;
    }
    match PackageMetadata::load(&path).and_then(|m| m.validate().map(|()| m)) {
        Ok(meta) => {
            tracing::info!(name = %meta.name, version = %meta.version, "package metadata");
            Some(meta.name)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "invalid {METADATA_FILE}: {e}");
            None
        }
    }
}

/// Builds a package from `source`, refreshing its checksum manifests first.
pub fn create_package(
    source: &Path,
    output: &Path,
    algo: CompressionAlgo,
) -> Result<PackageSummary> {
    require_dir(source)?;
    let mut summary = PackageSummary {
        package_name: check_metadata(source),
        ..PackageSummary::default()
    };

    let data = source.join(DATA_DIR);
    if data.is_dir() {
        let records = checksum::generate_manifest(&data, &source.join(MANIFEST_FILE))?;
        summary.data_checksums = Some(records.len());
    }
    let home = source.join(HOME_DIR);
    if home.is_dir() {
        match checksum::generate_manifest(&home, &source.join(HOME_MANIFEST_FILE)) {
            Ok(records) => summary.home_checksums = Some(records.len()),
            Err(e) => tracing::warn!("could not write {HOME_MANIFEST_FILE}: {e}"),
        }
    }

    summary.stats = archive::pack_directory(source, output, algo)?;
    Ok(summary)
}

/// Unpacks `package` into `dest`, creating `dest` when needed.
pub fn extract_package(
    package: &Path,
    dest: &Path,
    limits: &ExtractLimits,
) -> Result<ExtractReport> {
    require_file(package)?;
    fs::create_dir_all(dest).map_err(ApgError::at(dest))?;
    extract::unpack(package, dest, limits)
}

/// Writes a manifest for every regular file under `directory`.
pub fn generate_checksums(directory: &Path, output: &Path) -> Result<usize> {
    require_dir(directory)?;
    Ok(checksum::generate_manifest(directory, output)?.len())
}

pub fn verify_checksums(manifest: &Path, base: &Path) -> Result<VerifyReport> {
    checksum::verify_manifest(manifest, base)
}

/// Entry paths of `package`, in stored order.
pub fn list_package(package: &Path) -> Result<Vec<String>> {
    require_file(package)?;
    extract::list_entries(package)
}
