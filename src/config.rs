//! Extraction resource ceilings.
//!
//! Limits travel with each extraction call instead of living in constants, so
//! callers (and the CLI) can tighten or relax them without recompiling.

use crate::error::{ApgError, Result};

/// Largest single regular file extracted by default (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Largest cumulative declared content size by default (1 GiB).
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 1024 * 1024 * 1024;
/// Largest number of entries processed by default.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

pub const ENV_MAX_FILE_SIZE: &str = "APGBUILD_MAX_FILE_SIZE";
pub const ENV_MAX_ARCHIVE_SIZE: &str = "APGBUILD_MAX_ARCHIVE_SIZE";
pub const ENV_MAX_ENTRIES: &str = "APGBUILD_MAX_ENTRIES";

/// Ceilings applied while unpacking untrusted containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Regular-file entries declaring more than this are skipped.
    pub max_file_size: u64,
    /// Cumulative declared size above this aborts the extraction.
    pub max_archive_size: u64,
    /// Processing more entries than this aborts the extraction.
    pub max_entries: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_archive_size: DEFAULT_MAX_ARCHIVE_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

fn parse_env(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ApgError::InvalidInput(format!("{name}={value:?}: {e}")))
}

impl ExtractLimits {
    /// Defaults overlaid with the `APGBUILD_MAX_*` environment variables, then
    /// with explicit overrides, validated once at the end.
    pub fn from_env_with_overrides(
        max_file_size: Option<u64>,
        max_archive_size: Option<u64>,
        max_entries: Option<u64>,
    ) -> Result<Self> {
        Self::lookup_with_overrides(
            |name| std::env::var(name).ok(),
            max_file_size,
            max_archive_size,
            max_entries,
        )
    }

    /// Like [`ExtractLimits::from_env_with_overrides`] but reading variables through `lookup`.
    pub fn lookup_with_overrides<F>(
        lookup: F,
        max_file_size: Option<u64>,
        max_archive_size: Option<u64>,
        max_entries: Option<u64>,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::read_lookup(lookup)?.with_overrides(max_file_size, max_archive_size, max_entries)
    }

    /// Defaults overlaid with the variables `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let limits = Self::read_lookup(lookup)?;
        limits.validate()?;
        Ok(limits)
    }

    fn read_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut limits = Self::default();
        if let Some(v) = lookup(ENV_MAX_FILE_SIZE) {
            limits.max_file_size = parse_env(ENV_MAX_FILE_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_ARCHIVE_SIZE) {
            limits.max_archive_size = parse_env(ENV_MAX_ARCHIVE_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_ENTRIES) {
            limits.max_entries = parse_env(ENV_MAX_ENTRIES, &v)?;
        }
        Ok(limits)
    }

    /// Applies explicit overrides on top of `self`.
    pub fn with_overrides(
        mut self,
        max_file_size: Option<u64>,
        max_archive_size: Option<u64>,
        max_entries: Option<u64>,
    ) -> Result<Self> {
        if let Some(v) = max_file_size {
            self.max_file_size = v;
        }
        if let Some(v) = max_archive_size {
            self.max_archive_size = v;
        }
        if let Some(v) = max_entries {
            self.max_entries = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 || self.max_archive_size == 0 || self.max_entries == 0 {
            return Err(ApgError::InvalidInput(
                "extraction limits must be greater than zero".into(),
            ));
        }
        if self.max_file_size > self.max_archive_size {
            return Err(ApgError::InvalidInput(format!(
                "per-file limit {} exceeds archive limit {}",
                self.max_file_size, self.max_archive_size
            )));
        }
        Ok(())
    }
}
