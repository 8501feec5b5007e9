//! # Extraction Module
//!
//! Streams a container back onto disk. Every decoded header counts toward
//! the entry ceiling, skipped or not, and breaching it aborts everything.
//! Each entry then goes through the same gate, in this order:
//!
//! 1. path safety ([`safety`]); failures are skipped with a warning,
//! 2. per-file size ceiling; oversized files are skipped with a warning,
//! 3. cumulative declared size ceiling; breaching it aborts everything,
//! 4. materialisation.
//!
//! A `./` entry naming the destination itself is accepted silently.
//!
//! A single poisoned entry never prevents the rest of the package from being
//! extracted, while a structurally abusive archive stops at the first entry
//! that crosses a global ceiling.

pub mod safety;

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::common::{ArchiveEntry, EntryKind};
use crate::compress;
use crate::config::ExtractLimits;
use crate::error::{ApgError, LimitKind, Result, UnsafePathReason};
use crate::fsx as fs;

/// Why an entry was left out of the extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry path failed the safety check.
    Unsafe(UnsafePathReason),
    /// The hard-link target failed the safety check.
    UnsafeLinkTarget(UnsafePathReason),
    /// The entry declared more bytes than the per-file ceiling.
    TooLarge { size: u64, ceiling: u64 },
    /// FIFOs, devices and other entry types we do not materialise.
    Unsupported(u8),
    /// Creating a symlink or hard link failed.
    LinkFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unsafe(reason) => write!(f, "unsafe path ({reason})"),
            SkipReason::UnsafeLinkTarget(reason) => write!(f, "unsafe link target ({reason})"),
            SkipReason::TooLarge { size, ceiling } => {
                write!(f, "file too large ({size} bytes, limit {ceiling})")
            }
            SkipReason::Unsupported(flag) => {
                write!(f, "unsupported entry type '{}'", char::from(*flag))
            }
            SkipReason::LinkFailed(msg) => write!(f, "link failed: {msg}"),
        }
    }
}

/// An entry that was reported and left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

/// Outcome of a completed extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Entries materialised on disk (files, directories and links).
    pub files_extracted: u64,
    /// Content bytes written for regular files.
    pub bytes_written: u64,
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    fn skip(&mut self, path: &str, reason: SkipReason) {
        match &reason {
            SkipReason::Unsafe(r) | SkipReason::UnsafeLinkTarget(r) => {
                let violation = ApgError::SecurityViolation {
                    path: path.to_string(),
                    reason: *r,
                };
                tracing::warn!("skipping entry: {violation}");
            }
            other => tracing::warn!(path, "skipping entry: {other}"),
        }
        self.skipped.push(SkippedEntry {
            path: path.to_string(),
            reason,
        });
    }
}

/// Running totals checked against the global ceilings.
struct Budget<'a> {
    limits: &'a ExtractLimits,
    declared_size: u64,
    entries: u64,
}

impl Budget<'_> {
    fn count_entry(&mut self) -> Result<()> {
        self.entries += 1;
        if self.entries > self.limits.max_entries {
            return Err(ApgError::ResourceLimitExceeded {
                limit: LimitKind::EntryCount,
                value: self.entries,
                ceiling: self.limits.max_entries,
            });
        }
        Ok(())
    }

    fn charge_size(&mut self, size: u64) -> Result<()> {
        self.declared_size = self.declared_size.saturating_add(size);
        if self.declared_size > self.limits.max_archive_size {
            return Err(ApgError::ResourceLimitExceeded {
                limit: LimitKind::ArchiveSize,
                value: self.declared_size,
                ceiling: self.limits.max_archive_size,
            });
        }
        Ok(())
    }
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> std::result::Result<String, UnsafePathReason> {
    let raw = entry.path_bytes();
    if raw.contains(&0) {
        return Err(UnsafePathReason::NulByte);
    }
    String::from_utf8(raw.into_owned()).map_err(|_| UnsafePathReason::NonUtf8)
}

fn describe<R: Read>(entry: &tar::Entry<'_, R>, relative_path: String) -> Option<ArchiveEntry> {
    let header = entry.header();
    let kind = EntryKind::from_tar(header.entry_type())?;
    let link_target = match kind {
        EntryKind::Symlink | EntryKind::HardLink => entry
            .link_name_bytes()
            .map(|raw| String::from_utf8_lossy(&raw).into_owned()),
        _ => None,
    };
    Some(ArchiveEntry {
        relative_path,
        kind,
        mode: header.mode().unwrap_or(0o644),
        size: entry.size(),
        link_target,
        mtime: header.mtime().unwrap_or(0),
    })
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(ApgError::at(parent))?;
    }
    Ok(())
}

/// Writes the bytes of `content` to `target`, replacing whatever file was there.
fn write_file<R: Read>(target: &Path, mode: u32, content: &mut R) -> Result<u64> {
    ensure_parent(target)?;
    // never write through a link left by a previous extraction
    if fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(target).map_err(ApgError::at(target))?;
    }
    let mut out = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(target)
        .map_err(ApgError::at(target))?;
    let written = io::copy(content, &mut out).map_err(ApgError::at(target))?;
    drop(out);
    fs::set_unix_permissions(target, mode).map_err(ApgError::at(target))?;
    Ok(written)
}

/// Extracts the container at `archive_path` into `dest_dir`.
///
/// `dest_dir` is created if missing. Unsafe or oversized entries are skipped
/// and listed in the report; breaching a global ceiling returns
/// [`ApgError::ResourceLimitExceeded`] and leaves whatever was already written.
pub fn unpack(
    archive_path: &Path,
    dest_dir: &Path,
    limits: &ExtractLimits,
) -> Result<ExtractReport> {
    limits.validate()?;
    fs::create_dir_all(dest_dir).map_err(ApgError::at(dest_dir))?;
    let root = dest_dir.canonicalize().map_err(ApgError::at(dest_dir))?;
    tracing::info!(archive = %archive_path.display(), dest = %root.display(), "extracting");

    let reader = compress::open_decompressed(archive_path)?;
    let mut archive = tar::Archive::new(reader);
    let mut report = ExtractReport::default();
    let mut budget = Budget {
        limits,
        declared_size: 0,
        entries: 0,
    };
    // applied after the stream so read-only directories do not block their children
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for entry in archive.entries().map_err(ApgError::at(archive_path))? {
        let mut entry = entry.map_err(ApgError::at(archive_path))?;
        budget.count_entry()?;

        let relative = match entry_path(&entry) {
            Ok(path) => path,
            Err(reason) => {
                let shown = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                report.skip(&shown, SkipReason::Unsafe(reason));
                continue;
            }
        };
        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() && safety::names_root(&relative) {
            tracing::debug!(path = %relative, "root directory entry");
            continue;
        }
        let target = match safety::resolve_within(&root, &relative) {
            Ok(target) => target,
            Err(reason) => {
                report.skip(&relative, SkipReason::Unsafe(reason));
                continue;
            }
        };

        let size = entry.size();
        if EntryKind::from_tar(entry_type) == Some(EntryKind::File) && size > limits.max_file_size {
            report.skip(
                &relative,
                SkipReason::TooLarge {
                    size,
                    ceiling: limits.max_file_size,
                },
            );
            continue;
        }

        budget.charge_size(size)?;

        let Some(desc) = describe(&entry, relative.clone()) else {
            report.skip(&relative, SkipReason::Unsupported(entry_type.as_byte()));
            continue;
        };
        tracing::debug!(
            path = %desc.relative_path,
            kind = ?desc.kind,
            size = desc.size,
            "applying"
        );

        match desc.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&target).map_err(ApgError::at(&target))?;
                if fs::symlink_metadata(&target).is_ok_and(|m| m.is_dir()) {
                    dir_modes.push((target, desc.mode));
                }
                report.files_extracted += 1;
            }
            EntryKind::File => {
                report.bytes_written += write_file(&target, desc.mode, &mut entry)?;
                report.files_extracted += 1;
            }
            EntryKind::Symlink => {
                let Some(link) = desc.link_target.as_deref() else {
                    report.skip(&relative, SkipReason::LinkFailed("missing link name".into()));
                    continue;
                };
                ensure_parent(&target)?;
                match fs::symlink(Path::new(link), &target) {
                    Ok(()) => report.files_extracted += 1,
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        tracing::debug!(path = %relative, "symlink already present");
                        report.files_extracted += 1;
                    }
                    Err(e) => report.skip(&relative, SkipReason::LinkFailed(e.to_string())),
                }
            }
            EntryKind::HardLink => {
                let Some(link) = desc.link_target.as_deref() else {
                    report.skip(&relative, SkipReason::LinkFailed("missing link name".into()));
                    continue;
                };
                let source = match safety::resolve_within(&root, link) {
                    Ok(source) => source,
                    Err(reason) => {
                        report.skip(&relative, SkipReason::UnsafeLinkTarget(reason));
                        continue;
                    }
                };
                ensure_parent(&target)?;
                match fs::hard_link(&source, &target) {
                    Ok(()) => report.files_extracted += 1,
                    Err(e) => report.skip(&relative, SkipReason::LinkFailed(e.to_string())),
                }
            }
        }
    }

    dir_modes.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
    for (path, mode) in dir_modes {
        fs::set_unix_permissions(&path, mode).map_err(ApgError::at(&path))?;
    }

    tracing::info!(
        extracted = report.files_extracted,
        bytes = report.bytes_written,
        skipped = report.skipped.len(),
        "extraction finished"
    );
    Ok(report)
}

/// Lists entry paths in stream order without touching the filesystem.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let reader = compress::open_decompressed(archive_path)?;
    let mut archive = tar::Archive::new(reader);
    let mut paths = Vec::new();
    for entry in archive.entries().map_err(ApgError::at(archive_path))? {
        let entry = entry.map_err(ApgError::at(archive_path))?;
        paths.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
    }
    Ok(paths)
}

/// Decodes every supported entry header, in stream order.
pub fn inspect_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    let reader = compress::open_decompressed(archive_path)?;
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries().map_err(ApgError::at(archive_path))? {
        let entry = entry.map_err(ApgError::at(archive_path))?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        match describe(&entry, path) {
            Some(desc) => entries.push(desc),
            None => tracing::debug!(
                flag = entry.header().entry_type().as_byte(),
                "ignoring unsupported entry"
            ),
        }
    }
    Ok(entries)
}
