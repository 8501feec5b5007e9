//! # Checksum Manifest
//!
//! CRC32 (IEEE polynomial, via `crc32fast`) integrity records for the files
//! of a package tree. A manifest is written once by [`generate_manifest`]
//! and only ever read afterwards; [`verify_manifest`] recomputes digests and
//! sorts every listed path into `passed` or `failed`.
//!
//! CRC32 catches corruption, not tampering.

pub mod manifest;

use std::io::{BufRead, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use walkdir::WalkDir;

use crate::common::archive_path;
use crate::error::{ApgError, Result};
use crate::extract::safety;
use crate::fsx as fs;

pub use manifest::{ChecksumRecord, ParsedLine};

/// Default manifest name for a package's `data/` tree.
pub const MANIFEST_FILE: &str = "crc32sums";
/// Manifest name for a package's `home/` tree.
pub const HOME_MANIFEST_FILE: &str = "crc32sums.home";

const CHUNK_SIZE: usize = 64 * 1024;

/// Computes a CRC32 checksum over the provided data.
pub fn digest_bytes(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes the CRC32 of everything `reader` yields, in fixed-size chunks.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<u32> {
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

/// Computes the CRC32 checksum of a file without loading it into memory.
pub fn digest_file(path: &Path) -> Result<u32> {
    let file = fs::File::open(path).map_err(ApgError::at(path))?;
    digest_reader(file).map_err(ApgError::at(path))
}

/// Outcome of [`verify_manifest`].
///
/// A non-empty `failed` list is a normal result, not an error; the caller
/// decides how severe it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub passed: Vec<String>,
    /// Mismatched, unreadable, unsafe or malformed records.
    pub failed: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Hashes every regular file under `directory`, in sorted walk order.
pub fn compute_records(directory: &Path) -> Result<Vec<ChecksumRecord>> {
    compute_records_excluding(directory, None)
}

fn compute_records_excluding(
    directory: &Path,
    exclude: Option<&Path>,
) -> Result<Vec<ChecksumRecord>> {
    let meta = fs::metadata(directory).map_err(|_| {
        ApgError::InvalidInput(format!("directory does not exist: {}", directory.display()))
    })?;
    if !meta.is_dir() {
        return Err(ApgError::InvalidInput(format!(
            "path is not a directory: {}",
            directory.display()
        )));
    }

    let mut records = Vec::new();
    for dent in WalkDir::new(directory).min_depth(1).sort_by_file_name() {
        let dent = dent.map_err(|e| {
            let path = e.path().map_or_else(|| directory.to_path_buf(), Path::to_path_buf);
            ApgError::Io {
                source: e.into(),
                path,
            }
        })?;
        if !dent.file_type().is_file() {
            continue;
        }
        let path = dent.path();
        if let Some(skip) = exclude {
            if path.canonicalize().is_ok_and(|p| p == skip) {
                continue;
            }
        }
        let relative = path.strip_prefix(directory).map_err(|_| {
            ApgError::InvalidInput(format!(
                "'{}' is not under '{}'",
                path.display(),
                directory.display()
            ))
        })?;
        let relative = archive_path(relative)?;
        if relative.contains(['\n', '\r']) {
            return Err(ApgError::InvalidInput(format!(
                "file name contains a line break: {relative:?}"
            )));
        }
        let crc32 = digest_file(path)?;
        tracing::debug!(path = %relative, crc32 = %format!("{crc32:08x}"), "hashed");
        records.push(ChecksumRecord {
            crc32,
            path: relative,
        });
    }
    Ok(records)
}

/// Hashes `directory` and writes the manifest to `output`.
///
/// Returns the records that were written. A manifest left over from an
/// earlier run inside `directory` is not recorded in the new one.
pub fn generate_manifest(directory: &Path, output: &Path) -> Result<Vec<ChecksumRecord>> {
    tracing::info!(
        directory = %directory.display(),
        output = %output.display(),
        "generating checksums"
    );
    let previous = output.canonicalize().ok();
    let records = compute_records_excluding(directory, previous.as_deref())?;

    let file = fs::File::create(output).map_err(ApgError::at(output))?;
    manifest::write_records(BufWriter::new(file), &records).map_err(ApgError::at(output))?;
    tracing::info!(count = records.len(), "checksums written");
    Ok(records)
}

/// Checks every record of the manifest at `manifest_path` against `base_dir`.
///
/// Only failing to read the manifest itself is an error.
pub fn verify_manifest(manifest_path: &Path, base_dir: &Path) -> Result<VerifyReport> {
    let file = fs::File::open(manifest_path).map_err(ApgError::at(manifest_path))?;
    let mut report = VerifyReport::default();

    for raw in BufReader::new(file).split(b'\n') {
        let raw = raw.map_err(ApgError::at(manifest_path))?;
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                let line = String::from_utf8_lossy(e.as_bytes()).into_owned();
                match manifest::parse_line(&line) {
                    ParsedLine::Record(ChecksumRecord { path, .. })
                    | ParsedLine::BadChecksum { path } => {
                        tracing::warn!(path = %path, "manifest path is not valid UTF-8");
                        report.failed.push(path);
                    }
                    ParsedLine::Empty | ParsedLine::Unrecoverable => {
                        tracing::warn!(line = %line, "skipping malformed manifest line");
                    }
                }
                continue;
            }
        };
        let record = match manifest::parse_line(&line) {
            ParsedLine::Empty => continue,
            ParsedLine::Record(record) => record,
            ParsedLine::BadChecksum { path } => {
                tracing::warn!(path = %path, "malformed checksum field");
                report.failed.push(path);
                continue;
            }
            ParsedLine::Unrecoverable => {
                tracing::warn!(line = %line, "skipping malformed manifest line");
                continue;
            }
        };

        if let Err(reason) = safety::check_entry_path(&record.path) {
            tracing::warn!(path = %record.path, %reason, "refusing to verify unsafe path");
            report.failed.push(record.path);
            continue;
        }

        let target: PathBuf = base_dir.join(&record.path);
        match digest_file(&target) {
            Ok(actual) if actual == record.crc32 => report.passed.push(record.path),
            Ok(actual) => {
                tracing::warn!(
                    path = %record.path,
                    expected = %format!("{:08x}", record.crc32),
                    actual = %format!("{actual:08x}"),
                    "checksum mismatch"
                );
                report.failed.push(record.path);
            }
            Err(e) => {
                tracing::warn!(path = %record.path, "cannot read file: {e}");
                report.failed.push(record.path);
            }
        }
    }

    tracing::info!(
        passed = report.passed.len(),
        failed = report.failed.len(),
        "verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn known_vectors() {
        assert_eq!(digest_bytes(b""), 0);
        assert_eq!(digest_bytes(b"hello"), 0x3610a686);
        assert_eq!(digest_bytes(b"hello world"), 0x0d4a1185);
    }

    #[test]
    fn file_digest_matches_bytes_digest_across_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(&data));
    }

    #[test]
    fn digest_ignores_file_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("one"), b"same bytes").unwrap();
        fs::write(dir.path().join("two"), b"same bytes").unwrap();
        assert_eq!(
            digest_file(&dir.path().join("one")).unwrap(),
            digest_file(&dir.path().join("two")).unwrap()
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            digest_file(&dir.path().join("absent")),
            Err(ApgError::Io { .. })
        ));
    }

    #[test]
    fn generate_writes_sorted_relative_records() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("b.txt"), b"hello").unwrap();
        fs::write(data.join("a.txt"), b"hello world").unwrap();
        fs::write(data.join("sub").join("c.txt"), b"").unwrap();
        let out = dir.path().join(MANIFEST_FILE);

        let records = generate_manifest(&data, &out).unwrap();
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "sub/c.txt"]);

        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "0d4a1185  a.txt\n3610a686  b.txt\n00000000  sub/c.txt\n"
        );
    }

    #[test]
    fn regenerating_inside_the_tree_skips_the_old_manifest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), b"x").unwrap();
        let out = dir.path().join(MANIFEST_FILE);

        assert_eq!(generate_manifest(dir.path(), &out).unwrap().len(), 1);
        let again = generate_manifest(dir.path(), &out).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].path, "f");
    }

    #[test]
    fn verify_passes_untouched_tree_and_flags_modified_file() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        for name in ["one", "two", "three"] {
            fs::write(data.join(name), name.as_bytes()).unwrap();
        }
        let out = dir.path().join(MANIFEST_FILE);
        generate_manifest(&data, &out).unwrap();

        let clean = verify_manifest(&out, &data).unwrap();
        assert!(clean.is_clean());
        assert_eq!(clean.passed.len(), 3);

        fs::write(data.join("two"), b"tampered").unwrap();
        let report = verify_manifest(&out, &data).unwrap();
        assert_eq!(report.failed, vec!["two"]);
        assert_eq!(report.passed, vec!["one", "three"]);
    }

    #[test]
    fn verify_classifies_malformed_missing_and_unsafe_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok"), b"hello").unwrap();
        let manifest = dir.path().join("sums");
        let mut f = fs::File::create(&manifest).unwrap();
        writeln!(f, "3610a686  ok").unwrap();
        writeln!(f, "nothex!!  bad-hex").unwrap();
        writeln!(f, "12345678  missing").unwrap();
        writeln!(f, "3610a686  ../ok").unwrap();
        writeln!(f, "garbage").unwrap();
        writeln!(f).unwrap();
        drop(f);

        let report = verify_manifest(&manifest, dir.path()).unwrap();
        assert_eq!(report.passed, vec!["ok"]);
        assert_eq!(report.failed, vec!["bad-hex", "missing", "../ok"]);
    }

    #[test]
    fn non_utf8_line_fails_only_that_record() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok"), b"hello").unwrap();
        let manifest = dir.path().join("sums");
        fs::write(&manifest, b"3610a686  ok\ndeadbeef  \xff\xfe\n").unwrap();

        let report = verify_manifest(&manifest, dir.path()).unwrap();
        assert_eq!(report.passed, vec!["ok"]);
        assert_eq!(report.failed, vec!["\u{fffd}\u{fffd}"]);
    }

    #[test]
    fn file_name_with_leading_space_round_trips() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(" lead"), b"spaced").unwrap();
        let out = dir.path().join(MANIFEST_FILE);

        generate_manifest(&data, &out).unwrap();
        let report = verify_manifest(&out, &data).unwrap();
        assert_eq!(report.passed, vec![" lead"]);
        assert!(report.is_clean());
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(verify_manifest(&dir.path().join("none"), dir.path()).is_err());
    }
}
