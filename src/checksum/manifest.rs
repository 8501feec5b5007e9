//! Line codec for `crc32sums` manifests.
//!
//! One record per line: `"%08x  %s\n"`, eight lowercase hex digits, two
//! spaces, the relative path. No header and no trailer.

use std::fmt;
use std::io::{self, Write};

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub crc32: u32,
    /// Forward-slash path relative to the hashed directory.
    pub path: String,
}

impl fmt::Display for ChecksumRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}  {}", self.crc32, self.path)
    }
}

/// Result of parsing one manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Blank line.
    Empty,
    Record(ChecksumRecord),
    /// The checksum field is not hexadecimal; the path is still known.
    BadChecksum { path: String },
    /// No path could be recovered from the line.
    Unrecoverable,
}

/// Parses a single manifest line (without its newline).
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return ParsedLine::Empty;
    }
    // leading spaces after the two-space separator belong to the file name
    let split = line.split_once("  ").or_else(|| {
        line.split_once(char::is_whitespace)
            .map(|(sum, path)| (sum, path.trim_start()))
    });
    let Some((sum, path)) = split else {
        return ParsedLine::Unrecoverable;
    };
    if path.trim().is_empty() {
        return ParsedLine::Unrecoverable;
    }
    let sum = sum.trim();
    let valid = !sum.is_empty() && sum.len() <= 8 && sum.bytes().all(|b| b.is_ascii_hexdigit());
    match valid.then(|| u32::from_str_radix(sum, 16).ok()).flatten() {
        Some(crc32) => ParsedLine::Record(ChecksumRecord {
            crc32,
            path: path.to_string(),
        }),
        None => ParsedLine::BadChecksum {
            path: path.to_string(),
        },
    }
}

/// Writes `records` one per line.
pub fn write_records<W: Write>(mut out: W, records: &[ChecksumRecord]) -> io::Result<()> {
    for record in records {
        writeln!(out, "{record}")?;
    }
    out.flush()
}
