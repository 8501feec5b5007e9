use std::fmt;
use std::path::{Path, PathBuf};

/// Why an archive entry path was refused during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafePathReason {
    /// The entry path is empty.
    Empty,
    /// The entry path contains a NUL byte.
    NulByte,
    /// The entry path is not valid UTF-8.
    NonUtf8,
    /// The entry path is absolute or carries a root/prefix component.
    Absolute,
    /// The entry path contains a `..` segment.
    ParentTraversal,
    /// The resolved target lies outside the destination directory.
    OutsideDestination,
    /// The target's ancestors could not be canonicalised (e.g. a dangling symlink).
    Unresolvable,
}

impl fmt::Display for UnsafePathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            UnsafePathReason::Empty => "empty path",
            UnsafePathReason::NulByte => "embedded NUL byte",
            UnsafePathReason::NonUtf8 => "path is not UTF-8",
            UnsafePathReason::Absolute => "absolute path",
            UnsafePathReason::ParentTraversal => "parent directory traversal",
            UnsafePathReason::OutsideDestination => "resolves outside destination",
            UnsafePathReason::Unresolvable => "cannot canonicalise target",
        };
        f.write_str(msg)
    }
}

/// Which extraction ceiling was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Cumulative declared content size of the archive.
    ArchiveSize,
    /// Number of entries processed.
    EntryCount,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::ArchiveSize => f.write_str("cumulative archive size"),
            LimitKind::EntryCount => f.write_str("entry count"),
        }
    }
}

/// The primary error type for all operations in the `apgbuild` crate.
#[derive(Debug, thiserror::Error)]
pub enum ApgError {
    /// A caller-supplied path or value is unusable (missing source, not a directory, bad limit).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// An archive entry tried to escape the extraction root.
    ///
    /// Extraction recovers from this locally; it only ever shows up inside
    /// [`crate::extract::ExtractReport::skipped`].
    #[error("unsafe entry path '{path}': {reason}")]
    SecurityViolation {
        path: String,
        reason: UnsafePathReason,
    },

    /// The archive breached a structural ceiling; extraction was aborted.
    #[error("{limit} limit exceeded: {value} > {ceiling}")]
    ResourceLimitExceeded {
        limit: LimitKind,
        value: u64,
        ceiling: u64,
    },

    /// `metadata.json` could not be parsed or serialised.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ApgError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ApgError::Io {
            source,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns a closure suitable for `map_err` that attaches `path`.
    pub fn at(path: &Path) -> impl FnOnce(std::io::Error) -> ApgError + '_ {
        move |source| ApgError::io(path, source)
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ApgError {
    fn from(err: std::io::Error) -> Self {
        ApgError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApgError>;
