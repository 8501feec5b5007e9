//! # Package Container Writer
//!
//! Serialises a directory tree into an APG container: a ustar-framed stream
//! of entries piped straight into the compression filter from
//! [`crate::compress`]. Nothing is buffered beyond the codec's own window, so
//! memory use does not grow with the size of the tree.
//!
//! Entries are emitted in sorted depth-first order and the root directory is
//! never emitted, which makes the entry order of two packs of the same tree
//! identical.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::common::{archive_path, ArchiveEntry, EntryKind};
use crate::compress::{self, CompressWriter, CompressionAlgo};
use crate::error::{ApgError, Result};
use crate::fsx as fs;

/// File whose presence marks a source tree as a described package.
pub const METADATA_FILE: &str = "metadata.json";

/// Counters returned by [`pack_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Regular files whose content was written.
    pub files_added: u64,
    /// Sum of the content bytes of those files.
    pub total_size: u64,
    /// Every entry header written, including directories and links.
    pub entries_written: u64,
}

/// Reader adapter that counts what it hands out.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// A writer responsible for constructing an APG container.
///
/// Wraps a `tar::Builder` whose sink is the compression filter; call
/// [`PackageWriter::finish`] to write the tar end marker and the codec trailer.
pub struct PackageWriter<W: Write> {
    builder: tar::Builder<W>,
    stats: PackStats,
}

impl<W: Write> PackageWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            builder: tar::Builder::new(sink),
            stats: PackStats::default(),
        }
    }

    pub fn stats(&self) -> PackStats {
        self.stats
    }

    fn header_for(entry: &ArchiveEntry) -> tar::Header {
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(entry.kind.to_tar());
        header.set_mode(entry.mode);
        header.set_mtime(entry.mtime);
        header.set_size(if entry.kind == EntryKind::File { entry.size } else { 0 });
        header
    }

    /// Writes a header-only entry (directory, symlink or hard link).
    pub fn append_entry(&mut self, entry: &ArchiveEntry) -> io::Result<()> {
        let mut header = Self::header_for(entry);
        match (entry.kind, &entry.link_target) {
            (EntryKind::Symlink | EntryKind::HardLink, Some(target)) => {
                self.builder
                    .append_link(&mut header, &entry.relative_path, target)?;
            }
            (EntryKind::Symlink | EntryKind::HardLink, None) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("link entry '{}' has no target", entry.relative_path),
                ));
            }
            (EntryKind::Directory, _) => {
                self.builder
                    .append_data(&mut header, &entry.relative_path, io::empty())?;
            }
            (EntryKind::File, _) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "regular files need content, use append_file",
                ));
            }
        }
        self.stats.entries_written += 1;
        Ok(())
    }

    /// Writes a regular file entry, streaming exactly `entry.size` bytes from `content`.
    ///
    /// Fails if `content` yields fewer bytes than declared.
    pub fn append_file<R: Read>(&mut self, entry: &ArchiveEntry, content: R) -> io::Result<()> {
        let mut header = Self::header_for(entry);
        let mut reader = CountingReader {
            inner: content.take(entry.size),
            count: 0,
        };
        self.builder
            .append_data(&mut header, &entry.relative_path, &mut reader)?;
        if reader.count != entry.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "'{}' changed while packing: expected {} bytes, read {}",
                    entry.relative_path, entry.size, reader.count
                ),
            ));
        }
        self.stats.files_added += 1;
        self.stats.total_size += reader.count;
        self.stats.entries_written += 1;
        Ok(())
    }

    /// Writes the tar end marker and hands back the sink.
    pub fn into_inner(self) -> io::Result<(W, PackStats)> {
        let stats = self.stats;
        Ok((self.builder.into_inner()?, stats))
    }
}

impl PackageWriter<Box<dyn CompressWriter>> {
    /// Terminates the container and the compression stream.
    pub fn finish(self) -> io::Result<PackStats> {
        let (sink, stats) = self.into_inner()?;
        sink.finish()?;
        Ok(stats)
    }
}

fn mtime_of(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}

fn walk_error(err: walkdir::Error, fallback: &Path) -> ApgError {
    let path = err.path().map_or_else(|| fallback.to_path_buf(), Path::to_path_buf);
    ApgError::Io {
        source: err.into(),
        path,
    }
}

/// Walks `source` and appends every object under it to `writer`.
pub fn append_tree<W: Write>(writer: &mut PackageWriter<W>, source: &Path) -> Result<()> {
    append_tree_excluding(writer, source, None)
}

/// Like [`append_tree`], leaving out the object at `exclude` (relative to `source`).
fn append_tree_excluding<W: Write>(
    writer: &mut PackageWriter<W>,
    source: &Path,
    exclude: Option<&Path>,
) -> Result<()> {
    // (dev, ino) -> first archive path carrying that inode
    let mut seen_inodes: HashMap<(u64, u64), String> = HashMap::new();

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for dent in walker {
        let dent = dent.map_err(|e| walk_error(e, source))?;
        let path = dent.path();
        let relative = path.strip_prefix(source).map_err(|_| {
            ApgError::InvalidInput(format!(
                "'{}' is not under '{}'",
                path.display(),
                source.display()
            ))
        })?;
        if exclude == Some(relative) {
            tracing::info!(path = %path.display(), "skipping the package being written");
            continue;
        }
        let relative_path = archive_path(relative)?;
        let meta = dent.metadata().map_err(|e| walk_error(e, path))?;
        let file_type = meta.file_type();

        let mut entry = ArchiveEntry {
            relative_path,
            kind: EntryKind::File,
            mode: fs::unix_mode(&meta),
            size: 0,
            link_target: None,
            mtime: mtime_of(&meta),
        };

        if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(ApgError::at(path))?;
            let target = target.to_str().ok_or_else(|| {
                ApgError::InvalidInput(format!("non UTF-8 symlink target: {}", path.display()))
            })?;
            entry.kind = EntryKind::Symlink;
            entry.link_target = Some(target.to_string());
            writer.append_entry(&entry).map_err(ApgError::at(path))?;
        } else if file_type.is_dir() {
            entry.kind = EntryKind::Directory;
            writer.append_entry(&entry).map_err(ApgError::at(path))?;
        } else if file_type.is_file() {
            if let Some(key) = fs::hard_link_key(&meta) {
                if let Some(first) = seen_inodes.get(&key) {
                    entry.kind = EntryKind::HardLink;
                    entry.link_target = Some(first.clone());
                    tracing::debug!(path = %entry.relative_path, target = %first, "hard link");
                    writer.append_entry(&entry).map_err(ApgError::at(path))?;
                    continue;
                }
                seen_inodes.insert(key, entry.relative_path.clone());
            }
            entry.size = meta.len();
            let file = fs::File::open(path).map_err(ApgError::at(path))?;
            writer.append_file(&entry, file).map_err(ApgError::at(path))?;
        } else {
            tracing::warn!(path = %path.display(), "skipping special file");
            continue;
        }
        tracing::debug!(
            path = %entry.relative_path,
            kind = ?entry.kind,
            size = entry.size,
            "packed"
        );
    }
    Ok(())
}

/// Path of `output` relative to `source` when the package is written inside the tree.
fn own_output_within(source: &Path, output: &Path) -> Option<PathBuf> {
    let source = source.canonicalize().ok()?;
    let output = output.canonicalize().ok()?;
    output.strip_prefix(&source).ok().map(Path::to_path_buf)
}

/// Packs `source` into a container at `output`.
///
/// On error the partially written `output` is not a valid package; the caller
/// is responsible for discarding it.
pub fn pack_directory(source: &Path, output: &Path, algo: CompressionAlgo) -> Result<PackStats> {
    let meta = fs::metadata(source).map_err(|_| {
        ApgError::InvalidInput(format!("source directory does not exist: {}", source.display()))
    })?;
    if !meta.is_dir() {
        return Err(ApgError::InvalidInput(format!(
            "path is not a directory: {}",
            source.display()
        )));
    }
    if !source.join(METADATA_FILE).exists() {
        tracing::warn!(source = %source.display(), "{METADATA_FILE} not found in package");
    }

    tracing::info!(
        source = %source.display(),
        output = %output.display(),
        codec = algo.name(),
        "packing"
    );
    let sink = compress::create_compressed(output, algo)?;
    let own_output = own_output_within(source, output);
    let mut writer = PackageWriter::new(sink);
    append_tree_excluding(&mut writer, source, own_output.as_deref())?;
    let stats = writer.finish().map_err(ApgError::at(output))?;
    tracing::info!(
        files = stats.files_added,
        bytes = stats.total_size,
        entries = stats.entries_written,
        "package written"
    );
    Ok(stats)
}

/// Root-relative output path for a package built from `source`.
pub fn default_package_name(source: &Path) -> PathBuf {
    let stem = source
        .file_name()
        .map_or_else(|| "package".to_string(), |n| n.to_string_lossy().into_owned());
    PathBuf::from(format!("{stem}.apg"))
}
