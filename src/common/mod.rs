//! Common types shared by the pack and unpack paths.

use std::path::{Component, Path};

use crate::error::{ApgError, Result};

/// Kind of filesystem object an archive entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    HardLink,
}

impl EntryKind {
    /// Maps a tar type flag onto an entry kind; `None` for everything we do not materialise.
    pub fn from_tar(entry_type: tar::EntryType) -> Option<Self> {
        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => Some(EntryKind::File),
            tar::EntryType::Directory => Some(EntryKind::Directory),
            tar::EntryType::Symlink => Some(EntryKind::Symlink),
            tar::EntryType::Link => Some(EntryKind::HardLink),
            _ => None,
        }
    }

    pub fn to_tar(self) -> tar::EntryType {
        match self {
            EntryKind::File => tar::EntryType::Regular,
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::Symlink => tar::EntryType::Symlink,
            EntryKind::HardLink => tar::EntryType::Link,
        }
    }
}

/// One record of the container stream.
///
/// Built transiently while walking the source tree or decoding an archive;
/// never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-internal path, forward-slash separated, relative.
    pub relative_path: String,
    pub kind: EntryKind,
    /// POSIX permission bits.
    pub mode: u32,
    /// Content length; zero for anything but regular files.
    pub size: u64,
    /// Link payload for symlinks, extraction-root relative path for hard links.
    pub link_target: Option<String>,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: u64,
}

/// Turns a relative filesystem path into the archive's forward-slash form.
///
/// Fails for non-UTF-8 names and for paths that are not plain relative paths.
pub fn archive_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    ApgError::InvalidInput(format!("non UTF-8 path: {}", relative.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(ApgError::InvalidInput(format!(
                    "not a relative path: {}",
                    relative.display()
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(ApgError::InvalidInput("empty relative path".into()));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn archive_path_uses_forward_slashes() {
        let path: PathBuf = ["usr", "bin", "tool"].iter().collect();
        assert_eq!(archive_path(&path).unwrap(), "usr/bin/tool");
    }

    #[test]
    fn archive_path_drops_cur_dir() {
        assert_eq!(archive_path(Path::new("./a/./b")).unwrap(), "a/b");
    }

    #[test]
    fn archive_path_rejects_parent_and_empty() {
        assert!(archive_path(Path::new("../x")).is_err());
        assert!(archive_path(Path::new("")).is_err());
        assert!(archive_path(Path::new(".")).is_err());
    }

    #[test]
    fn entry_kind_maps_tar_types() {
        assert_eq!(EntryKind::from_tar(tar::EntryType::Regular), Some(EntryKind::File));
        assert_eq!(EntryKind::from_tar(tar::EntryType::Link), Some(EntryKind::HardLink));
        assert_eq!(EntryKind::from_tar(tar::EntryType::Fifo), None);
        assert_eq!(EntryKind::Symlink.to_tar(), tar::EntryType::Symlink);
    }
}
