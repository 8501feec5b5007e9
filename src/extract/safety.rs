//! Path safety checks for archive entries.
//!
//! Cheap lexical checks run first; only paths that survive them are resolved
//! against the filesystem. Resolution canonicalises the deepest existing
//! ancestor of the target's parent, so symlinks planted by earlier entries
//! are followed and caught. The leaf itself is never resolved.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::UnsafePathReason;

/// Lexical validation of an archive-internal path.
pub fn check_entry_path(path: &str) -> Result<(), UnsafePathReason> {
    if path.is_empty() {
        return Err(UnsafePathReason::Empty);
    }
    if path.contains('\0') {
        return Err(UnsafePathReason::NulByte);
    }
    if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
        return Err(UnsafePathReason::Absolute);
    }
    // Backslashes are treated as separators too so Windows-built archives
    // cannot smuggle `..\` past a Unix extractor.
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(UnsafePathReason::ParentTraversal);
    }
    for component in Path::new(path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err(UnsafePathReason::Absolute),
            Component::ParentDir => return Err(UnsafePathReason::ParentTraversal),
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// True for entries such as `.` or `./` that name the extraction root itself.
pub fn names_root(path: &str) -> bool {
    check_entry_path(path).is_ok()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::CurDir))
}

/// Canonicalises the longest existing prefix of `path` and re-appends the rest.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, UnsafePathReason> {
    let mut existing = path;
    let mut tail: Vec<&OsStr> = Vec::new();
    while existing.symlink_metadata().is_err() {
        tail.push(existing.file_name().ok_or(UnsafePathReason::Unresolvable)?);
        existing = existing.parent().ok_or(UnsafePathReason::Unresolvable)?;
    }
    let mut resolved = existing
        .canonicalize()
        .map_err(|_| UnsafePathReason::Unresolvable)?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

/// Resolves `relative` under the canonical directory `root`.
///
/// Returns the on-disk target with its parent fully resolved, or the reason
/// the entry must be skipped.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, UnsafePathReason> {
    check_entry_path(relative)?;
    let joined = root.join(relative);
    let (Some(parent), Some(name)) = (joined.parent(), joined.file_name()) else {
        return Err(UnsafePathReason::OutsideDestination);
    };
    let parent = canonicalize_existing_prefix(parent)?;
    if !parent.starts_with(root) {
        return Err(UnsafePathReason::OutsideDestination);
    }
    Ok(parent.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsx as fs;
    use tempfile::tempdir;

    #[test]
    fn lexical_rejections() {
        assert_eq!(check_entry_path(""), Err(UnsafePathReason::Empty));
        assert_eq!(check_entry_path("../etc/passwd"), Err(UnsafePathReason::ParentTraversal));
        assert_eq!(check_entry_path("/etc/passwd"), Err(UnsafePathReason::Absolute));
        assert_eq!(
            check_entry_path("foo/../../etc/passwd"),
            Err(UnsafePathReason::ParentTraversal)
        );
        assert_eq!(check_entry_path("a\0b"), Err(UnsafePathReason::NulByte));
        assert_eq!(check_entry_path("a\\..\\b"), Err(UnsafePathReason::ParentTraversal));
    }

    #[test]
    fn plain_relative_paths_pass() {
        assert_eq!(check_entry_path("dir/subdir/file.txt"), Ok(()));
        assert_eq!(check_entry_path("./file"), Ok(()));
        // dots inside a name are not traversal
        assert_eq!(check_entry_path("lib/libfoo..so"), Ok(()));
    }

    #[test]
    fn resolves_inside_root_even_when_parents_are_missing() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let target = resolve_within(&root, "a/b/c.txt").unwrap();
        assert_eq!(target, root.join("a").join("b").join("c.txt"));
    }

    #[test]
    fn current_dir_entry_cannot_name_the_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolve_within(&root, "."), Err(UnsafePathReason::OutsideDestination));
    }

    #[test]
    fn root_entries_are_recognised() {
        assert!(names_root("./"));
        assert!(names_root("."));
        assert!(names_root("././"));
        assert!(!names_root("./etc"));
        assert!(!names_root(""));
        assert!(!names_root("../"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_parent_pointing_outside_is_rejected() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::symlink(outside.path(), &root.join("escape")).unwrap();

        assert_eq!(
            resolve_within(&root, "escape/passwd"),
            Err(UnsafePathReason::OutsideDestination)
        );
    }

    #[cfg(unix)]
    #[test]
    fn leaf_symlink_is_not_followed() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::symlink(outside.path(), &root.join("link")).unwrap();

        assert_eq!(resolve_within(&root, "link").unwrap(), root.join("link"));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_parent_is_unresolvable() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::symlink(Path::new("/nonexistent/apgbuild/target"), &root.join("dangling")).unwrap();

        assert_eq!(
            resolve_within(&root, "dangling/file"),
            Err(UnsafePathReason::Unresolvable)
        );
    }
}
