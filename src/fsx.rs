//! Cross-platform filesystem wrapper.
//!
//! On Unix we transparently re-export std::fs and add the few primitives the
//! archive engine needs that std only exposes per platform: POSIX mode bits,
//! symlink creation and reading a file's mode. Windows gets best-effort
//! fallbacks so the crate still builds there; permission bits are not
//! preserved and symlinks need the relevant privilege.

use std::io;
use std::path::Path;

pub use std::fs::*;

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms: POSIX permission bits are not preserved.
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Permission bits of `meta`, without the file type bits.
pub fn unix_mode(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub fn unix_mode(meta: &Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
/// Create a symbolic link at `link` whose payload is `target`.
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
/// Identity of the inode behind `meta` when it has more than one name.
pub fn hard_link_key(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    (meta.nlink() > 1).then(|| (meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
pub fn hard_link_key(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}
