//! Direct filesystem primitives used by provisioning and teardown.
//!
//! Every syscall wrapper retries on `EINTR`; callers never observe an
//! interrupted call.

use nix::dir::{Dir, Type};
use nix::errno::Errno;
use nix::fcntl::{AtFlags, OFlag};
use nix::sys::stat::{fchmod, fchmodat, fstat, fstatat, FchmodatFlags, Mode, SFlag};
use nix::unistd::{Gid, Uid};
use nix::NixPath;
use std::ffi::{CString, OsStr};
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Run `op` until it returns something other than `ErrorKind::Interrupted`.
pub fn retry_eintr<T, F>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Run `op` until it returns something other than `EINTR`.
pub fn retry_errno<T, F>(mut op: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match op() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Create `path` and any missing parents. An existing directory is success.
pub fn create_dir_all(path: &Path) -> io::Result<()> {
    retry_eintr(|| fs::create_dir_all(path))
}

/// Set the exact mode bits (including setuid/setgid/sticky) on `path`.
pub fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    let perm = fs::Permissions::from_mode(mode);
    retry_eintr(|| fs::set_permissions(path, perm.clone()))
}

pub fn chown(path: &Path, uid: u32, gid: u32) -> nix::Result<()> {
    retry_errno(|| {
        nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
    })
}

/// Recursively OR `bits` into the mode of every directory under `path`.
///
/// Each directory is opened relative to its parent's descriptor with
/// `O_NOFOLLOW`, and its mode is changed through that descriptor, so a
/// symlink in the tree is never followed, even one swapped in during the
/// walk. Non-directories keep their mode; unlinking them only needs access
/// to the parent. Failures are logged and counted, never returned; the
/// count is the number of directories that could not be updated.
pub fn relax_tree(path: &Path, bits: u32) -> usize {
    match open_relaxed(None, path, bits) {
        Ok(dir) => relax_entries(dir, path, bits),
        Err(Errno::ENOENT | Errno::ENOTDIR | Errno::ELOOP) => 0,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot relax permissions");
            1
        }
    }
}

fn relax_entries(mut dir: Dir, path: &Path, bits: u32) -> usize {
    let fd = dir.as_raw_fd();
    let mut failures = 0;
    let mut children: Vec<CString> = Vec::new();
    for entry in dir.iter() {
        match entry {
            Ok(entry) => {
                let name = entry.file_name();
                if matches!(name.to_bytes(), b"." | b"..") {
                    continue;
                }
                // d_type is not filled in on every filesystem.
                if matches!(entry.file_type(), Some(Type::Directory) | None) {
                    children.push(name.to_owned());
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot list directory");
                failures += 1;
                break;
            }
        }
    }

    for name in children {
        let child = path.join(OsStr::from_bytes(name.to_bytes()));
        match open_relaxed(Some(fd), name.as_c_str(), bits) {
            Ok(sub) => failures += relax_entries(sub, &child, bits),
            Err(Errno::ENOENT | Errno::ENOTDIR | Errno::ELOOP) => {}
            Err(e) => {
                debug!(path = %child.display(), error = %e, "cannot relax permissions");
                failures += 1;
            }
        }
    }
    failures
}

/// Open `name` under `parent` as a directory without following symlinks,
/// then add `bits` to its mode through the descriptor.
fn open_relaxed<P: ?Sized + NixPath>(
    parent: Option<RawFd>,
    name: &P,
    bits: u32,
) -> nix::Result<Dir> {
    let flags = OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC;
    let dir = match retry_errno(|| Dir::openat(parent, name, flags, Mode::empty())) {
        // Only reachable without DAC override, where chmod cannot touch
        // anything the caller does not already own.
        Err(Errno::EACCES) => {
            let stat = retry_errno(|| fstatat(parent, name, AtFlags::AT_SYMLINK_NOFOLLOW))?;
            if SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT != SFlag::S_IFDIR {
                return Err(Errno::ENOTDIR);
            }
            let mode = relaxed_mode(stat.st_mode, bits);
            retry_errno(|| fchmodat(parent, name, mode, FchmodatFlags::FollowSymlink))?;
            retry_errno(|| Dir::openat(parent, name, flags, Mode::empty()))?
        }
        other => other?,
    };
    let stat = retry_errno(|| fstat(dir.as_raw_fd()))?;
    retry_errno(|| fchmod(dir.as_raw_fd(), relaxed_mode(stat.st_mode, bits)))?;
    Ok(dir)
}

fn relaxed_mode(st_mode: nix::libc::mode_t, bits: u32) -> Mode {
    Mode::from_bits_truncate((st_mode & 0o7777) | bits)
}

/// Remove `path` and everything beneath it without following symlinks.
///
/// A `path` that never existed, or entries that disappear while the
/// removal is in progress, are not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let result = match retry_eintr(|| fs::symlink_metadata(path)) {
        Ok(meta) if meta.is_dir() => retry_eintr(|| fs::remove_dir_all(path)),
        Ok(_) => retry_eintr(|| fs::remove_file(path)),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_retry_eintr_retries_interrupted() {
        let mut calls = 0;
        let result = retry_eintr(|| {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_eintr_passes_other_errors() {
        let mut calls = 0;
        let result: io::Result<()> = retry_eintr(|| {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_errno_retries_eintr() {
        let mut calls = 0;
        let result = retry_errno(|| {
            calls += 1;
            if calls == 1 {
                Err(Errno::EINTR)
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_set_permissions_exact_bits() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("d");
        create_dir_all(&target).unwrap();
        set_permissions(&target, 0o750).unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_relax_then_remove_locked_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let nested = root.join("a/b");
        create_dir_all(&nested).unwrap();
        fs::write(nested.join("file"), b"x").unwrap();
        set_permissions(&nested, 0o000).unwrap();
        set_permissions(&root, 0o300).unwrap();

        assert_eq!(relax_tree(&root, 0o700), 0);
        assert_eq!(fs::metadata(&nested).unwrap().permissions().mode() & 0o777, 0o700);
        remove_tree(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_relax_tree_adds_owner_bits() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        create_dir_all(&root).unwrap();
        set_permissions(&root, 0o311).unwrap();

        relax_tree(&root, 0o700);
        assert_eq!(fs::metadata(&root).unwrap().permissions().mode() & 0o777, 0o711);
    }

    #[test]
    fn test_relax_tree_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        set_permissions(&outside, 0o500).unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert_eq!(relax_tree(&root, 0o700), 0);
        assert_eq!(fs::metadata(&outside).unwrap().permissions().mode() & 0o777, 0o500);

        assert_eq!(relax_tree(&root.join("link"), 0o700), 0);
        assert_eq!(fs::metadata(&outside).unwrap().permissions().mode() & 0o777, 0o500);
        set_permissions(&outside, 0o700).unwrap();
    }

    #[test]
    fn test_relax_tree_missing_root_is_not_a_failure() {
        let dir = TempDir::new().unwrap();
        assert_eq!(relax_tree(&dir.path().join("never-created"), 0o700), 0);
    }

    #[test]
    fn test_remove_tree_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_tree(&dir.path().join("never-created")).unwrap();
    }

    #[test]
    fn test_remove_tree_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("keep"), b"x").unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        remove_tree(&root).unwrap();
        assert!(!root.exists());
        assert!(outside.join("keep").exists());
    }
}
