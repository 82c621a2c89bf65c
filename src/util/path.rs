//! Path resolution: strict canonicalization, one-level symlink resolution,
//! and POSIX `dirname`.

use crate::error::PathError;
use crate::util::fs::retry_eintr;
use nix::errno::Errno;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Resolve every symlink and `.`/`..` component of `path`.
///
/// The whole path must currently exist.
pub fn canonicalize(path: &Path) -> Result<PathBuf, PathError> {
    retry_eintr(|| fs::canonicalize(path)).map_err(|source| PathError::Resolution {
        path: path.to_path_buf(),
        source,
    })
}

/// Follow `path` one level if it is a symlink.
///
/// Absolute targets are returned as-is; relative targets are joined onto
/// `dir_name(path)`. A path that is not a symlink is returned unchanged.
pub fn resolve_one_symlink(path: &Path) -> Result<PathBuf, PathError> {
    let target = match retry_eintr(|| fs::read_link(path)) {
        Ok(target) => target,
        Err(e) if e.raw_os_error() == Some(Errno::EINVAL as i32) => {
            return Ok(path.to_path_buf());
        }
        Err(source) => {
            return Err(PathError::Resolution {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    rewrite_link_target(path, target)
}

fn rewrite_link_target(link: &Path, target: PathBuf) -> Result<PathBuf, PathError> {
    if target.as_os_str().is_empty() {
        return Err(PathError::EmptySymlinkTarget {
            path: link.to_path_buf(),
        });
    }
    if target.is_absolute() {
        return Ok(target);
    }
    Ok(dir_name(link).join(target))
}

/// Parent directory of `path` with dirname(3) semantics.
///
/// Trailing slashes are ignored, a path without a slash yields `.`, and the
/// parent of a top-level entry is `/`. As in glibc, a parent made of exactly
/// two leading slashes stays `//`.
pub fn dir_name(path: &Path) -> PathBuf {
    let bytes = path.as_os_str().as_bytes();
    if bytes == b"//" {
        return PathBuf::from("//");
    }

    let mut end = bytes.len();
    while end > 1 && bytes[end - 1] == b'/' {
        end -= 1;
    }
    let trimmed = &bytes[..end];

    let Some(slash) = trimmed.iter().rposition(|&b| b == b'/') else {
        return PathBuf::from(".");
    };

    let mut parent_end = slash;
    while parent_end > 0 && trimmed[parent_end - 1] == b'/' {
        parent_end -= 1;
    }
    if parent_end == 0 {
        return PathBuf::from(if slash == 1 { "//" } else { "/" });
    }
    PathBuf::from(OsStr::from_bytes(&trimmed[..parent_end]))
}
