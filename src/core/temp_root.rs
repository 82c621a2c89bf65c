//! The per-process instance temp root.
//!
//! The root is computed once and published twice: in a process-wide handle
//! for this process, and in `INSTANCE_TEMP_DIR` so descendant processes
//! inherit the same value. The handle is written by a single initializing
//! caller before workers start; concurrent writers are not supported.

use crate::constants;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

static PUBLISHED: Mutex<Option<PathBuf>> = Mutex::new(None);

/// The system temp directory: `$TMPDIR` when non-empty, else `/tmp`.
pub fn system_temp_dir() -> PathBuf {
    non_empty_env(constants::SYSTEM_TEMP_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_SYSTEM_TEMP_DIR))
}

/// Return the instance temp root.
///
/// Unless `bypass_cache` is set, a previously published root (in this
/// process or inherited through the environment) is returned verbatim,
/// without checking that it exists. Otherwise the root is computed as
/// `<base>/instance.<pid>`, where `base` is `system_temp_dir` when given
/// and non-empty, else [`system_temp_dir()`], and then published.
pub fn locate(bypass_cache: bool, system_temp_dir: Option<&Path>) -> PathBuf {
    let mut published = PUBLISHED.lock().unwrap_or_else(PoisonError::into_inner);

    if !bypass_cache {
        if let Some(root) = published.as_ref() {
            return root.clone();
        }
        if let Some(inherited) = non_empty_env(constants::TEMP_DIR_ENV) {
            let root = PathBuf::from(inherited);
            debug!(root = %root.display(), "using inherited temp root");
            *published = Some(root.clone());
            return root;
        }
    }

    let root = compute(system_temp_dir);
    env::set_var(constants::TEMP_DIR_ENV, &root);
    debug!(root = %root.display(), "published temp root");
    *published = Some(root.clone());
    root
}

fn compute(base_override: Option<&Path>) -> PathBuf {
    let base = base_override
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(system_temp_dir);
    base.join(format!(
        "{}.{}",
        constants::TEMP_DIR_PREFIX,
        std::process::id()
    ))
}

fn non_empty_env(name: &str) -> Option<OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

#[cfg(test)]
fn forget() {
    *PUBLISHED.lock().unwrap_or_else(PoisonError::into_inner) = None;
    env::remove_var(constants::TEMP_DIR_ENV);
}
