//! File-type probing, optionally through a throttled stat cache.

use crate::error::ProbeError;
use crate::util::fs::retry_eintr;
use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Classification of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Other,
    Nonexistent,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::Regular => "regular",
            FileType::Directory => "directory",
            FileType::Other => "other",
            FileType::Nonexistent => "nonexistent",
        };
        f.write_str(name)
    }
}

/// A stat source that may serve results up to `max_staleness` old.
///
/// Absent entries must be reported as `io::ErrorKind::NotFound`.
pub trait StatCache: Send + Sync {
    fn stat_with_throttle(&self, path: &Path, max_staleness: Duration) -> io::Result<Metadata>;
}

/// Stat `path` (through `cache` when given) and classify the result.
///
/// Only "no such entry" maps to `Nonexistent`; every other failure is a
/// `ProbeError::Stat`.
pub fn classify(
    path: &Path,
    cache: Option<&dyn StatCache>,
    throttle: Duration,
) -> Result<FileType, ProbeError> {
    let result = match cache {
        Some(cache) => cache.stat_with_throttle(path, throttle),
        None => retry_eintr(|| fs::metadata(path)),
    };
    match result {
        Ok(meta) if meta.is_file() => Ok(FileType::Regular),
        Ok(meta) if meta.is_dir() => Ok(FileType::Directory),
        Ok(_) => Ok(FileType::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileType::Nonexistent),
        Err(source) => Err(ProbeError::Stat {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// True iff `path` is a regular file. Directories do not count.
pub fn exists(
    path: &Path,
    cache: Option<&dyn StatCache>,
    throttle: Duration,
) -> Result<bool, ProbeError> {
    Ok(classify(path, cache, throttle)? == FileType::Regular)
}

/// A cache handle and throttle interval bundled for repeated probing.
#[derive(Clone, Default)]
pub struct Prober {
    cache: Option<Arc<dyn StatCache>>,
    throttle: Duration,
}

impl Prober {
    /// Probe with a direct `stat` on every call.
    pub fn uncached() -> Self {
        Self::default()
    }

    pub fn cached(cache: Arc<dyn StatCache>, throttle: Duration) -> Self {
        Self {
            cache: Some(cache),
            throttle,
        }
    }

    pub fn classify(&self, path: &Path) -> Result<FileType, ProbeError> {
        classify(path, self.cache.as_deref(), self.throttle)
    }

    pub fn exists(&self, path: &Path) -> Result<bool, ProbeError> {
        exists(path, self.cache.as_deref(), self.throttle)
    }
}

impl fmt::Debug for Prober {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prober")
            .field("cached", &self.cache.is_some())
            .field("throttle", &self.throttle)
            .finish()
    }
}
