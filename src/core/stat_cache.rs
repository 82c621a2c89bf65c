//! A small bounded stat cache honouring a per-call staleness bound.

use crate::core::probe::StatCache;
use crate::util::fs::retry_eintr;
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Entry {
    fetched_at: Instant,
    // None records a confirmed "no such entry".
    meta: Option<Metadata>,
}

impl Entry {
    fn to_result(&self) -> io::Result<Metadata> {
        self.meta
            .clone()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// Caches `stat` results (including not-found) per path.
///
/// A cached result is served while it is younger than the caller's
/// `max_staleness`; a zero bound always stats afresh. When full, the oldest
/// entry is evicted. Errors other than not-found are never cached.
pub struct ThrottledStatCache {
    capacity: usize,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl ThrottledStatCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatCache for ThrottledStatCache {
    fn stat_with_throttle(&self, path: &Path, max_staleness: Duration) -> io::Result<Metadata> {
        if let Some(entry) = self.lock().get(path) {
            if entry.fetched_at.elapsed() < max_staleness {
                return entry.to_result();
            }
        }

        // The lock is not held across stat; the timestamp predates it.
        let fetched_at = Instant::now();
        let meta = match retry_eintr(|| fs::metadata(path)) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                self.lock().remove(path);
                return Err(e);
            }
        };
        let entry = Entry { fetched_at, meta };
        let result = entry.to_result();

        let mut entries = self.lock();
        if let Some(existing) = entries.get(path) {
            if existing.fetched_at > fetched_at {
                return result;
            }
        } else if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(path.to_path_buf(), entry);
        result
    }
}
