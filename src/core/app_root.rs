//! Application-root detection by marker file.

use crate::constants;
use crate::core::probe::Prober;
use crate::error::ProbeError;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    Rails,
    Rack,
    Wsgi,
}

impl AppKind {
    pub const ALL: [AppKind; 3] = [AppKind::Rails, AppKind::Rack, AppKind::Wsgi];

    /// Path of the marker file, relative to the application root.
    pub fn marker(self) -> &'static str {
        match self {
            AppKind::Rails => constants::RAILS_MARKER,
            AppKind::Rack => constants::RACK_MARKER,
            AppKind::Wsgi => constants::WSGI_MARKER,
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppKind::Rails => "rails",
            AppKind::Rack => "rack",
            AppKind::Wsgi => "wsgi",
        };
        f.write_str(name)
    }
}

/// Whether `dir` holds the marker file of `kind` as a regular file.
pub fn verify(dir: &Path, kind: AppKind, prober: &Prober) -> Result<bool, ProbeError> {
    prober.exists(&dir.join(kind.marker()))
}

/// First kind (Rails, Rack, WSGI) whose marker is present under `dir`.
pub fn detect(dir: &Path, prober: &Prober) -> Result<Option<AppKind>, ProbeError> {
    for kind in AppKind::ALL {
        if verify(dir, kind, prober)? {
            return Ok(Some(kind));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_verify_rack() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.ru"), b"run App").unwrap();
        let prober = Prober::uncached();
        assert!(verify(dir.path(), AppKind::Rack, &prober).unwrap());
        assert!(!verify(dir.path(), AppKind::Rails, &prober).unwrap());
        assert!(!verify(dir.path(), AppKind::Wsgi, &prober).unwrap());
    }

    #[test]
    fn test_verify_rails_nested_marker() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/environment.rb"), b"").unwrap();
        assert!(verify(dir.path(), AppKind::Rails, &Prober::uncached()).unwrap());
    }

    #[test]
    fn test_marker_directory_does_not_count() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("passenger_wsgi.py")).unwrap();
        assert!(!verify(dir.path(), AppKind::Wsgi, &Prober::uncached()).unwrap());
    }

    #[test]
    fn test_detect_prefers_rails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/environment.rb"), b"").unwrap();
        fs::write(dir.path().join("config.ru"), b"").unwrap();
        assert_eq!(
            detect(dir.path(), &Prober::uncached()).unwrap(),
            Some(AppKind::Rails)
        );
    }

    #[test]
    fn test_detect_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect(dir.path(), &Prober::uncached()).unwrap(), None);
    }
}
