//! Error types for path resolution, probing, and provisioning.
//!
//! Every variant carries the path it concerns and the underlying OS error so
//! callers can report the failure without re-deriving context.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Failures of the path resolver.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path (or one of its components) could not be resolved.
    #[error("cannot resolve the path '{}': {source}", path.display())]
    Resolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path is a symlink whose target is the empty string.
    #[error("'{}' is a symlink that refers to an empty filename", path.display())]
    EmptySymlinkTarget { path: PathBuf },
}

/// Failures of the file-type prober.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// `stat` failed for a reason other than the entry not existing.
    #[error("cannot stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A symbolic permission string that cannot be turned into mode bits.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid symbolic mode '{mode}': {reason}")]
pub struct ModeError {
    pub mode: String,
    pub reason: String,
}

/// Failures of provisioning and teardown.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A directory could not be created or its mode could not be applied.
    #[error("cannot create directory '{}': {source}", path.display())]
    CreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The mode assigned to a directory is malformed.
    #[error("invalid mode for '{}': {source}", path.display())]
    InvalidMode {
        path: PathBuf,
        #[source]
        source: ModeError,
    },

    /// `chown` failed even though the process is privileged.
    #[error("cannot change the owner of '{}' to {uid}:{gid}: {source}", path.display())]
    OwnershipChangeFailed {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: Errno,
    },

    /// The recursive removal step of teardown failed.
    #[error("cannot remove directory '{}': {source}", path.display())]
    DeletionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The existence check before creating a directory failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
}
