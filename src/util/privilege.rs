//! Privilege level and user-identity lookup.

use crate::constants;
use nix::unistd::User;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Check if the current process is running as root (euid 0).
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// A numeric user/group pair, or the sentinel for a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Identity {
    Resolved { uid: u32, gid: u32 },
    Unresolved,
}

impl Identity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Identity::Resolved { uid, gid }
    }

    /// Effective uid/gid of the running process.
    pub fn current() -> Self {
        Identity::new(
            nix::unistd::geteuid().as_raw(),
            nix::unistd::getegid().as_raw(),
        )
    }

    pub fn uid(&self) -> Option<u32> {
        match self {
            Identity::Resolved { uid, .. } => Some(*uid),
            Identity::Unresolved => None,
        }
    }

    pub fn gid(&self) -> Option<u32> {
        match self {
            Identity::Resolved { gid, .. } => Some(*gid),
            Identity::Unresolved => None,
        }
    }

    /// User of `self` combined with the group of `other`; unresolved if
    /// either side is.
    pub fn with_group_of(&self, other: &Identity) -> Identity {
        match (self.uid(), other.gid()) {
            (Some(uid), Some(gid)) => Identity::new(uid, gid),
            _ => Identity::Unresolved,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Resolved { uid, gid } => write!(f, "{}:{}", uid, gid),
            Identity::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Maps a username to its uid and primary gid.
pub trait IdentityLookup {
    fn lookup(&self, name: &str) -> Option<Identity>;
}

/// Lookup backed by the system passwd database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUsers;

impl IdentityLookup for SystemUsers {
    fn lookup(&self, name: &str) -> Option<Identity> {
        match User::from_name(name) {
            Ok(Some(user)) => Some(Identity::new(user.uid.as_raw(), user.gid.as_raw())),
            Ok(None) => None,
            Err(e) => {
                debug!(user = name, error = %e, "passwd lookup failed");
                None
            }
        }
    }
}

/// Resolve the lowest-privileged account, falling back to `nobody`.
pub fn resolve_lowest(lookup: &dyn IdentityLookup, name: &str) -> Identity {
    if let Some(identity) = lookup.lookup(name) {
        return identity;
    }
    if let Some(identity) = lookup.lookup(constants::FALLBACK_LOWEST_USER) {
        warn!(
            user = name,
            fallback = constants::FALLBACK_LOWEST_USER,
            "lowest user not found, using fallback account"
        );
        return identity;
    }
    warn!(
        user = name,
        "neither the lowest user nor the fallback account exists; ownership will not be assigned"
    );
    Identity::Unresolved
}
