//! Configuration file model.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    #[serde(default)]
    pub provision: ProvisionSection,
    #[serde(default)]
    pub probe: ProbeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionSection {
    /// Workers run under per-application users.
    #[serde(default)]
    pub user_switching: bool,

    /// Account owning artifacts that must stay reachable without privilege.
    #[serde(default = "default_lowest_user")]
    pub lowest_user: String,

    /// Base directory for the temp root (default: `$TMPDIR` or `/tmp`).
    #[serde(default)]
    pub system_temp_dir: Option<PathBuf>,

    /// Account worker processes run as (default: the current user).
    #[serde(default)]
    pub worker_user: Option<String>,
}

impl Default for ProvisionSection {
    fn default() -> Self {
        Self {
            user_switching: false,
            lowest_user: default_lowest_user(),
            system_temp_dir: None,
            worker_user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSection {
    /// Maximum age of a cached stat result, in milliseconds.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
        }
    }
}

fn default_lowest_user() -> String {
    constants::FALLBACK_LOWEST_USER.to_string()
}

fn default_throttle_ms() -> u64 {
    constants::DEFAULT_THROTTLE_MS
}
