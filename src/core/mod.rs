//! Core logic: probing, temp-root location, provisioning.

pub mod app_root;
pub mod config;
pub mod paths;
pub mod probe;
pub mod provision;
pub mod stat_cache;
pub mod temp_root;
