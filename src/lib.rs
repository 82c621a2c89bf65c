//! Private temp-directory provisioning for privilege-separated servers.
//!
//! A supervisor running as root creates one temp root per instance and
//! hands its subdirectories to worker and lowest-privileged users according
//! to a fixed decision table. Supporting pieces resolve paths and classify
//! files through an optional throttled stat cache.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Provisioning, temp-root location, probing, app-root detection
//! - `error`: Typed errors of the library surface
//! - `models`: Configuration structures
//! - `util`: Filesystem, path, mode, and privilege primitives

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;
