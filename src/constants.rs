//! Centralized constants for environment handles, modes, and layout names.

/// Environment variable carrying the published instance temp root.
pub const TEMP_DIR_ENV: &str = "INSTANCE_TEMP_DIR";

/// Environment variable overriding the system temp directory.
pub const SYSTEM_TEMP_DIR_ENV: &str = "TMPDIR";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "INSTANCE_TMP_CONFIG";

/// Fallback system temp directory.
pub const DEFAULT_SYSTEM_TEMP_DIR: &str = "/tmp";

/// Prefix of the per-process temp root name (`<prefix>.<pid>`).
pub const TEMP_DIR_PREFIX: &str = "instance";

/// Account used when the configured lowest-privileged user does not exist.
pub const FALLBACK_LOWEST_USER: &str = "nobody";

/// Mode for the temp root itself.
pub const ROOT_DIR_MODE: &str = "u=wxs,g=x,o=x";

/// Bits granted to the owner before teardown removes a tree.
pub const TEARDOWN_RELAX_BITS: u32 = 0o700;

pub const WEBSERVER_PRIVATE_DIR: &str = "webserver_private";
pub const INFO_DIR: &str = "info";
pub const MASTER_DIR: &str = "master";
pub const BACKENDS_DIR: &str = "backends";
pub const VAR_DIR: &str = "var";

/// Default stat throttle; zero means every probe performs a fresh stat.
pub const DEFAULT_THROTTLE_MS: u64 = 0;

/// Maximum number of paths held by the stat cache.
pub const STAT_CACHE_CAPACITY: usize = 256;

/// Marker file identifying a Rails application root.
pub const RAILS_MARKER: &str = "config/environment.rb";

/// Marker file identifying a Rack application root.
pub const RACK_MARKER: &str = "config.ru";

/// Marker file identifying a WSGI application root.
pub const WSGI_MARKER: &str = "passenger_wsgi.py";
