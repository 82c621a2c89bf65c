//! CLI routing and command dispatch.

use crate::constants;
use crate::core::config;
use crate::core::probe::Prober;
use crate::core::stat_cache::ThrottledStatCache;
use crate::models::config::InstanceConfig;
use crate::util::privilege::{Identity, IdentityLookup, SystemUsers};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub mod doctor;
pub mod inspect;
pub mod locate;
pub mod provision;
pub mod teardown;
pub mod verify_app;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config: InstanceConfig,
    pub non_interactive: bool,
}

impl CliContext {
    /// Prober honouring the configured throttle; zero disables the cache.
    pub fn prober(&self, throttle_ms: Option<u64>) -> Prober {
        let throttle_ms = throttle_ms.unwrap_or(self.config.probe.throttle_ms);
        if throttle_ms == 0 {
            return Prober::uncached();
        }
        Prober::cached(
            Arc::new(ThrottledStatCache::new(constants::STAT_CACHE_CAPACITY)),
            Duration::from_millis(throttle_ms),
        )
    }

    /// Explicit base directory from the flag, else from the config file.
    pub fn system_temp_dir(&self, arg: Option<PathBuf>) -> Option<PathBuf> {
        arg.or_else(|| self.config.provision.system_temp_dir.clone())
    }

    /// Worker identity from explicit ids, a username, or the current process.
    pub fn worker_identity(
        &self,
        uid: Option<u32>,
        gid: Option<u32>,
        user: Option<&str>,
    ) -> Result<Identity> {
        if let (Some(uid), Some(gid)) = (uid, gid) {
            return Ok(Identity::new(uid, gid));
        }
        match user.or(self.config.provision.worker_user.as_deref()) {
            Some(name) => SystemUsers
                .lookup(name)
                .ok_or_else(|| anyhow!("worker user '{}' does not exist", name)),
            None => Ok(Identity::current()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "instance-tmp",
    version,
    about = "Provision per-instance temp directories for privilege-separated servers"
)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "PATH", env = constants::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "INSTANCE_TMP_NON_INTERACTIVE")]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => config::load(path)?,
            None => InstanceConfig::default(),
        };
        let ctx = CliContext {
            config,
            non_interactive: self.non_interactive,
        };

        match self.command {
            Commands::Locate(args) => locate::run(&ctx, args),
            Commands::Provision(args) => provision::run(&ctx, args),
            Commands::Teardown(args) => teardown::run(&ctx, args),
            Commands::Classify(args) => inspect::run_classify(&ctx, args),
            Commands::Resolve(args) => inspect::run_resolve(args),
            Commands::VerifyApp(args) => verify_app::run(&ctx, args),
            Commands::Doctor(args) => doctor::run(&ctx, args),
        }
    }
}

/// Install the stderr subscriber; an invalid filter falls back to `warn`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the instance temp root
    Locate(locate::LocateArgs),
    /// Create the instance temp tree with per-directory owners and modes
    Provision(provision::ProvisionArgs),
    /// Remove the instance temp tree
    Teardown(teardown::TeardownArgs),
    /// Classify a path (regular, directory, other, nonexistent)
    Classify(inspect::ClassifyArgs),
    /// Canonicalize a path, follow one symlink, or take its dirname
    Resolve(inspect::ResolveArgs),
    /// Check whether a directory is an application root
    VerifyApp(verify_app::VerifyAppArgs),
    /// Compare an existing tree against the expected owners and modes (read-only)
    Doctor(doctor::DoctorArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn ctx(config: InstanceConfig) -> CliContext {
        CliContext {
            config,
            non_interactive: true,
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_worker_identity_explicit_ids() {
        let ctx = ctx(InstanceConfig::default());
        assert_eq!(
            ctx.worker_identity(Some(33), Some(34), Some("ignored")).unwrap(),
            Identity::new(33, 34)
        );
    }

    #[test]
    fn test_worker_identity_defaults_to_current() {
        let ctx = ctx(InstanceConfig::default());
        assert_eq!(ctx.worker_identity(None, None, None).unwrap(), Identity::current());
    }

    #[test]
    fn test_worker_identity_unknown_user() {
        let ctx = ctx(InstanceConfig::default());
        assert!(ctx
            .worker_identity(None, None, Some("no-such-user-for-instance-tmp"))
            .is_err());
    }

    #[test]
    fn test_system_temp_dir_flag_wins() {
        let mut config = InstanceConfig::default();
        config.provision.system_temp_dir = Some(PathBuf::from("/from/config"));
        let ctx = ctx(config);
        assert_eq!(
            ctx.system_temp_dir(Some(PathBuf::from("/from/flag"))),
            Some(PathBuf::from("/from/flag"))
        );
        assert_eq!(ctx.system_temp_dir(None), Some(PathBuf::from("/from/config")));
    }
}
