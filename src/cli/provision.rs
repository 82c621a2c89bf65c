use crate::cli::{CliContext, OutputFormat};
use crate::core::paths::InstancePaths;
use crate::core::provision::{matrix, Provisioner};
use crate::core::temp_root;
use crate::util::privilege::{self, SystemUsers};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Workers run under per-application users (overrides the config file)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub user_switching: Option<bool>,

    /// Lowest-privileged account (falls back to "nobody" if missing)
    #[arg(long, value_name = "USER")]
    pub lowest_user: Option<String>,

    /// Account worker processes run as
    #[arg(long, value_name = "USER", conflicts_with_all = ["worker_uid", "worker_gid"])]
    pub worker_user: Option<String>,

    /// Worker uid (requires --worker-gid)
    #[arg(long, value_name = "UID", requires = "worker_gid")]
    pub worker_uid: Option<u32>,

    /// Worker gid (requires --worker-uid)
    #[arg(long, value_name = "GID", requires = "worker_uid")]
    pub worker_gid: Option<u32>,

    /// Base directory instead of $TMPDIR or /tmp
    #[arg(long, value_name = "DIR")]
    pub system_temp_dir: Option<PathBuf>,

    /// Output format: text|json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn run(ctx: &CliContext, args: ProvisionArgs) -> Result<()> {
    let settings = &ctx.config.provision;
    let user_switching = args.user_switching.unwrap_or(settings.user_switching);
    let lowest_user = args
        .lowest_user
        .clone()
        .unwrap_or_else(|| settings.lowest_user.clone());
    let worker = ctx.worker_identity(args.worker_uid, args.worker_gid, args.worker_user.as_deref())?;

    let base = ctx.system_temp_dir(args.system_temp_dir);
    let paths = InstancePaths::from_root(temp_root::locate(false, base.as_deref()));

    let provisioner = Provisioner::new().with_prober(ctx.prober(None));
    provisioner
        .provision(&paths.root, user_switching, &lowest_user, worker)
        .with_context(|| format!("provision {}", paths))?;

    let privilege = provisioner.privilege(user_switching);
    let lowest = privilege::resolve_lowest(&SystemUsers, &lowest_user);
    let rows = matrix(privilege);

    if args.format == OutputFormat::Json {
        let dirs: Vec<_> = rows
            .iter()
            .map(|dir| {
                serde_json::json!({
                    "name": dir.name,
                    "path": paths.subdir(dir.name).map(|p| p.display().to_string()),
                    "mode": dir.mode,
                    "owner": dir.owner.identity(lowest, worker),
                })
            })
            .collect();
        let report = serde_json::json!({
            "root": paths.root.display().to_string(),
            "privilege": privilege.to_string(),
            "user_switching": user_switching,
            "directories": dirs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("provisioned {} ({})", paths.root.display(), privilege);
    for dir in &rows {
        let owner = dir
            .owner
            .identity(lowest, worker)
            .map(|identity| identity.to_string())
            .unwrap_or_else(|| "unchanged".to_string());
        println!("  {:<18} {:<18} owner {}", dir.name, dir.mode, owner);
    }
    Ok(())
}
