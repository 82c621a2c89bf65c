use crate::cli::CliContext;
use crate::core::temp_root;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Recompute the root even if one was already published
    #[arg(long)]
    pub bypass_cache: bool,

    /// Base directory instead of $TMPDIR or /tmp
    #[arg(long, value_name = "DIR")]
    pub system_temp_dir: Option<PathBuf>,
}

pub fn run(ctx: &CliContext, args: LocateArgs) -> Result<()> {
    let base = ctx.system_temp_dir(args.system_temp_dir);
    let root = temp_root::locate(args.bypass_cache, base.as_deref());
    println!("{}", root.display());
    Ok(())
}
