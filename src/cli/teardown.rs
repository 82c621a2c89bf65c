use crate::cli::CliContext;
use crate::core::paths::InstancePaths;
use crate::core::probe::FileType;
use crate::core::provision;
use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Temp root to remove (default: the located instance root)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(ctx: &CliContext, args: TeardownArgs) -> Result<()> {
    let base = ctx.system_temp_dir(None);
    let paths = InstancePaths::resolve(args.root, base.as_deref());

    if ctx.prober(Some(0)).classify(&paths.root)? == FileType::Nonexistent {
        println!("nothing to remove at {}", paths.root.display());
        return Ok(());
    }

    if !args.yes {
        if ctx.non_interactive {
            bail!("teardown requires --yes in non-interactive mode");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove {} and everything below it?", paths.root.display()))
            .default(false)
            .interact()
            .context("read confirmation")?;
        if !confirmed {
            println!("aborted");
            return Ok(());
        }
    }

    provision::teardown(&paths.root).with_context(|| format!("tear down {}", paths))?;
    println!("removed {}", paths.root.display());
    Ok(())
}
