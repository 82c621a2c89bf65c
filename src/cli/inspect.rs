//! Read-only path inspection: classification and resolution.

use crate::cli::CliContext;
use crate::util::path;
use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    pub path: PathBuf,

    /// Maximum age of a cached stat result (overrides the config file)
    #[arg(long, value_name = "MS")]
    pub throttle_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolveMode {
    /// Resolve every symlink and dot component; the path must exist
    Canonical,
    /// Follow the path one level if it is a symlink
    OneLevel,
    /// Parent directory, computed without touching the filesystem
    DirName,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub path: PathBuf,

    #[arg(long, value_enum, default_value = "canonical")]
    pub mode: ResolveMode,
}

pub fn run_classify(ctx: &CliContext, args: ClassifyArgs) -> Result<()> {
    let file_type = ctx.prober(args.throttle_ms).classify(&args.path)?;
    println!("{}", file_type);
    Ok(())
}

pub fn run_resolve(args: ResolveArgs) -> Result<()> {
    let resolved = match args.mode {
        ResolveMode::Canonical => path::canonicalize(&args.path)?,
        ResolveMode::OneLevel => path::resolve_one_symlink(&args.path)?,
        ResolveMode::DirName => path::dir_name(&args.path),
    };
    println!("{}", resolved.display());
    Ok(())
}
