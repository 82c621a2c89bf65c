use crate::cli::{CliContext, OutputFormat};
use crate::core::app_root::{self, AppKind};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct VerifyAppArgs {
    /// Candidate application root
    pub dir: PathBuf,

    /// Only accept this kind of application (default: any)
    #[arg(long, value_enum)]
    pub kind: Option<AppKind>,

    /// Output format: text|json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct VerifyReport {
    dir: String,
    kind: Option<AppKind>,
    marker: Option<&'static str>,
}

pub fn run(ctx: &CliContext, args: VerifyAppArgs) -> Result<()> {
    let prober = ctx.prober(None);
    let kind = match args.kind {
        Some(kind) => app_root::verify(&args.dir, kind, &prober)?.then_some(kind),
        None => app_root::detect(&args.dir, &prober)?,
    };

    let report = VerifyReport {
        dir: args.dir.display().to_string(),
        kind,
        marker: kind.map(AppKind::marker),
    };
    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let (Some(kind), Some(marker)) = (report.kind, report.marker) {
        println!("{}: {} application ({})", report.dir, kind, marker);
    }

    if kind.is_none() {
        match args.kind {
            Some(wanted) => bail!(
                "{} is not a {} application root (missing {})",
                args.dir.display(),
                wanted,
                wanted.marker()
            ),
            None => bail!("no application marker found in {}", args.dir.display()),
        }
    }
    Ok(())
}
