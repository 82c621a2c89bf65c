//! Read-only diagnostics for a provisioned instance temp tree.

use crate::cli::{CliContext, OutputFormat};
use crate::constants;
use crate::core::paths::InstancePaths;
use crate::core::probe::FileType;
use crate::core::provision::{matrix, Privilege};
use crate::util::mode;
use crate::util::privilege::{self, Identity, SystemUsers};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Temp root to inspect (default: the located instance root)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Expect the layout for user switching on or off (overrides the config file)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub user_switching: Option<bool>,

    /// Output format: text|json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
struct CheckResult {
    name: String,
    status: Status,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    root: String,
    privilege: String,
    checks: Vec<CheckResult>,
}

impl DoctorReport {
    fn push(&mut self, name: impl Into<String>, status: Status, detail: impl Into<String>) {
        self.checks.push(CheckResult {
            name: name.into(),
            status,
            detail: detail.into(),
        });
    }

    fn count(&self, status: Status) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let settings = &ctx.config.provision;
    let user_switching = args.user_switching.unwrap_or(settings.user_switching);
    let base = ctx.system_temp_dir(None);
    let paths = InstancePaths::resolve(args.root, base.as_deref());
    let privilege = Privilege::detect(user_switching);
    let prober = ctx.prober(Some(0));

    let mut report = DoctorReport {
        root: paths.root.display().to_string(),
        privilege: privilege.to_string(),
        checks: Vec::new(),
    };

    if prober.classify(&paths.root)? != FileType::Directory {
        report.push("root", Status::Fail, format!("missing: {}", paths.root.display()));
    } else {
        report.push("root", Status::Pass, format!("exists: {}", paths.root.display()));
        check_mode(&mut report, "root", &paths.root, constants::ROOT_DIR_MODE)?;

        let lowest = privilege::resolve_lowest(&SystemUsers, &settings.lowest_user);
        let worker = ctx.worker_identity(None, None, None)?;

        for dir in matrix(privilege) {
            let Some(path) = paths.subdir(dir.name) else {
                continue;
            };
            if prober.classify(path)? != FileType::Directory {
                report.push(dir.name, Status::Fail, format!("missing: {}", path.display()));
                continue;
            }
            report.push(dir.name, Status::Pass, format!("exists: {}", path.display()));
            check_mode(&mut report, dir.name, path, dir.mode)?;
            if let Some(expected) = dir.owner.identity(lowest, worker) {
                check_owner(&mut report, dir.name, path, expected);
            }
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let failed = report.count(Status::Fail);
    if failed > 0 {
        bail!("{} check(s) failed for {}", failed, paths);
    }
    Ok(())
}

/// Permission bits only; the kernel may drop setuid/setgid on directories.
fn check_mode(report: &mut DoctorReport, name: &str, path: &Path, symbolic: &str) -> Result<()> {
    let expected = mode::parse(symbolic)? & 0o777;
    let actual = match fs::metadata(path) {
        Ok(meta) => meta.mode() & 0o777,
        Err(e) => {
            report.push(format!("{} mode", name), Status::Warn, format!("unreadable: {}", e));
            return Ok(());
        }
    };
    if actual == expected {
        report.push(format!("{} mode", name), Status::Pass, format!("{:04o}", actual));
    } else {
        report.push(
            format!("{} mode", name),
            Status::Warn,
            format!("{:04o} (expected {:04o}, {})", actual, expected, symbolic),
        );
    }
    Ok(())
}

fn check_owner(report: &mut DoctorReport, name: &str, path: &Path, expected: Identity) {
    let (Some(uid), Some(gid)) = (expected.uid(), expected.gid()) else {
        report.push(
            format!("{} owner", name),
            Status::Warn,
            "expected owner could not be resolved",
        );
        return;
    };
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            report.push(format!("{} owner", name), Status::Warn, format!("unreadable: {}", e));
            return;
        }
    };
    let actual = Identity::new(meta.uid(), meta.gid());
    if meta.uid() == uid && meta.gid() == gid {
        report.push(format!("{} owner", name), Status::Pass, actual.to_string());
    } else {
        report.push(
            format!("{} owner", name),
            Status::Warn,
            format!("{} (expected {})", actual, expected),
        );
    }
}

fn print_report(report: &DoctorReport) {
    println!("Doctor: {} ({})", report.root, report.privilege);
    for check in &report.checks {
        let tag = match check.status {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
        };
        println!("  [{}] {}: {}", tag, check.name, check.detail);
    }
    println!();
    println!(
        "Doctor summary: {} pass, {} warn, {} fail",
        report.count(Status::Pass),
        report.count(Status::Warn),
        report.count(Status::Fail)
    );
}
