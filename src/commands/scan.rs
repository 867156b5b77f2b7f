use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use pkgvet::models::InstallHookPolicy;
use pkgvet::plugins::{loader, CheckFactories};
use pkgvet::{output, PackageSource, ScanReport, Scanner, Severity};

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Package directories to scan, in install order
    #[arg(required = true)]
    pub packages: Vec<PathBuf>,

    /// Plan name or file (default: basic)
    #[arg(short, long)]
    pub plan: Option<String>,

    /// Package directory to install before the scanned packages (repeatable)
    #[arg(long = "pre-install")]
    pub pre_install: Vec<PathBuf>,

    /// Lowest severity that fails the scan [MINOR|MAJOR|SEVERE]
    #[arg(long, default_value = "MAJOR")]
    pub fail_on: Severity,

    /// Install hook policy [ABORT|REPORT|PROHIBIT|SKIP] (overrides the plan)
    #[arg(long)]
    pub hook_policy: Option<InstallHookPolicy>,

    /// Output format [text|json]
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Output file (default stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Returns whether the report passed. Fatal errors still emit an incomplete
/// report before they are returned.
pub fn run(args: ScanArgs) -> Result<bool> {
    match scan(&args) {
        Ok(report) => {
            write_report(&args, &report)?;
            Ok(report.passed)
        }
        Err(e) => {
            let report = ScanReport::incomplete(args.fail_on, format!("{e:#}"));
            write_report(&args, &report)?;
            Err(e)
        }
    }
}

fn scan(args: &ScanArgs) -> Result<ScanReport> {
    let plan = loader::load_plan(args.plan.as_deref()).context("failed to load plan")?;
    let mut resolved = loader::resolve(&plan).with_context(|| format!("failed to resolve plan {}", plan.name))?;
    if let Some(policy) = args.hook_policy {
        resolved.hook_policy = policy;
    }
    resolved.pre_install.extend(args.pre_install.iter().cloned());
    info!(plan = %resolved.name, checks = resolved.checks.len(), "resolved plan");

    let scanner = Scanner::from_plan(&resolved, &CheckFactories::with_builtins())?.fail_on(args.fail_on);
    let packages = args.packages.iter().cloned().map(PackageSource::Dir).collect();
    let report = scanner.scan(packages).context("scan failed")?;
    Ok(report)
}

fn write_report(args: &ScanArgs, report: &ScanReport) -> Result<()> {
    let s = if args.format == "json" {
        output::format_json_report(report)?
    } else {
        output::format_text_report(report)
    };
    if let Some(p) = &args.output {
        std::fs::write(p, s).with_context(|| format!("failed to write output: {}", p.display()))?;
    } else {
        println!("{}", s);
    }
    Ok(())
}
