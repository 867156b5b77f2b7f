use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use pkgvet::{output, Severity};

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Saved scan report (`pkgvet scan --format json`)
    pub input: PathBuf,

    /// Judge the report against another severity gate
    #[arg(long)]
    pub fail_on: Option<Severity>,

    /// Output format [html|text]
    #[arg(short, long, default_value = "html", value_parser = ["html", "text"])]
    pub format: String,

    /// Output file (default stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Returns whether the report passes, after any re-gating.
pub fn run(args: ReportArgs) -> Result<bool> {
    let bytes = fs::read(&args.input).with_context(|| format!("failed to read report: {}", args.input.display()))?;
    let mut report = output::parse_json_report(&bytes)
        .with_context(|| format!("{} is not a pkgvet scan report", args.input.display()))?;

    if let Some(fail_on) = args.fail_on {
        debug!(from = %report.fail_on, to = %fail_on, "re-gating report");
        report.passed = report.passes(fail_on);
        report.fail_on = fail_on;
    }

    let rendered = match args.format.as_str() {
        "text" => output::format_text_report(&report),
        _ => output::render_html_report(&report),
    };
    match &args.output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("failed to write output: {}", path.display()))?
        }
        None => print!("{rendered}"),
    }
    Ok(report.passed)
}
