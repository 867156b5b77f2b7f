mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Verbose (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install packages into a scratch repository and run the plan's checks
    Scan(commands::scan::ScanArgs),
    /// Render a JSON scan report as HTML
    Report(commands::report::ReportArgs),
    /// List the effective checks of a plan
    Checks(commands::checks::ChecksArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match args.command {
        Commands::Scan(scan_args) => match commands::scan::run(scan_args) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                eprintln!("scan failed: {:#}", e);
                2
            }
        },
        Commands::Report(report_args) => match commands::report::run(report_args) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                eprintln!("report failed: {:#}", e);
                2
            }
        },
        Commands::Checks(checks_args) => match commands::checks::run(checks_args) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("checks failed: {:#}", e);
                2
            }
        },
    };
    std::process::exit(code);
}
