use anyhow::{Context, Result};
use clap::Args;

use pkgvet::plugins::loader;

#[derive(Args, Debug, Clone)]
pub struct ChecksArgs {
    /// Plan name or file (default: basic)
    #[arg(short, long)]
    pub plan: Option<String>,

    /// List the built-in plans instead
    #[arg(long)]
    pub list_plans: bool,
}

pub fn run(args: ChecksArgs) -> Result<()> {
    if args.list_plans {
        for name in loader::builtin_plans() {
            println!("{}", name);
        }
        return Ok(());
    }

    let plan = loader::load_plan(args.plan.as_deref()).context("failed to load plan")?;
    let resolved = loader::resolve(&plan).with_context(|| format!("failed to resolve plan {}", plan.name))?;

    println!("plan: {} (hooks: {})", resolved.name, resolved.hook_policy);
    for check in &resolved.checks {
        let implementation = check.spec.implementation.as_deref().unwrap_or_default();
        if check.spec.config.is_null() {
            println!("  {} [{}]", check.full_name(), implementation);
        } else {
            println!("  {} [{}] {}", check.full_name(), implementation, check.spec.config);
        }
    }
    for path in &resolved.pre_install {
        println!("  pre-install: {}", path.display());
    }
    Ok(())
}
