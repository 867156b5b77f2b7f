use anyhow::{Context, Result};
use glob::Pattern;
use serde::Deserialize;

use crate::models::package::PackageId;
use crate::models::severity::Severity;
use crate::plugins::check::{CheckContext, ProgressCheck};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubpackagesConfig {
    #[serde(default)]
    deny_all: bool,
    /// Globs over `group/name`.
    #[serde(default)]
    deny: Vec<String>,
    #[serde(default)]
    severity: Option<String>,
}

/// Reports embedded subpackages.
pub struct Subpackages {
    deny_all: bool,
    deny: Vec<Pattern>,
    severity: Severity,
}

impl Subpackages {
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let config: SubpackagesConfig = if config.is_null() {
            SubpackagesConfig::default()
        } else {
            serde_json::from_value(config.clone()).context("subpackages check config")?
        };
        let deny = config
            .deny
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("invalid subpackage glob {p:?}")))
            .collect::<Result<Vec<_>>>()?;
        let severity = match config.severity.as_deref() {
            Some(s) => s.parse()?,
            None => Severity::Major,
        };
        Ok(Self {
            deny_all: config.deny_all,
            deny,
            severity,
        })
    }

    fn is_denied(&self, package: &PackageId) -> bool {
        let key = package.group_and_name();
        self.deny_all || self.deny.iter().any(|p| p.matches(&key))
    }
}

impl ProgressCheck for Subpackages {
    fn identify_subpackage(&mut self, ctx: &mut CheckContext, package: &PackageId, parent: &PackageId) -> Result<()> {
        if self.is_denied(package) {
            ctx.report_for(
                self.severity,
                format!("subpackage {package} of {parent} is denied"),
                [parent.clone(), package.clone()],
            );
        }
        Ok(())
    }
}
