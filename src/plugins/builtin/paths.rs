//! Allow/deny rules over imported and deleted paths.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::models::package::PackageId;
use crate::models::severity::Severity;
use crate::plugins::check::{CheckContext, ProgressCheck};
use crate::repo::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RuleType {
    Allow,
    Deny,
}

#[derive(Debug, Deserialize)]
struct RuleConfig {
    #[serde(rename = "type")]
    kind: RuleType,
    pattern: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathsConfig {
    #[serde(default)]
    rules: Vec<RuleConfig>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    deny_node_deletes: bool,
}

struct PathRule {
    kind: RuleType,
    pattern: Regex,
}

pub struct Paths {
    rules: Vec<PathRule>,
    severity: Severity,
    deny_node_deletes: bool,
}

impl Paths {
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let config: PathsConfig = if config.is_null() {
            PathsConfig::default()
        } else {
            serde_json::from_value(config.clone()).context("paths check config")?
        };
        let severity = match config.severity.as_deref() {
            Some(s) => s.parse()?,
            None => Severity::Major,
        };
        let rules = config
            .rules
            .into_iter()
            .map(|rule| {
                let pattern = Regex::new(&format!("^(?:{})$", rule.pattern))
                    .with_context(|| format!("invalid path pattern {:?}", rule.pattern))?;
                Ok(PathRule {
                    kind: rule.kind,
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            severity,
            deny_node_deletes: config.deny_node_deletes,
        })
    }

    /// Last matching rule decides; no match allows.
    fn is_denied(&self, path: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(path))
            .is_some_and(|rule| rule.kind == RuleType::Deny)
    }
}

impl ProgressCheck for Paths {
    fn imported_path(&mut self, ctx: &mut CheckContext, _package: &PackageId, path: &str, _node: &dyn Node) -> Result<()> {
        if self.is_denied(path) {
            ctx.report(self.severity, format!("imported path {path} is denied"));
        }
        Ok(())
    }

    fn deleted_path(&mut self, ctx: &mut CheckContext, _package: &PackageId, path: &str) -> Result<()> {
        if self.deny_node_deletes {
            ctx.report(self.severity, format!("deleted path {path}; node deletes are denied"));
        } else if self.is_denied(path) {
            ctx.report(self.severity, format!("deleted path {path} is denied"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_matching_rule_wins() {
        let paths = Paths::from_config(&json!({
            "rules": [
                {"type": "deny", "pattern": "/apps/.*"},
                {"type": "allow", "pattern": "/apps/acme(/.*)?"}
            ]
        }))
        .unwrap();
        assert!(paths.is_denied("/apps/other"));
        assert!(!paths.is_denied("/apps/acme/components"));
        assert!(!paths.is_denied("/content/acme"));
        assert_eq!(paths.severity, Severity::Major);
    }

    #[test]
    fn config_errors_are_reported() {
        assert!(Paths::from_config(&json!({"severity": "fatal"})).is_err());
        assert!(Paths::from_config(&json!({"rules": [{"type": "deny", "pattern": "("}]})).is_err());
        assert!(Paths::from_config(&serde_json::Value::Null).is_ok());
    }
}
