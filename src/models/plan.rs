//! Plans, checklists and the check specs they carry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::repo::{NodeTypeDef, PrivilegeDef};

/// One configured check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "impl", skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    /// Name of another check whose implementation and config this one extends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl CheckSpec {
    pub fn new(name: &str, implementation: &str) -> Self {
        Self {
            name: name.to_string(),
            implementation: Some(implementation.to_string()),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// No implementation: usable only as a template target or skip marker.
    pub fn is_abstract(&self) -> bool {
        self.implementation
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.is_abstract() {
            "no implementation"
        } else if self.name.trim().is_empty() {
            "empty name"
        } else if self.name.contains('/') {
            "name must not contain '/'"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidCheckSpec {
            name: self.name.clone(),
            reason,
        })
    }
}

/// `jcrNamespaces` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMapping {
    pub prefix: String,
    pub uri: String,
}

/// `jcrNodetypes` value: supertypes plus `mixin`/`abstract` attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeTypeSpec {
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedRoot {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixin_types: Vec<String>,
}

impl ForcedRoot {
    pub fn new(path: &str, primary_type: Option<&str>, mixin_types: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            primary_type: primary_type.map(str::to_string),
            mixin_types: mixin_types.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Repository setup applied before any package.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitStage {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jcr_namespaces: Vec<NamespaceMapping>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jcr_nodetypes: BTreeMap<String, NodeTypeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jcr_privileges: Vec<PrivilegeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forced_roots: Vec<ForcedRoot>,
}

impl InitStage {
    pub fn is_empty(&self) -> bool {
        self.jcr_namespaces.is_empty()
            && self.jcr_nodetypes.is_empty()
            && self.jcr_privileges.is_empty()
            && self.forced_roots.is_empty()
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.jcr_namespaces.push(NamespaceMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        self
    }

    pub fn node_type(mut self, name: &str, extends: &[&str], attributes: &[&str]) -> Self {
        self.jcr_nodetypes.insert(
            name.to_string(),
            NodeTypeSpec {
                extends: extends.iter().map(|s| s.to_string()).collect(),
                attributes: attributes.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn forced_root(mut self, root: ForcedRoot) -> Self {
        self.forced_roots.push(root);
        self
    }

    pub fn node_type_defs(&self) -> Vec<NodeTypeDef> {
        self.jcr_nodetypes
            .iter()
            .map(|(name, spec)| {
                let has = |attr: &str| spec.attributes.iter().any(|a| a.eq_ignore_ascii_case(attr));
                NodeTypeDef {
                    name: name.clone(),
                    supertypes: spec.extends.clone(),
                    mixin: has("mixin"),
                    is_abstract: has("abstract"),
                }
            })
            .collect()
    }
}

/// A named group of checks plus the init stage they rely on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    #[serde(default)]
    pub module_name: String,
    pub name: String,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    #[serde(flatten)]
    pub init: InitStage,
}

impl Checklist {
    /// `<module>/<checklist>/`; either segment is omitted when empty, and the
    /// checklist segment when it equals the module.
    pub fn check_prefix(&self) -> String {
        let mut prefix = String::new();
        if !self.module_name.is_empty() {
            prefix.push_str(&self.module_name);
            prefix.push('/');
        }
        if !self.name.is_empty() && self.name != self.module_name {
            prefix.push_str(&self.name);
            prefix.push('/');
        }
        prefix
    }

    /// Valid checks under the checklist prefix; invalid ones are dropped.
    pub fn prefixed_checks(&self) -> Vec<EffectiveCheck> {
        let prefix = self.check_prefix();
        self.checks
            .iter()
            .filter(|spec| match spec.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(checklist = %self.name, error = %e, "dropping check spec");
                    false
                }
            })
            .map(|spec| EffectiveCheck {
                prefix: prefix.clone(),
                spec: spec.clone(),
            })
            .collect()
    }
}

/// A check spec as it will be instantiated, with its checklist prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveCheck {
    pub prefix: String,
    pub spec: CheckSpec,
}

impl EffectiveCheck {
    pub fn unprefixed(spec: CheckSpec) -> Self {
        Self {
            prefix: String::new(),
            spec,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}{}", self.prefix, self.spec.name)
    }

    /// Referenced either by full name or by the bare spec name.
    pub fn is_named(&self, name: &str) -> bool {
        self.spec.name == name || self.full_name() == name
    }
}

/// How package install hooks are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstallHookPolicy {
    /// Hook failures abort the package install.
    Abort,
    /// Hook failures are recorded and the install goes on.
    #[default]
    Report,
    /// Declaring hooks at all is a violation; the package is not installed.
    Prohibit,
    /// Hooks never run.
    Skip,
}

impl fmt::Display for InstallHookPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallHookPolicy::Abort => "ABORT",
            InstallHookPolicy::Report => "REPORT",
            InstallHookPolicy::Prohibit => "PROHIBIT",
            InstallHookPolicy::Skip => "SKIP",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown install hook policy: {0}")]
pub struct UnknownHookPolicy(pub String);

impl FromStr for InstallHookPolicy {
    type Err = UnknownHookPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ABORT" => Ok(InstallHookPolicy::Abort),
            "REPORT" => Ok(InstallHookPolicy::Report),
            "PROHIBIT" => Ok(InstallHookPolicy::Prohibit),
            "SKIP" => Ok(InstallHookPolicy::Skip),
            _ => Err(UnknownHookPolicy(s.to_string())),
        }
    }
}

/// A scan configuration as written by the user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(skip)]
    pub name: String,
    /// Directory relative `preInstallUrls` resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub checklists: Vec<String>,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    #[serde(default)]
    pub pre_install_urls: Vec<String>,
    #[serde(flatten)]
    pub init: InitStage,
    #[serde(default)]
    pub enable_pre_install_hooks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_hook_policy: Option<InstallHookPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_spec_validation() {
        assert!(CheckSpec::new("OSGi Configs Check", "paths").validate().is_ok());
        assert!(matches!(
            CheckSpec::new("bad/name", "paths").validate(),
            Err(ConfigError::InvalidCheckSpec { .. })
        ));
        assert!(CheckSpec::new("", "paths").validate().is_err());
        let abstract_spec = CheckSpec {
            name: "placeholder".into(),
            ..CheckSpec::default()
        };
        assert!(abstract_spec.is_abstract());
        assert!(abstract_spec.validate().is_err());
    }

    #[test]
    fn checklist_prefixes() {
        let mut list = Checklist {
            module_name: "acme.checks".into(),
            name: "basic".into(),
            ..Checklist::default()
        };
        assert_eq!(list.check_prefix(), "acme.checks/basic/");
        list.name = "acme.checks".into();
        assert_eq!(list.check_prefix(), "acme.checks/");
        list.module_name.clear();
        assert_eq!(list.check_prefix(), "acme.checks/");
    }

    #[test]
    fn checklist_drops_invalid_checks() {
        let list: Checklist = serde_json::from_value(json!({
            "name": "basic",
            "checks": [
                {"name": "paths", "impl": "paths"},
                {"name": "bad/name", "impl": "paths"},
                {"name": "abstract"}
            ],
            "jcrNamespaces": [{"prefix": "acme", "uri": "urn:acme"}]
        }))
        .unwrap();
        let checks = list.prefixed_checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].full_name(), "basic/paths");
        assert!(checks[0].is_named("paths"));
        assert!(checks[0].is_named("basic/paths"));
        assert_eq!(list.init.jcr_namespaces[0].prefix, "acme");
    }

    #[test]
    fn plan_reads_camel_case_keys() {
        let plan: Plan = serde_json::from_value(json!({
            "checklists": ["basic"],
            "installHookPolicy": "PROHIBIT",
            "enablePreInstallHooks": true,
            "preInstallUrls": ["deps/base"],
            "forcedRoots": [{"path": "/content/acme", "primaryType": "sling:Folder"}],
            "jcrNodetypes": {"sling:Folder": {"extends": ["nt:folder"]}},
            "jcrPrivileges": ["acme:approve", {"name": "acme:all", "contains": ["acme:approve"]}]
        }))
        .unwrap();
        assert_eq!(plan.install_hook_policy, Some(InstallHookPolicy::Prohibit));
        assert!(plan.enable_pre_install_hooks);
        assert_eq!(plan.init.forced_roots[0].primary_type.as_deref(), Some("sling:Folder"));
        let defs = plan.init.node_type_defs();
        assert_eq!(defs[0].supertypes, vec!["nt:folder"]);
        assert!(!defs[0].mixin);
        assert_eq!(plan.init.jcr_privileges.len(), 2);
    }

    #[test]
    fn hook_policy_parses_case_insensitively() {
        assert_eq!("skip".parse::<InstallHookPolicy>().unwrap(), InstallHookPolicy::Skip);
        assert!("never".parse::<InstallHookPolicy>().is_err());
        assert_eq!(InstallHookPolicy::default(), InstallHookPolicy::Report);
    }
}
