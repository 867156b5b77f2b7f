use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a package by its group/name/version triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PackageId {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// `group/name`, the form used by subpackage rules.
    pub fn group_and_name(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.group, self.name)
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package id: {0:?}")]
pub struct InvalidPackageId(pub String);

impl FromStr for PackageId {
    type Err = InvalidPackageId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let id = match parts.as_slice() {
            [name] => PackageId::new("", *name, ""),
            [group, name] => PackageId::new(*group, *name, ""),
            [group, name, version] => PackageId::new(*group, *name, *version),
            _ => return Err(InvalidPackageId(s.to_string())),
        };
        if id.name.is_empty() {
            return Err(InvalidPackageId(s.to_string()));
        }
        Ok(id)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PackageId {
    type Error = InvalidPackageId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An install hook declared by a package (`installhook.<name>.class`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDecl {
    pub name: String,
    pub implementation: String,
}

/// Package metadata read from `META-INF/vault/properties.xml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageProperties {
    pub id: PackageId,
    pub entries: BTreeMap<String, String>,
}

impl PackageProperties {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn hooks(&self) -> Vec<HookDecl> {
        self.entries
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix("installhook.")?.strip_suffix(".class")?;
                if name.is_empty() || value.trim().is_empty() {
                    return None;
                }
                Some(HookDecl {
                    name: name.to_string(),
                    implementation: value.trim().to_string(),
                })
            })
            .collect()
    }

    pub fn has_hooks(&self) -> bool {
        !self.hooks().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_round_trips_through_display() {
        let id: PackageId = "acme:site:1.0.0".parse().unwrap();
        assert_eq!(id, PackageId::new("acme", "site", "1.0.0"));
        assert_eq!(id.to_string(), "acme:site:1.0.0");
        assert_eq!(id.group_and_name(), "acme/site");
    }

    #[test]
    fn package_id_requires_name() {
        assert!("acme::1.0".parse::<PackageId>().is_err());
        assert!("a:b:c:d".parse::<PackageId>().is_err());
        assert_eq!("site".parse::<PackageId>().unwrap().name, "site");
    }

    #[test]
    fn hooks_are_read_from_installhook_entries() {
        let mut props = PackageProperties::default();
        props.entries.insert("name".into(), "site".into());
        props.entries.insert("installhook.setup.class".into(), "acme.SetupHook".into());
        props.entries.insert("installhook..class".into(), "ignored".into());
        let hooks = props.hooks();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].name, "setup");
        assert_eq!(hooks[0].implementation, "acme.SetupHook");
        assert!(props.has_hooks());
    }
}
