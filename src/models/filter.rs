use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::repo::path;

/// How content under a filter root is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Package content replaces the repository subtree.
    #[default]
    Replace,
    /// Existing nodes are kept untouched; only missing nodes are added.
    Merge,
    /// Existing nodes are updated but never deleted.
    Update,
}

impl ImportMode {
    pub fn parse(s: &str) -> Option<ImportMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "replace" => Some(ImportMode::Replace),
            "merge" => Some(ImportMode::Merge),
            "update" => Some(ImportMode::Update),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterRule {
    pub include: bool,
    pattern: Regex,
}

impl FilterRule {
    pub fn new(include: bool, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            include,
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

/// One `<filter root=…>` entry of a workspace filter.
#[derive(Debug, Clone)]
pub struct PathFilterSet {
    pub root: String,
    pub mode: ImportMode,
    pub rules: Vec<FilterRule>,
}

impl PathFilterSet {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            mode: ImportMode::default(),
            rules: Vec::new(),
        }
    }

    /// Path is the root or below it, regardless of rules.
    pub fn covers(&self, p: &str) -> bool {
        path::is_same_or_descendant(p, &self.root)
    }

    pub fn contains(&self, p: &str) -> bool {
        if !self.covers(p) {
            return false;
        }
        // an include as first rule flips the default to exclude
        let mut included = self.rules.first().map(|r| !r.include).unwrap_or(true);
        for rule in &self.rules {
            if rule.matches(p) {
                included = rule.include;
            }
        }
        included
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceFilter {
    pub sets: Vec<PathFilterSet>,
}

impl WorkspaceFilter {
    pub fn new(sets: Vec<PathFilterSet>) -> Self {
        Self { sets }
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|s| s.root.as_str())
    }

    pub fn covers(&self, p: &str) -> bool {
        self.sets.iter().any(|s| s.covers(p))
    }

    pub fn contains(&self, p: &str) -> bool {
        self.sets.iter().any(|s| s.contains(p))
    }

    /// Path lies strictly above at least one filter root.
    pub fn is_ancestor(&self, p: &str) -> bool {
        self.sets
            .iter()
            .any(|s| s.root != p && path::is_same_or_descendant(&s.root, p))
    }

    /// Mode of the first set covering the path.
    pub fn import_mode(&self, p: &str) -> ImportMode {
        self.sets
            .iter()
            .find(|s| s.covers(p))
            .map(|s| s.mode)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(root: &str, rules: &[(bool, &str)]) -> PathFilterSet {
        let mut s = PathFilterSet::new(root);
        for (include, pattern) in rules {
            s.rules.push(FilterRule::new(*include, pattern).unwrap());
        }
        s
    }

    #[test]
    fn set_without_rules_contains_whole_subtree() {
        let s = set("/apps/acme", &[]);
        assert!(s.contains("/apps/acme"));
        assert!(s.contains("/apps/acme/components"));
        assert!(!s.contains("/apps/acmex"));
        assert!(!s.contains("/apps"));
    }

    #[test]
    fn last_matching_rule_wins() {
        let s = set("/content", &[(false, "/content/a(/.*)?"), (true, "/content/a/keep")]);
        assert!(s.contains("/content/b"));
        assert!(!s.contains("/content/a/drop"));
        assert!(s.contains("/content/a/keep"));
    }

    #[test]
    fn leading_include_defaults_to_exclude() {
        let s = set("/etc", &[(true, "/etc/acme(/.*)?")]);
        assert!(s.contains("/etc/acme/config"));
        assert!(!s.contains("/etc/other"));
    }

    #[test]
    fn workspace_filter_ancestry_and_modes() {
        let mut merge = set("/content/acme", &[]);
        merge.mode = ImportMode::Merge;
        let filter = WorkspaceFilter::new(vec![set("/apps/acme", &[]), merge]);
        assert!(filter.is_ancestor("/content"));
        assert!(filter.is_ancestor("/"));
        assert!(!filter.is_ancestor("/content/acme"));
        assert_eq!(filter.import_mode("/content/acme/en"), ImportMode::Merge);
        assert_eq!(filter.import_mode("/apps/acme"), ImportMode::Replace);
        assert_eq!(filter.roots().collect::<Vec<_>>(), vec!["/apps/acme", "/content/acme"]);
    }

    #[test]
    fn parses_import_modes() {
        assert_eq!(ImportMode::parse("MERGE"), Some(ImportMode::Merge));
        assert_eq!(ImportMode::parse(""), Some(ImportMode::Replace));
        assert_eq!(ImportMode::parse("bogus"), None);
    }
}
