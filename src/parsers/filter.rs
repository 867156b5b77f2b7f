use roxmltree::Document;

use crate::archive::ArchiveError;
use crate::models::filter::{FilterRule, ImportMode, PathFilterSet, WorkspaceFilter};
use crate::parsers::package::{escape, xml_options};
use crate::repo::path;

pub const FILTER_ENTRY: &str = "META-INF/vault/filter.xml";

/// Parses `META-INF/vault/filter.xml`.
pub fn parse_filter_xml(text: &str) -> Result<WorkspaceFilter, ArchiveError> {
    let doc = Document::parse_with_options(text, xml_options()).map_err(|e| ArchiveError::Xml {
        entry: FILTER_ENTRY.to_string(),
        message: e.to_string(),
    })?;

    let mut sets = Vec::new();
    for node in doc.root_element().children().filter(|n| n.has_tag_name("filter")) {
        let raw_root = node
            .attribute("root")
            .ok_or_else(|| ArchiveError::InvalidFilter("filter without root".to_string()))?;
        let root = path::normalize(raw_root)
            .map_err(|_| ArchiveError::InvalidFilter(format!("bad filter root {raw_root:?}")))?;
        let mut set = PathFilterSet::new(root);
        if let Some(mode) = node.attribute("mode") {
            set.mode = ImportMode::parse(mode)
                .ok_or_else(|| ArchiveError::InvalidFilter(format!("unknown import mode {mode:?}")))?;
        }
        for rule in node.children().filter(|n| n.is_element()) {
            let include = match rule.tag_name().name() {
                "include" => true,
                "exclude" => false,
                _ => continue,
            };
            let pattern = rule.attribute("pattern").unwrap_or_default();
            let rule = FilterRule::new(include, pattern)
                .map_err(|e| ArchiveError::InvalidFilter(format!("bad pattern {pattern:?}: {e}")))?;
            set.rules.push(rule);
        }
        sets.push(set);
    }

    Ok(WorkspaceFilter::new(sets))
}

/// Renders a filter with plain `root`/`mode` sets and include/exclude patterns.
pub fn render_filter_xml(sets: &[(String, ImportMode, Vec<(bool, String)>)]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<workspaceFilter version=\"1.0\">\n");
    for (root, mode, rules) in sets {
        let mode = match mode {
            ImportMode::Replace => "replace",
            ImportMode::Merge => "merge",
            ImportMode::Update => "update",
        };
        out.push_str(&format!("  <filter root=\"{}\" mode=\"{mode}\">\n", escape(root)));
        for (include, pattern) in rules {
            let tag = if *include { "include" } else { "exclude" };
            out.push_str(&format!("    <{tag} pattern=\"{}\"/>\n", escape(pattern)));
        }
        out.push_str("  </filter>\n");
    }
    out.push_str("</workspaceFilter>\n");
    out
}
