use std::collections::BTreeMap;

use crate::archive::{Archive, ArchiveError, CONTENT_ROOT};
use crate::models::filter::ImportMode;
use crate::models::package::PackageId;
use crate::parsers::{render_filter_xml, render_properties_xml, FILTER_ENTRY, PROPERTIES_ENTRY};

/// An archive held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemArchive {
    source: String,
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemArchive {
    pub fn builder(id: PackageId) -> MemArchiveBuilder {
        MemArchiveBuilder::new(id)
    }
}

impl Archive for MemArchive {
    fn source(&self) -> String {
        self.source.clone()
    }

    fn entries(&self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>, ArchiveError> {
        self.entries
            .get(entry)
            .filter(|_| !entry.ends_with('/'))
            .cloned()
            .ok_or_else(|| ArchiveError::MissingEntry(entry.to_string()))
    }
}

/// Assembles a [`MemArchive`]; metadata entries are rendered on `build`.
#[derive(Debug, Clone)]
pub struct MemArchiveBuilder {
    properties: BTreeMap<String, String>,
    filter: Vec<(String, ImportMode, Vec<(bool, String)>)>,
    entries: BTreeMap<String, Vec<u8>>,
    write_filter: bool,
}

impl MemArchiveBuilder {
    fn new(id: PackageId) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("group".to_string(), id.group);
        properties.insert("name".to_string(), id.name);
        properties.insert("version".to_string(), id.version);
        Self {
            properties,
            filter: Vec::new(),
            entries: BTreeMap::new(),
            write_filter: true,
        }
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Declares an install hook.
    pub fn hook(self, name: &str, implementation: &str) -> Self {
        self.property(&format!("installhook.{name}.class"), implementation)
    }

    pub fn filter(self, root: &str) -> Self {
        self.filter_with(root, ImportMode::Replace, &[])
    }

    pub fn filter_with(mut self, root: &str, mode: ImportMode, rules: &[(bool, &str)]) -> Self {
        let rules = rules.iter().map(|(i, p)| (*i, p.to_string())).collect();
        self.filter.push((root.to_string(), mode, rules));
        self
    }

    /// Leaves `filter.xml` out of the archive.
    pub fn without_filter(mut self) -> Self {
        self.write_filter = false;
        self
    }

    pub fn entry(mut self, entry: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(entry.to_string(), data.into());
        self
    }

    /// A plain file at a repository path.
    pub fn file(self, repo_path: &str, data: impl Into<Vec<u8>>) -> Self {
        let entry = format!("{CONTENT_ROOT}{}", repo_path.trim_start_matches('/'));
        self.entry(&entry, data)
    }

    /// An empty directory at a repository path.
    pub fn dir(mut self, repo_path: &str) -> Self {
        let entry = format!("{CONTENT_ROOT}{}/", repo_path.trim_matches('/'));
        self.entries.insert(entry, Vec::new());
        self
    }

    /// A `.content.xml` describing the node at `repo_path`.
    pub fn docview(self, repo_path: &str, xml: &str) -> Self {
        let dir = repo_path.trim_matches('/');
        let entry = if dir.is_empty() {
            format!("{CONTENT_ROOT}.content.xml")
        } else {
            format!("{CONTENT_ROOT}{dir}/.content.xml")
        };
        self.entry(&entry, xml)
    }

    pub fn build(self) -> MemArchive {
        let source = format!(
            "{}:{}:{}",
            self.properties.get("group").map(String::as_str).unwrap_or_default(),
            self.properties.get("name").map(String::as_str).unwrap_or_default(),
            self.properties.get("version").map(String::as_str).unwrap_or_default(),
        );
        let mut entries = self.entries;
        entries.insert(
            PROPERTIES_ENTRY.to_string(),
            render_properties_xml(&self.properties).into_bytes(),
        );
        if self.write_filter {
            entries.insert(FILTER_ENTRY.to_string(), render_filter_xml(&self.filter).into_bytes());
        }
        MemArchive { source, entries }
    }
}
