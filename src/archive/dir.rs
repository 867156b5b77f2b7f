use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::archive::{Archive, ArchiveError};

const SKIP_DIRS: [&str; 4] = [".git", ".svn", ".hg", ".vlt-sync"];

/// An exploded package directory (`jcr_root/` and `META-INF/` at the top).
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ArchiveError::NotAPackage(root));
        }
        debug!(path = %root.display(), "opened package directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Archive for DirArchive {
    fn source(&self) -> String {
        self.root.display().to_string()
    }

    fn entries(&self) -> Result<Vec<String>, ArchiveError> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.file_name().to_str().is_some_and(|n| SKIP_DIRS.contains(&n)))
            });

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| ArchiveError::Walk {
                path: self.root.clone(),
                source,
            })?;
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let mut name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type().is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();
        Ok(entries)
    }

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>, ArchiveError> {
        if entry.split('/').any(|seg| seg == "..") {
            return Err(ArchiveError::MissingEntry(entry.to_string()));
        }
        let path = self.root.join(entry);
        if !path.is_file() {
            return Err(ArchiveError::MissingEntry(entry.to_string()));
        }
        fs::read(&path).map_err(|source| ArchiveError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::PackageId;
    use crate::parsers::{render_filter_xml, render_properties_xml};
    use std::collections::BTreeMap;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn lists_entries_and_reads_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let mut props = BTreeMap::new();
        props.insert("group".to_string(), "acme".to_string());
        props.insert("name".to_string(), "site".to_string());
        props.insert("version".to_string(), "1.0".to_string());
        write(tmp.path(), "META-INF/vault/properties.xml", &render_properties_xml(&props));
        write(
            tmp.path(),
            "META-INF/vault/filter.xml",
            &render_filter_xml(&[("/apps/acme".to_string(), Default::default(), vec![])]),
        );
        write(tmp.path(), "jcr_root/apps/acme/readme.txt", "hi");
        write(tmp.path(), ".git/config", "ignored");

        let archive = DirArchive::open(tmp.path()).unwrap();
        let entries = archive.entries().unwrap();
        assert!(entries.contains(&"jcr_root/apps/acme/".to_string()));
        assert!(entries.contains(&"jcr_root/apps/acme/readme.txt".to_string()));
        assert!(!entries.iter().any(|e| e.starts_with(".git")));
        assert_eq!(archive.package_id().unwrap(), PackageId::new("acme", "site", "1.0"));
        assert!(archive.workspace_filter().unwrap().contains("/apps/acme/readme.txt"));
        assert_eq!(archive.read_entry("jcr_root/apps/acme/readme.txt").unwrap(), b"hi");
    }

    #[test]
    fn missing_and_escaping_entries_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = DirArchive::open(tmp.path()).unwrap();
        assert!(matches!(archive.properties(), Err(ArchiveError::MissingEntry(_))));
        assert!(matches!(archive.read_entry("../etc/passwd"), Err(ArchiveError::MissingEntry(_))));
        assert!(matches!(
            DirArchive::open(tmp.path().join("nope")),
            Err(ArchiveError::NotAPackage(_))
        ));
    }
}
