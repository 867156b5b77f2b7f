//! Package archive readers.
//!
//! An archive is a flat list of `/`-separated entry paths. Repository content
//! lives under `jcr_root/`; package metadata under `META-INF/vault/`.

use std::path::PathBuf;

use crate::models::filter::WorkspaceFilter;
use crate::models::package::{PackageId, PackageProperties};
use crate::parsers::{parse_filter_xml, parse_properties_xml, FILTER_ENTRY, PROPERTIES_ENTRY};

pub mod dir;
pub mod mem;

pub use dir::DirArchive;
pub use mem::{MemArchive, MemArchiveBuilder};

pub const CONTENT_ROOT: &str = "jcr_root/";
const SUBPACKAGE_ROOT: &str = "jcr_root/etc/packages/";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("not a package directory: {}", .0.display())]
    NotAPackage(PathBuf),
    #[error("malformed XML in {entry}: {message}")]
    Xml { entry: String, message: String },
    #[error("missing archive entry {0}")]
    MissingEntry(String),
    #[error("invalid package properties: {0}")]
    InvalidProperties(String),
    #[error("invalid workspace filter: {0}")]
    InvalidFilter(String),
}

/// A subpackage embedded under `jcr_root/etc/packages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpackageRef {
    pub entry: String,
    pub repo_path: String,
    pub id: PackageId,
}

pub trait Archive {
    /// Human readable origin, used in logs and violation text.
    fn source(&self) -> String;

    /// Sorted entry paths; directories end with `/`.
    fn entries(&self) -> Result<Vec<String>, ArchiveError>;

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>, ArchiveError>;

    fn read_text(&self, entry: &str) -> Result<String, ArchiveError> {
        let bytes = self.read_entry(entry)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn properties(&self) -> Result<PackageProperties, ArchiveError> {
        parse_properties_xml(&self.read_text(PROPERTIES_ENTRY)?)
    }

    fn package_id(&self) -> Result<PackageId, ArchiveError> {
        Ok(self.properties()?.id)
    }

    fn workspace_filter(&self) -> Result<WorkspaceFilter, ArchiveError> {
        parse_filter_xml(&self.read_text(FILTER_ENTRY)?)
    }

    fn subpackages(&self) -> Result<Vec<SubpackageRef>, ArchiveError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| subpackage_ref(&entry))
            .collect())
    }
}

/// Derives an id from `jcr_root/etc/packages/<group>/<name>-<version>.zip`.
pub fn subpackage_ref(entry: &str) -> Option<SubpackageRef> {
    let rest = entry.strip_prefix(SUBPACKAGE_ROOT)?;
    let stem = rest.strip_suffix(".zip")?;
    let (group, file) = match stem.rsplit_once('/') {
        Some((group, file)) => (group, file),
        None => ("", stem),
    };
    if file.is_empty() {
        return None;
    }
    let split = file
        .char_indices()
        .filter(|(i, c)| *c == '-' && file[i + 1..].starts_with(|d: char| d.is_ascii_digit()))
        .map(|(i, _)| i)
        .last();
    let (name, version) = match split {
        Some(i) => (&file[..i], &file[i + 1..]),
        None => (file, ""),
    };
    Some(SubpackageRef {
        entry: entry.to_string(),
        repo_path: format!("/{}", &entry[CONTENT_ROOT.len()..]),
        id: PackageId::new(group, name, version),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subpackage_ids_come_from_entry_paths() {
        let sub = subpackage_ref("jcr_root/etc/packages/acme/content-1.0.2.zip").unwrap();
        assert_eq!(sub.id, PackageId::new("acme", "content", "1.0.2"));
        assert_eq!(sub.repo_path, "/etc/packages/acme/content-1.0.2.zip");

        let nested = subpackage_ref("jcr_root/etc/packages/acme/sites/my-site.zip").unwrap();
        assert_eq!(nested.id, PackageId::new("acme/sites", "my-site", ""));

        assert!(subpackage_ref("jcr_root/etc/packages/acme/readme.txt").is_none());
        assert!(subpackage_ref("jcr_root/apps/acme/bundle.zip").is_none());
    }
}
