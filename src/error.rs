//! Fatal error classes of a scan.
//!
//! Repository, archive and import errors live next to their layers
//! ([`crate::repo::RepoError`], [`crate::archive::ArchiveError`],
//! [`crate::repo::import::ImportError`]).

use std::path::PathBuf;

use crate::engine::dispatch::ScanPhase;
use crate::repo::RepoError;

/// Malformed plans, checklists or check references. Raised before any session starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid check spec {name:?}: {reason}")]
    InvalidCheckSpec { name: String, reason: &'static str },

    #[error("no check implementation registered for {0:?}")]
    UnknownCheck(String),

    #[error("check {check:?} names unknown template {template:?}")]
    UnknownTemplate { check: String, template: String },

    #[error("unknown plan {0:?}")]
    UnknownPlan(String),

    #[error("unknown checklist {0:?}")]
    UnknownChecklist(String),

    #[error("parsing {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("constructing check {name:?}: {message}")]
    CheckConstruction { name: String, message: String },
}

/// Registration failures that leave the repository unusable for the scan.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("registering namespace {prefix}={uri}: {source}")]
    Namespace {
        prefix: String,
        uri: String,
        #[source]
        source: RepoError,
    },

    #[error("registering node types: {0}")]
    NodeTypes(#[source] RepoError),

    #[error("registering privilege {name}: {source}")]
    Privilege {
        name: String,
        #[source]
        source: RepoError,
    },

    #[error("saving init stage: {0}")]
    Save(#[source] RepoError),
}

/// Install hook failures. Whether these abort a package depends on the hook policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HookError {
    #[error("package declares install hooks ({}) but hooks are prohibited", hooks.join(", "))]
    Prohibited { hooks: Vec<String> },

    #[error("install hook {hook:?}: no implementation available for {implementation:?}")]
    Unresolved { hook: String, implementation: String },

    #[error("install hook {hook:?} failed: {message}")]
    Failed { hook: String, message: String },
}

/// Errors that end a scan without a complete report.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("repository initialization failed: {0}")]
    Init(#[from] InitError),

    #[error("repository unavailable: {0}")]
    Repository(#[from] RepoError),

    /// An engine defect: events were requested out of order.
    #[error("illegal lifecycle transition {from:?} -> {to:?}")]
    Lifecycle { from: ScanPhase, to: ScanPhase },
}
