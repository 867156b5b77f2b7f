//! Installs archive content into a session, honoring the workspace filter.
//!
//! Content is planned first (entry order, parents before children), then
//! applied node by node. Per-path failures become [`ImportEvent::Error`] and
//! the install carries on; archive failures, save failures and hook aborts end
//! the install with an [`ImportError`].

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::archive::{subpackage_ref, Archive, ArchiveError, SubpackageRef, CONTENT_ROOT};
use crate::error::HookError;
use crate::models::filter::{ImportMode, WorkspaceFilter};
use crate::parsers::{decode_platform_name, parse_docview, DocViewNode};
use crate::repo::registry::{NT_FILE, NT_FOLDER, NT_RESOURCE, NT_UNSTRUCTURED};
use crate::repo::{
    path, PropertyValue, RepoError, RepoResult, Session, Value, JCR_IS_CHECKED_OUT, JCR_MIXIN_TYPES,
    JCR_PRIMARY_TYPE,
};

const CONTENT_XML: &str = ".content.xml";
const JCR_CONTENT: &str = "jcr:content";
const JCR_DATA: &str = "jcr:data";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Points in an install at which package hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    /// Before any content is applied.
    Prepare,
    /// After content is applied, before save.
    Installed,
    /// After save.
    End,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallPhase::Prepare => "PREPARE",
            InstallPhase::Installed => "INSTALLED",
            InstallPhase::End => "END",
        })
    }
}

/// Progress reported by the importer, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Imported(String),
    Deleted(String),
    Subpackage(SubpackageRef),
    Error { path: String, message: String },
}

#[derive(Debug, Clone)]
struct PlannedNode {
    path: String,
    primary_type: Option<String>,
    default_type: &'static str,
    mixins: Vec<String>,
    properties: Vec<(String, PropertyValue)>,
    /// Properties are fully described, so replace mode drops the rest.
    defines_properties: bool,
}

#[derive(Debug, Default)]
struct Plan {
    nodes: Vec<PlannedNode>,
    index: BTreeMap<String, usize>,
    namespaces: Vec<(String, String)>,
    subpackages: BTreeMap<String, SubpackageRef>,
    errors: Vec<ImportEvent>,
}

impl Plan {
    fn from_archive(archive: &dyn Archive) -> Result<Plan, ArchiveError> {
        let mut plan = Plan::default();
        for entry in archive.entries()? {
            let Some(rel) = entry.strip_prefix(CONTENT_ROOT) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            let raw: Vec<&str> = rel.trim_end_matches('/').split('/').collect();
            let segments: Vec<String> = raw.iter().map(|s| decode_platform_name(s)).collect();
            let node_path = to_path(&segments);
            if rel.ends_with('/') {
                plan.node_mut(&node_path, NT_FOLDER);
                continue;
            }

            let file_name = raw[raw.len() - 1];
            let dir_path = to_path(&segments[..segments.len() - 1]);
            if file_name == CONTENT_XML {
                let text = archive.read_text(&entry)?;
                match parse_docview(&entry, &text) {
                    Ok(Some(doc)) => {
                        plan.add_namespaces(doc.namespaces);
                        plan.apply_docview(&dir_path, &doc.root);
                    }
                    Ok(None) => plan.node_error(&dir_path, format!("{entry} is not a DocView document")),
                    Err(e) => plan.node_error(&dir_path, e.to_string()),
                }
                continue;
            }
            if let Some(stem) = file_name.strip_suffix(".xml") {
                let text = archive.read_text(&entry)?;
                if let Ok(Some(doc)) = parse_docview(&entry, &text) {
                    plan.add_namespaces(doc.namespaces);
                    plan.apply_docview(&path::join(&dir_path, &decode_platform_name(stem)), &doc.root);
                    continue;
                }
            }

            let data = archive.read_entry(&entry)?;
            plan.add_file(&node_path, data);
            if let Some(sub) = subpackage_ref(&entry) {
                plan.subpackages.insert(node_path, sub);
            }
        }
        Ok(plan)
    }

    fn node_mut(&mut self, p: &str, default_type: &'static str) -> &mut PlannedNode {
        if let Some(parent) = path::parent(p) {
            if !self.index.contains_key(parent) {
                self.node_mut(parent, NT_FOLDER);
            }
        }
        let idx = match self.index.get(p) {
            Some(idx) => *idx,
            None => {
                self.nodes.push(PlannedNode {
                    path: p.to_string(),
                    primary_type: None,
                    default_type,
                    mixins: Vec::new(),
                    properties: Vec::new(),
                    defines_properties: false,
                });
                self.index.insert(p.to_string(), self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    fn node_error(&mut self, p: &str, message: String) {
        self.errors.push(ImportEvent::Error {
            path: p.to_string(),
            message,
        });
    }

    fn add_namespaces(&mut self, namespaces: Vec<(String, String)>) {
        for (prefix, uri) in namespaces {
            if !self.namespaces.iter().any(|(p, _)| *p == prefix) {
                self.namespaces.push((prefix, uri));
            }
        }
    }

    fn apply_docview(&mut self, p: &str, element: &DocViewNode) {
        let mut properties = Vec::new();
        for (name, raw) in element.plain_properties() {
            match PropertyValue::parse_docview(raw) {
                Ok(value) => properties.push((name.clone(), value)),
                Err(e) => self.node_error(&path::join(p, name), e.to_string()),
            }
        }
        let planned = self.node_mut(p, NT_UNSTRUCTURED);
        if !element.properties.is_empty() {
            planned.primary_type = element.primary_type().map(str::to_string);
            planned.default_type = NT_UNSTRUCTURED;
            planned.mixins = element.mixins();
            planned.properties = properties;
            planned.defines_properties = true;
        }
        for child in &element.children {
            self.apply_docview(&path::join(p, &child.name), child);
        }
    }

    fn add_file(&mut self, p: &str, data: Vec<u8>) {
        let file = self.node_mut(p, NT_FILE);
        file.primary_type = Some(NT_FILE.to_string());
        let content = self.node_mut(&path::join(p, JCR_CONTENT), NT_RESOURCE);
        content.primary_type = Some(NT_RESOURCE.to_string());
        content.properties = vec![(JCR_DATA.to_string(), PropertyValue::Single(Value::Binary(data)))];
        content.defines_properties = true;
    }
}

fn to_path(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

struct Applier<'a> {
    session: &'a dyn Session,
    filter: &'a WorkspaceFilter,
    events: Vec<ImportEvent>,
    failed: Vec<String>,
}

impl<'a> Applier<'a> {
    fn error(&mut self, p: &str, err: impl fmt::Display) {
        warn!(path = p, error = %err, "import error");
        self.events.push(ImportEvent::Error {
            path: p.to_string(),
            message: err.to_string(),
        });
    }

    fn register_namespaces(&mut self, namespaces: &[(String, String)]) {
        for (prefix, uri) in namespaces {
            if self.session.namespace_uri(prefix).is_ok() {
                continue;
            }
            if let Err(e) = self.session.register_namespace(prefix, uri) {
                self.error(path::ROOT, e);
            }
        }
    }

    fn apply(&mut self, plan: &Plan) {
        for node in &plan.nodes {
            if node.path == path::ROOT {
                continue;
            }
            if !self.failed.iter().any(|f| path::is_descendant(&node.path, f)) {
                self.apply_node(node);
            }
            if let Some(sub) = plan.subpackages.get(&node.path) {
                self.events.push(ImportEvent::Subpackage(sub.clone()));
            }
        }
    }

    fn apply_node(&mut self, node: &PlannedNode) {
        let exists = self.session.node_exists(&node.path);
        if !self.filter.covers(&node.path) {
            // nodes above filter roots are created when missing, never modified
            if !exists && self.filter.is_ancestor(&node.path) {
                self.create(node);
            }
            return;
        }
        if !self.filter.contains(&node.path) {
            return;
        }
        match (exists, self.filter.import_mode(&node.path)) {
            (false, _) => self.create(node),
            (true, ImportMode::Merge) => {}
            (true, mode) => match self.update(node, mode == ImportMode::Replace) {
                Ok(()) => self.events.push(ImportEvent::Imported(node.path.clone())),
                Err(e) => self.error(&node.path, e),
            },
        }
    }

    fn create(&mut self, node: &PlannedNode) {
        let result = (|| -> RepoResult<()> {
            let parent_path = path::parent(&node.path).ok_or_else(|| RepoError::InvalidPath(node.path.clone()))?;
            let parent = self.session.node(parent_path)?;
            let primary = node.primary_type.as_deref().unwrap_or(node.default_type);
            let created = parent.add_node(path::name(&node.path), Some(primary))?;
            for mixin in &node.mixins {
                created.add_mixin(mixin)?;
            }
            for (name, value) in &node.properties {
                created.set_property(name, value.clone())?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => self.events.push(ImportEvent::Imported(node.path.clone())),
            Err(e) => {
                if !self.session.node_exists(&node.path) {
                    self.failed.push(node.path.clone());
                }
                self.error(&node.path, e);
            }
        }
    }

    fn update(&self, node: &PlannedNode, replace: bool) -> RepoResult<()> {
        let target = self.session.node(&node.path)?;
        if let Some(primary) = &node.primary_type {
            if target.primary_type()? != *primary {
                target.set_primary_type(primary)?;
            }
        }
        let existing = target.mixin_types()?;
        for mixin in node.mixins.iter().filter(|m| !existing.contains(m)) {
            target.add_mixin(mixin)?;
        }
        for (name, value) in &node.properties {
            target.set_property(name, value.clone())?;
        }
        if replace && node.defines_properties {
            let stale: Vec<_> = target
                .properties()?
                .filter(|p| {
                    let name = p.name();
                    ![JCR_PRIMARY_TYPE, JCR_MIXIN_TYPES, JCR_IS_CHECKED_OUT].contains(&name.as_str())
                        && !node.properties.iter().any(|(n, _)| *n == name)
                })
                .collect();
            for prop in stale {
                prop.remove()?;
            }
        }
        Ok(())
    }

    /// Removes filtered nodes of replace-mode roots that the package lacks.
    fn delete_missing(&mut self, plan: &Plan) {
        for set in self.filter.sets.iter().filter(|s| s.mode == ImportMode::Replace) {
            let mut stack = vec![set.root.clone()];
            while let Some(p) = stack.pop() {
                if !self.session.node_exists(&p) {
                    continue;
                }
                if p != path::ROOT && !plan.index.contains_key(&p) && set.contains(&p) {
                    match self.session.remove_item(&p) {
                        Ok(()) => self.events.push(ImportEvent::Deleted(p)),
                        Err(e) => self.error(&p, e),
                    }
                    continue;
                }
                let children: Vec<String> = match self.session.node(&p).and_then(|n| n.nodes()) {
                    Ok(iter) => iter.map(|n| n.path()).collect(),
                    Err(e) => {
                        self.error(&p, e);
                        continue;
                    }
                };
                stack.extend(children.into_iter().rev());
            }
        }
    }
}

/// Installs `archive` into `session`, calling `hooks` at each phase.
///
/// On error the session is left dirty; the caller decides whether to discard.
pub fn install(
    session: &dyn Session,
    archive: &dyn Archive,
    filter: &WorkspaceFilter,
    hooks: &mut dyn FnMut(InstallPhase, &dyn Session) -> Result<(), HookError>,
) -> Result<Vec<ImportEvent>, ImportError> {
    let plan = Plan::from_archive(archive)?;
    debug!(source = %archive.source(), nodes = plan.nodes.len(), "planned package content");

    hooks(InstallPhase::Prepare, session)?;

    let mut applier = Applier {
        session,
        filter,
        events: plan.errors.clone(),
        failed: Vec::new(),
    };
    applier.register_namespaces(&plan.namespaces);
    applier.apply(&plan);
    applier.delete_missing(&plan);
    let events = applier.events;

    hooks(InstallPhase::Installed, session)?;
    session.save()?;
    hooks(InstallPhase::End, session)?;

    Ok(events)
}
