use tracing::{debug, info, warn};

use crate::collector::ViolationCollector;
use crate::error::InitError;
use crate::models::plan::{ForcedRoot, InitStage};
use crate::models::report::Violation;
use crate::models::severity::Severity;
use crate::repo::path;
use crate::repo::registry::NT_UNSTRUCTURED;
use crate::repo::{RepoResult, Session};

/// Applies init stages to a fresh session, in order.
///
/// Within a stage: namespaces, node types, privileges, then forced roots.
/// Registration failures are fatal. A forced root that cannot be created is
/// recorded as a MAJOR violation and the remaining roots are still applied.
pub struct RepositoryInitializer<'a> {
    stages: &'a [InitStage],
}

impl<'a> RepositoryInitializer<'a> {
    pub fn new(stages: &'a [InitStage]) -> Self {
        Self { stages }
    }

    pub fn apply(&self, session: &dyn Session, collector: &mut ViolationCollector) -> Result<(), InitError> {
        for (index, stage) in self.stages.iter().enumerate() {
            debug!(stage = index, "applying init stage");
            register(stage, session)?;
            for root in &stage.forced_roots {
                match force_root(session, root) {
                    Ok(()) => info!(path = %root.path, "forced root"),
                    Err(e) => {
                        warn!(path = %root.path, error = %e, "failed to force root");
                        if let Err(refresh) = session.refresh(false) {
                            warn!(path = %root.path, error = %refresh, "discarding changes failed");
                        }
                        collector.record(Violation::new(
                            Severity::Major,
                            format!("failed to create forced root {}: {e}", root.path),
                            [],
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn register(stage: &InitStage, session: &dyn Session) -> Result<(), InitError> {
    for ns in &stage.jcr_namespaces {
        session
            .register_namespace(&ns.prefix, &ns.uri)
            .map_err(|source| InitError::Namespace {
                prefix: ns.prefix.clone(),
                uri: ns.uri.clone(),
                source,
            })?;
    }

    let defs = stage.node_type_defs();
    if !defs.is_empty() {
        session.register_node_types(&defs).map_err(InitError::NodeTypes)?;
    }

    for privilege in &stage.jcr_privileges {
        session
            .register_privilege(privilege)
            .map_err(|source| InitError::Privilege {
                name: privilege.name().to_string(),
                source,
            })?;
    }

    session.save().map_err(InitError::Save)
}

/// Creates missing ancestors as unstructured nodes, then the root itself,
/// and saves.
fn force_root(session: &dyn Session, root: &ForcedRoot) -> RepoResult<()> {
    let target = path::normalize(&root.path)?;
    let mut current = session.root_node()?;
    let segments: Vec<&str> = path::segments(&target).collect();
    let last = segments.len().saturating_sub(1);

    for (i, name) in segments.iter().enumerate() {
        let primary_type = if i == last {
            root.primary_type.as_deref()
        } else {
            Some(NT_UNSTRUCTURED)
        };
        current = if current.has_node(name) {
            current.node(name)?
        } else {
            current.add_node(name, primary_type)?
        };
    }

    if let Some(primary_type) = root.primary_type.as_deref() {
        if current.primary_type()? != primary_type {
            current.set_primary_type(primary_type)?;
        }
    }
    let existing = current.mixin_types()?;
    for mixin in &root.mixin_types {
        if !existing.contains(mixin) {
            current.add_mixin(mixin)?;
        }
    }
    session.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::{PrivilegeDef, Repository};

    fn session() -> Box<dyn Session> {
        MemRepository::new().login().unwrap()
    }

    #[test]
    fn forced_root_creates_unstructured_ancestors() {
        let session = session();
        let stages = vec![InitStage::default()
            .namespace("sling", "http://sling.apache.org/jcr/sling/1.0")
            .node_type("sling:Folder", &["nt:folder"], &[])
            .forced_root(ForcedRoot::new("/content/acme", Some("sling:Folder"), &[]))];
        let mut collector = ViolationCollector::new();
        RepositoryInitializer::new(&stages).apply(session.as_ref(), &mut collector).unwrap();

        assert!(collector.is_empty());
        assert_eq!(session.node("/content").unwrap().primary_type().unwrap(), NT_UNSTRUCTURED);
        assert_eq!(session.node("/content/acme").unwrap().primary_type().unwrap(), "sling:Folder");
        assert!(!session.has_pending_changes());
    }

    #[test]
    fn forced_root_failures_are_violations() {
        let session = session();
        let stages = vec![InitStage::default()
            .forced_root(ForcedRoot::new("/apps/broken", Some("acme:Missing"), &[]))
            .forced_root(ForcedRoot::new("/apps/ok", None, &["mix:versionable"]))];
        let mut collector = ViolationCollector::new();
        RepositoryInitializer::new(&stages).apply(session.as_ref(), &mut collector).unwrap();

        assert_eq!(collector.len(), 1);
        let violation = &collector.violations()[0];
        assert_eq!(violation.severity(), Severity::Major);
        assert!(violation.description().contains("/apps/broken"));
        assert!(!session.node_exists("/apps/broken"));
        let ok = session.node("/apps/ok").unwrap();
        assert_eq!(ok.mixin_types().unwrap(), vec!["mix:versionable"]);
    }

    #[test]
    fn failed_forced_roots_leave_no_pending_changes() {
        let session = session();
        let stages = vec![InitStage::default().forced_root(ForcedRoot::new("/etc/broken", Some("acme:Missing"), &[]))];
        let mut collector = ViolationCollector::new();
        RepositoryInitializer::new(&stages).apply(session.as_ref(), &mut collector).unwrap();

        assert_eq!(collector.len(), 1);
        assert!(!session.has_pending_changes());
        assert!(!session.node_exists("/etc"));
    }

    #[test]
    fn existing_roots_are_retyped() {
        let session = session();
        session.root_node().unwrap().add_node("content", Some("nt:folder")).unwrap();
        session.save().unwrap();
        let stages = vec![InitStage::default().forced_root(ForcedRoot::new("/content", Some("nt:unstructured"), &[]))];
        let mut collector = ViolationCollector::new();
        RepositoryInitializer::new(&stages).apply(session.as_ref(), &mut collector).unwrap();
        assert_eq!(session.node("/content").unwrap().primary_type().unwrap(), "nt:unstructured");
    }

    #[test]
    fn registration_failures_are_fatal() {
        let session = session();
        let bad_ns = vec![InitStage::default().namespace("jcr", "urn:not-jcr")];
        let mut collector = ViolationCollector::new();
        assert!(matches!(
            RepositoryInitializer::new(&bad_ns).apply(session.as_ref(), &mut collector),
            Err(InitError::Namespace { .. })
        ));

        let bad_type = vec![InitStage::default().node_type("acme:Thing", &["acme:Missing"], &[])];
        assert!(matches!(
            RepositoryInitializer::new(&bad_type).apply(session.as_ref(), &mut collector),
            Err(InitError::NodeTypes(_))
        ));

        let mut bad_privilege = InitStage::default();
        bad_privilege.jcr_privileges.push(PrivilegeDef::Name("nope:approve".into()));
        assert!(matches!(
            RepositoryInitializer::new(&[bad_privilege]).apply(session.as_ref(), &mut collector),
            Err(InitError::Privilege { .. })
        ));
        assert!(collector.is_empty());
    }
}
