use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::archive::{Archive, ArchiveError, DirArchive, MemArchive};
use crate::collector::ViolationCollector;
use crate::engine::dispatch::EventDispatcher;
use crate::engine::hooks::{HookGovernor, HookRegistry};
use crate::error::ScanError;
use crate::models::package::PackageId;
use crate::models::plan::InstallHookPolicy;
use crate::models::report::Violation;
use crate::models::severity::Severity;
use crate::repo::import::{self, ImportEvent};
use crate::repo::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageRole {
    /// Installed to set up the repository; its own findings are not reported.
    PreInstall,
    UnderTest,
}

/// Where a package comes from. Directories are opened lazily.
pub enum PackageSource {
    Dir(PathBuf),
    Archive(Box<dyn Archive>),
}

impl PackageSource {
    fn open(self) -> Result<Box<dyn Archive>, ArchiveError> {
        match self {
            PackageSource::Dir(path) => Ok(Box::new(DirArchive::open(path)?)),
            PackageSource::Archive(archive) => Ok(archive),
        }
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSource::Dir(path) => write!(f, "{}", path.display()),
            PackageSource::Archive(archive) => f.write_str(&archive.source()),
        }
    }
}

impl From<PathBuf> for PackageSource {
    fn from(path: PathBuf) -> Self {
        PackageSource::Dir(path)
    }
}

impl From<MemArchive> for PackageSource {
    fn from(archive: MemArchive) -> Self {
        PackageSource::Archive(Box::new(archive))
    }
}

/// Installs packages one at a time and relays progress to the dispatcher.
///
/// A package that cannot be opened or installed is recorded as a MAJOR
/// violation; the sequence goes on with the next one.
pub struct InstallSequencer<'r> {
    hooks: &'r HookRegistry,
    policy: InstallHookPolicy,
    enable_pre_install_hooks: bool,
}

impl<'r> InstallSequencer<'r> {
    pub fn new(hooks: &'r HookRegistry, policy: InstallHookPolicy, enable_pre_install_hooks: bool) -> Self {
        Self {
            hooks,
            policy,
            enable_pre_install_hooks,
        }
    }

    /// Pre-install packages skip hooks unless explicitly enabled.
    pub fn policy_for(&self, role: PackageRole) -> InstallHookPolicy {
        match role {
            PackageRole::PreInstall if !self.enable_pre_install_hooks => InstallHookPolicy::Skip,
            _ => self.policy,
        }
    }

    /// Installs `sources` in order, returning the ids of those identified.
    pub fn install_all(
        &self,
        session: &dyn Session,
        dispatcher: &mut EventDispatcher,
        collector: &mut ViolationCollector,
        sources: Vec<PackageSource>,
        role: PackageRole,
    ) -> Result<Vec<PackageId>, ScanError> {
        let mut ids = Vec::new();
        for source in sources {
            if let Some(id) = self.install(session, dispatcher, collector, source, role)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn install(
        &self,
        session: &dyn Session,
        dispatcher: &mut EventDispatcher,
        collector: &mut ViolationCollector,
        source: PackageSource,
        role: PackageRole,
    ) -> Result<Option<PackageId>, ScanError> {
        let label = source.to_string();
        let opened = source.open().and_then(|archive| {
            let properties = archive.properties()?;
            Ok((archive, properties))
        });
        let (archive, properties) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                warn!(source = %label, error = %e, "cannot open package");
                collector.record(Violation::new(
                    Severity::Major,
                    format!("cannot open package {label}: {e}"),
                    [],
                ));
                return Ok(None);
            }
        };
        let id = properties.id.clone();
        let pre_install = role == PackageRole::PreInstall;
        info!(package = %id, source = %label, pre_install, "installing package");

        dispatcher.identify_package(collector, &id, &label, pre_install)?;

        let mut governor = HookGovernor::new(self.policy_for(role), self.hooks);
        let prepared = archive
            .workspace_filter()
            .map_err(|e| e.to_string())
            .and_then(|filter| {
                governor.admit(&properties).map_err(|e| e.to_string())?;
                let hooks = governor.load(&properties).map_err(|e| e.to_string())?;
                let subpackages = archive.subpackages().map_err(|e| e.to_string())?;
                Ok((filter, hooks, subpackages))
            });
        record_all(collector, governor.take_violations());
        let (filter, mut hooks, subpackages) = match prepared {
            Ok(prepared) => prepared,
            Err(message) => {
                warn!(package = %id, error = %message, "package not installed");
                collector.record(Violation::new(
                    Severity::Major,
                    format!("package {id} was not installed: {message}"),
                    [id.clone()],
                ));
                dispatcher.finish_package(collector)?;
                return Ok(Some(id));
            }
        };

        let subpackage_ids: Vec<PackageId> = subpackages.iter().map(|s| s.id.clone()).collect();
        dispatcher.before_extract(collector, &properties, &filter, &subpackage_ids)?;

        let result = import::install(session, archive.as_ref(), &filter, &mut |phase, s| {
            governor.run_phase(&mut hooks, phase, s, &id)
        });
        record_all(collector, governor.take_violations());

        match result {
            Ok(events) => {
                debug!(package = %id, events = events.len(), "package imported");
                for event in events {
                    match event {
                        ImportEvent::Imported(path) => dispatcher.imported_path(collector, &path)?,
                        ImportEvent::Deleted(path) => dispatcher.deleted_path(collector, &path)?,
                        ImportEvent::Subpackage(sub) => dispatcher.identify_subpackage(collector, &sub.id)?,
                        ImportEvent::Error { path, message } => {
                            collector.record(Violation::new(
                                Severity::Major,
                                format!("import error at {path}: {message}"),
                                [id.clone()],
                            ));
                        }
                    }
                }
                dispatcher.after_extract(collector)?;
            }
            Err(e) => {
                warn!(package = %id, error = %e, "package install aborted");
                if let Err(refresh) = session.refresh(false) {
                    warn!(package = %id, error = %refresh, "discarding changes failed");
                }
                collector.record(Violation::new(
                    Severity::Major,
                    format!("package {id} install aborted: {e}"),
                    [id.clone()],
                ));
            }
        }
        dispatcher.finish_package(collector)?;
        Ok(Some(id))
    }
}

fn record_all(collector: &mut ViolationCollector, violations: Vec<Violation>) {
    for violation in violations {
        collector.record(violation);
    }
}
