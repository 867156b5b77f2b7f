//! Fans lifecycle events out to the registered checks.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{trace, warn};

use crate::collector::ViolationCollector;
use crate::error::ScanError;
use crate::models::filter::WorkspaceFilter;
use crate::models::package::{PackageId, PackageProperties};
use crate::models::report::Violation;
use crate::models::severity::Severity;
use crate::plugins::check::{CheckContext, ProgressCheck};
use crate::plugins::registry::CheckRegistry;
use crate::repo::facade::SessionFacade;
use crate::repo::Session;

/// Position in the scan lifecycle. Transitions only move forward, except
/// that a finished package is followed by the next package's identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Started,
    InitStageApplied,
    Identified,
    BeforeExtract,
    Importing,
    AfterExtract,
    PackageFinished,
    ScanFinished,
}

impl ScanPhase {
    fn allows(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Idle, Started)
                | (Started, InitStageApplied)
                | (InitStageApplied | PackageFinished, Identified)
                | (Identified, BeforeExtract | PackageFinished)
                | (BeforeExtract | Importing, Importing | AfterExtract | PackageFinished)
                | (AfterExtract, PackageFinished)
                | (InitStageApplied | PackageFinished, ScanFinished)
        )
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Owns the checks of one scan and the read-only session they observe.
pub struct EventDispatcher {
    checks: CheckRegistry,
    session: Box<dyn Session>,
    phase: ScanPhase,
    current: Option<PackageId>,
    pre_install: bool,
}

impl EventDispatcher {
    /// `session` is wrapped in a facade before any check sees it.
    pub fn new(checks: CheckRegistry, session: Box<dyn Session>) -> Self {
        Self {
            checks,
            session: SessionFacade::boxed(session),
            phase: ScanPhase::Idle,
            current: None,
            pre_install: false,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn current_package(&self) -> Option<&PackageId> {
        self.current.as_ref()
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks.names()
    }

    fn advance(&mut self, next: ScanPhase) -> Result<(), ScanError> {
        if !self.phase.allows(next) {
            return Err(ScanError::Lifecycle {
                from: self.phase,
                to: next,
            });
        }
        trace!(from = %self.phase, to = %next, "phase");
        self.phase = next;
        Ok(())
    }

    /// Calls `handler` on every check in order. Failures become SEVERE
    /// violations naming the check and the event.
    fn fan_out<F>(&mut self, collector: &mut ViolationCollector, event: &str, mut handler: F)
    where
        F: FnMut(&mut dyn ProgressCheck, &mut CheckContext) -> anyhow::Result<()>,
    {
        let Self {
            checks,
            session,
            current,
            pre_install,
            ..
        } = self;
        for (name, check) in checks.iter_mut() {
            let outcome = {
                let mut ctx = CheckContext::new(name, session.as_ref(), current.as_ref(), *pre_install, collector);
                catch_unwind(AssertUnwindSafe(|| handler(check, &mut ctx)))
            };
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            warn!(check = name, event, error = %message, "check failed");
            collector.record(
                Violation::new(Severity::Severe, format!("check {name} failed on {event}: {message}"), [])
                    .attributed_to(current.as_ref()),
            );
        }
    }

    pub fn start_scan(&mut self, collector: &mut ViolationCollector) -> Result<(), ScanError> {
        self.advance(ScanPhase::Started)?;
        self.fan_out(collector, "started scan", |check, ctx| check.started_scan(ctx));
        Ok(())
    }

    pub fn init_applied(&mut self) -> Result<(), ScanError> {
        self.advance(ScanPhase::InitStageApplied)
    }

    pub fn identify_package(
        &mut self,
        collector: &mut ViolationCollector,
        package: &PackageId,
        source: &str,
        pre_install: bool,
    ) -> Result<(), ScanError> {
        self.advance(ScanPhase::Identified)?;
        self.current = Some(package.clone());
        self.pre_install = pre_install;
        self.fan_out(collector, &format!("identify package {package}"), |check, ctx| {
            check.identify_package(ctx, package, source)
        });
        Ok(())
    }

    pub fn before_extract(
        &mut self,
        collector: &mut ViolationCollector,
        properties: &PackageProperties,
        filter: &WorkspaceFilter,
        subpackages: &[PackageId],
    ) -> Result<(), ScanError> {
        self.advance(ScanPhase::BeforeExtract)?;
        let package = self.current_or_default();
        self.fan_out(collector, "before extract", |check, ctx| {
            check.before_extract(ctx, &package, properties, filter, subpackages)
        });
        Ok(())
    }

    /// Skipped when the node no longer exists by the time it is dispatched.
    pub fn imported_path(&mut self, collector: &mut ViolationCollector, path: &str) -> Result<(), ScanError> {
        self.advance(ScanPhase::Importing)?;
        let node = match self.session.node(path) {
            Ok(node) => node,
            Err(e) => {
                trace!(path, error = %e, "imported path is gone");
                return Ok(());
            }
        };
        let package = self.current_or_default();
        self.fan_out(collector, &format!("imported path {path}"), |check, ctx| {
            check.imported_path(ctx, &package, path, node.as_ref())
        });
        Ok(())
    }

    pub fn deleted_path(&mut self, collector: &mut ViolationCollector, path: &str) -> Result<(), ScanError> {
        self.advance(ScanPhase::Importing)?;
        let package = self.current_or_default();
        self.fan_out(collector, &format!("deleted path {path}"), |check, ctx| {
            check.deleted_path(ctx, &package, path)
        });
        Ok(())
    }

    pub fn identify_subpackage(&mut self, collector: &mut ViolationCollector, subpackage: &PackageId) -> Result<(), ScanError> {
        self.advance(ScanPhase::Importing)?;
        let parent = self.current_or_default();
        self.fan_out(collector, &format!("identify subpackage {subpackage}"), |check, ctx| {
            check.identify_subpackage(ctx, subpackage, &parent)
        });
        Ok(())
    }

    pub fn after_extract(&mut self, collector: &mut ViolationCollector) -> Result<(), ScanError> {
        self.advance(ScanPhase::AfterExtract)?;
        let package = self.current_or_default();
        self.fan_out(collector, "after extract", |check, ctx| check.after_extract(ctx, &package));
        Ok(())
    }

    pub fn finish_package(&mut self, collector: &mut ViolationCollector) -> Result<(), ScanError> {
        self.advance(ScanPhase::PackageFinished)?;
        let package = self.current_or_default();
        self.fan_out(collector, "finished package", |check, ctx| check.finished_package(ctx, &package));
        self.current = None;
        self.pre_install = false;
        Ok(())
    }

    pub fn finish_scan(&mut self, collector: &mut ViolationCollector) -> Result<(), ScanError> {
        self.advance(ScanPhase::ScanFinished)?;
        self.fan_out(collector, "finished scan", |check, ctx| check.finished_scan(ctx));
        Ok(())
    }

    fn current_or_default(&self) -> PackageId {
        self.current.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::{Node, Repository};

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        tag: &'static str,
        log: Log,
    }

    impl ProgressCheck for Recorder {
        fn started_scan(&mut self, _ctx: &mut CheckContext) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}:start", self.tag));
            Ok(())
        }

        fn imported_path(
            &mut self,
            ctx: &mut CheckContext,
            _package: &PackageId,
            path: &str,
            node: &dyn Node,
        ) -> anyhow::Result<()> {
            assert!(node.set_property("x", crate::repo::PropertyValue::string("y")).is_err());
            assert!(ctx.session().save().is_err());
            self.log.borrow_mut().push(format!("{}:{path}", self.tag));
            Ok(())
        }
    }

    struct Failing;

    impl ProgressCheck for Failing {
        fn imported_path(&mut self, _: &mut CheckContext, _: &PackageId, path: &str, _: &dyn Node) -> anyhow::Result<()> {
            anyhow::bail!("cannot handle {path}")
        }

        fn finished_scan(&mut self, _ctx: &mut CheckContext) -> anyhow::Result<()> {
            panic!("boom")
        }
    }

    fn dispatcher(checks: CheckRegistry) -> EventDispatcher {
        let session = MemRepository::new().login().unwrap();
        session.root_node().unwrap().add_node("content", None).unwrap();
        session.save().unwrap();
        EventDispatcher::new(checks, session)
    }

    #[test]
    fn checks_run_in_registration_order_through_the_facade() {
        let log: Log = Rc::default();
        let mut checks = CheckRegistry::new();
        checks.register("a", Box::new(Recorder { tag: "a", log: log.clone() }));
        checks.register("b", Box::new(Recorder { tag: "b", log: log.clone() }));
        let mut dispatcher = dispatcher(checks);
        let mut collector = ViolationCollector::new();

        dispatcher.start_scan(&mut collector).unwrap();
        dispatcher.init_applied().unwrap();
        let pkg = PackageId::new("acme", "site", "1.0");
        dispatcher.identify_package(&mut collector, &pkg, "site", false).unwrap();
        dispatcher
            .before_extract(&mut collector, &PackageProperties::default(), &WorkspaceFilter::default(), &[])
            .unwrap();
        dispatcher.imported_path(&mut collector, "/content").unwrap();
        dispatcher.imported_path(&mut collector, "/missing").unwrap();
        dispatcher.after_extract(&mut collector).unwrap();
        dispatcher.finish_package(&mut collector).unwrap();
        dispatcher.finish_scan(&mut collector).unwrap();

        assert_eq!(*log.borrow(), vec!["a:start", "b:start", "a:/content", "b:/content"]);
        assert!(collector.is_empty());
        assert_eq!(dispatcher.phase(), ScanPhase::ScanFinished);
    }

    #[test]
    fn failing_checks_become_one_severe_violation_per_invocation() {
        let log: Log = Rc::default();
        let mut checks = CheckRegistry::new();
        checks.register("failing", Box::new(Failing));
        checks.register("after", Box::new(Recorder { tag: "after", log: log.clone() }));
        let mut dispatcher = dispatcher(checks);
        let mut collector = ViolationCollector::new();

        dispatcher.start_scan(&mut collector).unwrap();
        dispatcher.init_applied().unwrap();
        let pkg = PackageId::new("acme", "site", "1.0");
        dispatcher.identify_package(&mut collector, &pkg, "site", false).unwrap();
        dispatcher
            .before_extract(&mut collector, &PackageProperties::default(), &WorkspaceFilter::default(), &[])
            .unwrap();
        dispatcher.imported_path(&mut collector, "/content").unwrap();
        dispatcher.imported_path(&mut collector, "/").unwrap();
        dispatcher.after_extract(&mut collector).unwrap();
        dispatcher.finish_package(&mut collector).unwrap();
        dispatcher.finish_scan(&mut collector).unwrap();

        let violations = collector.violations();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().all(|v| v.severity() == Severity::Severe));
        assert!(violations.iter().all(|v| v.description().contains("check failing failed")));
        assert!(violations[0].packages().contains(&pkg));
        assert!(violations[2].description().contains("boom"));
        assert!(violations[2].packages().is_empty());
        assert_eq!(*log.borrow(), vec!["after:start", "after:/content", "after:/"]);
    }

    #[test]
    fn out_of_order_events_are_lifecycle_errors() {
        let mut dispatcher = dispatcher(CheckRegistry::new());
        let mut collector = ViolationCollector::new();
        assert!(matches!(
            dispatcher.init_applied(),
            Err(ScanError::Lifecycle { from: ScanPhase::Idle, to: ScanPhase::InitStageApplied })
        ));
        dispatcher.start_scan(&mut collector).unwrap();
        dispatcher.init_applied().unwrap();
        assert!(dispatcher.after_extract(&mut collector).is_err());
        let pkg = PackageId::new("acme", "site", "1.0");
        dispatcher.identify_package(&mut collector, &pkg, "site", false).unwrap();
        assert!(dispatcher.finish_scan(&mut collector).is_err());
        dispatcher.finish_package(&mut collector).unwrap();
        dispatcher.finish_scan(&mut collector).unwrap();
        assert!(dispatcher.start_scan(&mut collector).is_err());
    }
}
