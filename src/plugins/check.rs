//! The interface checks implement and the context they receive.

use anyhow::Result;
use tracing::trace;

use crate::collector::ViolationCollector;
use crate::models::filter::WorkspaceFilter;
use crate::models::package::{PackageId, PackageProperties};
use crate::models::report::Violation;
use crate::models::severity::Severity;
use crate::repo::{Node, Session};

/// Lifecycle handlers of a check. Every handler defaults to doing nothing.
///
/// Handlers run in registration order, one event at a time. An `Err` or a
/// panic is turned into a SEVERE violation naming the check; the scan goes on.
pub trait ProgressCheck {
    fn started_scan(&mut self, _ctx: &mut CheckContext) -> Result<()> {
        Ok(())
    }

    fn identify_package(&mut self, _ctx: &mut CheckContext, _package: &PackageId, _source: &str) -> Result<()> {
        Ok(())
    }

    fn identify_subpackage(
        &mut self,
        _ctx: &mut CheckContext,
        _package: &PackageId,
        _parent: &PackageId,
    ) -> Result<()> {
        Ok(())
    }

    fn before_extract(
        &mut self,
        _ctx: &mut CheckContext,
        _package: &PackageId,
        _properties: &PackageProperties,
        _filter: &WorkspaceFilter,
        _subpackages: &[PackageId],
    ) -> Result<()> {
        Ok(())
    }

    fn imported_path(
        &mut self,
        _ctx: &mut CheckContext,
        _package: &PackageId,
        _path: &str,
        _node: &dyn Node,
    ) -> Result<()> {
        Ok(())
    }

    fn deleted_path(&mut self, _ctx: &mut CheckContext, _package: &PackageId, _path: &str) -> Result<()> {
        Ok(())
    }

    fn after_extract(&mut self, _ctx: &mut CheckContext, _package: &PackageId) -> Result<()> {
        Ok(())
    }

    fn finished_package(&mut self, _ctx: &mut CheckContext, _package: &PackageId) -> Result<()> {
        Ok(())
    }

    fn finished_scan(&mut self, _ctx: &mut CheckContext) -> Result<()> {
        Ok(())
    }
}

/// What a check sees while handling one event.
pub struct CheckContext<'a> {
    check: &'a str,
    session: &'a dyn Session,
    package: Option<&'a PackageId>,
    pre_install: bool,
    collector: &'a mut ViolationCollector,
}

impl<'a> CheckContext<'a> {
    pub(crate) fn new(
        check: &'a str,
        session: &'a dyn Session,
        package: Option<&'a PackageId>,
        pre_install: bool,
        collector: &'a mut ViolationCollector,
    ) -> Self {
        Self {
            check,
            session,
            package,
            pre_install,
            collector,
        }
    }

    pub fn check_name(&self) -> &str {
        self.check
    }

    /// Read-only view of the scan's repository session.
    pub fn session(&self) -> &dyn Session {
        self.session
    }

    pub fn current_package(&self) -> Option<&PackageId> {
        self.package
    }

    /// True while a pre-install package is being installed. Violations
    /// reported then are dropped.
    pub fn is_pre_install(&self) -> bool {
        self.pre_install
    }

    /// Records a violation attributed to the current package.
    pub fn report(&mut self, severity: Severity, description: impl Into<String>) {
        self.record(Violation::new(severity, description, []));
    }

    pub fn report_for<I>(&mut self, severity: Severity, description: impl Into<String>, packages: I)
    where
        I: IntoIterator<Item = PackageId>,
    {
        self.record(Violation::new(severity, description, packages));
    }

    /// Records a violation; one without packages is attributed to the current package.
    pub fn record(&mut self, violation: Violation) {
        if self.pre_install {
            trace!(check = self.check, description = violation.description(), "dropping pre-install violation");
            return;
        }
        self.collector.record(violation.attributed_to(self.package));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::Repository;

    #[test]
    fn reports_are_attributed_to_the_current_package() {
        let session = MemRepository::new().login().unwrap();
        let pkg = PackageId::new("acme", "site", "1.0");
        let other = PackageId::new("acme", "other", "1.0");
        let mut collector = ViolationCollector::new();
        let mut ctx = CheckContext::new("demo", session.as_ref(), Some(&pkg), false, &mut collector);
        ctx.report(Severity::Minor, "attributed");
        ctx.report_for(Severity::Major, "explicit", [other.clone()]);
        assert_eq!(ctx.check_name(), "demo");

        let recorded = collector.violations();
        assert_eq!(recorded[0].packages().iter().collect::<Vec<_>>(), vec![&pkg]);
        assert_eq!(recorded[1].packages().iter().collect::<Vec<_>>(), vec![&other]);
    }

    #[test]
    fn pre_install_reports_are_dropped() {
        let session = MemRepository::new().login().unwrap();
        let pkg = PackageId::new("acme", "base", "1.0");
        let mut collector = ViolationCollector::new();
        let mut ctx = CheckContext::new("demo", session.as_ref(), Some(&pkg), true, &mut collector);
        assert!(ctx.is_pre_install());
        ctx.report(Severity::Severe, "ignored");
        assert!(collector.is_empty());
    }
}
