use anyhow::Result;

use crate::models::filter::WorkspaceFilter;
use crate::models::package::{PackageId, PackageProperties};
use crate::models::severity::Severity;
use crate::plugins::check::{CheckContext, ProgressCheck};
use crate::repo::Node;

/// Reports packages writing into paths an earlier package's filter covers.
#[derive(Default)]
pub struct Overlaps {
    installed: Vec<(PackageId, WorkspaceFilter)>,
    current: Option<(PackageId, WorkspaceFilter)>,
}

impl Overlaps {
    pub fn new() -> Self {
        Self::default()
    }

    fn owners<'a>(&'a self, package: &'a PackageId, path: &'a str) -> impl Iterator<Item = &'a PackageId> + 'a {
        self.installed
            .iter()
            .filter(move |(id, filter)| id != package && filter.contains(path))
            .map(|(id, _)| id)
    }
}

impl ProgressCheck for Overlaps {
    fn before_extract(
        &mut self,
        _ctx: &mut CheckContext,
        package: &PackageId,
        _properties: &PackageProperties,
        filter: &WorkspaceFilter,
        _subpackages: &[PackageId],
    ) -> Result<()> {
        self.current = Some((package.clone(), filter.clone()));
        Ok(())
    }

    fn imported_path(&mut self, ctx: &mut CheckContext, package: &PackageId, path: &str, _node: &dyn Node) -> Result<()> {
        let owners: Vec<PackageId> = self.owners(package, path).cloned().collect();
        for owner in owners {
            ctx.report_for(
                Severity::Major,
                format!("{package} imports {path}, which overlaps the filter of {owner}"),
                [owner, package.clone()],
            );
        }
        Ok(())
    }

    fn deleted_path(&mut self, ctx: &mut CheckContext, package: &PackageId, path: &str) -> Result<()> {
        let owners: Vec<PackageId> = self.owners(package, path).cloned().collect();
        for owner in owners {
            ctx.report_for(
                Severity::Severe,
                format!("{package} deletes {path}, which is covered by the filter of {owner}"),
                [owner, package.clone()],
            );
        }
        Ok(())
    }

    /// Only delivered after a successful import; aborted packages own nothing.
    fn after_extract(&mut self, _ctx: &mut CheckContext, _package: &PackageId) -> Result<()> {
        if let Some(current) = self.current.take() {
            self.installed.push(current);
        }
        Ok(())
    }

    fn finished_package(&mut self, _ctx: &mut CheckContext, _package: &PackageId) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ViolationCollector;
    use crate::models::filter::PathFilterSet;
    use crate::repo::mem::MemRepository;
    use crate::repo::{Repository, Session};

    fn id(name: &str) -> PackageId {
        PackageId::new("acme", name, "1.0")
    }

    fn filter(root: &str) -> WorkspaceFilter {
        WorkspaceFilter::new(vec![PathFilterSet::new(root)])
    }

    /// Drives one package through the check; `imports` and `deletes` are
    /// only delivered when `completed`.
    fn install(
        check: &mut Overlaps,
        session: &dyn Session,
        collector: &mut ViolationCollector,
        package: &PackageId,
        root: &str,
        imports: &[&str],
        deletes: &[&str],
        completed: bool,
    ) {
        let node = session.root_node().unwrap();
        let mut ctx = CheckContext::new("overlaps", session, Some(package), false, collector);
        check
            .before_extract(&mut ctx, package, &PackageProperties::default(), &filter(root), &[])
            .unwrap();
        if completed {
            for path in imports {
                check.imported_path(&mut ctx, package, path, node.as_ref()).unwrap();
            }
            for path in deletes {
                check.deleted_path(&mut ctx, package, path).unwrap();
            }
            check.after_extract(&mut ctx, package).unwrap();
        }
        check.finished_package(&mut ctx, package).unwrap();
    }

    #[test]
    fn writes_into_an_earlier_filter_are_reported_against_both_packages() {
        let session = MemRepository::new().login().unwrap();
        let mut collector = ViolationCollector::new();
        let mut check = Overlaps::new();

        install(&mut check, session.as_ref(), &mut collector, &id("base"), "/content/shared", &["/content/shared"], &[], true);
        assert!(collector.is_empty());

        install(
            &mut check,
            session.as_ref(),
            &mut collector,
            &id("site"),
            "/content/shared/site",
            &["/content/shared/site", "/content/other"],
            &["/content/shared/old"],
            true,
        );

        let recorded = collector.violations();
        assert_eq!(recorded.len(), 2, "{recorded:?}");
        assert_eq!(recorded[0].severity(), Severity::Major);
        assert!(recorded[0].description().contains("imports /content/shared/site"));
        assert_eq!(recorded[1].severity(), Severity::Severe);
        assert!(recorded[1].description().contains("deletes /content/shared/old"));
        for violation in recorded {
            assert!(violation.packages().contains(&id("base")));
            assert!(violation.packages().contains(&id("site")));
        }
    }

    #[test]
    fn aborted_packages_do_not_own_their_filter() {
        let session = MemRepository::new().login().unwrap();
        let mut collector = ViolationCollector::new();
        let mut check = Overlaps::new();

        install(&mut check, session.as_ref(), &mut collector, &id("hooked"), "/content/shared", &[], &[], false);
        install(
            &mut check,
            session.as_ref(),
            &mut collector,
            &id("b"),
            "/content/shared",
            &["/content/shared", "/content/shared/page.txt"],
            &[],
            true,
        );

        assert!(collector.is_empty(), "{:?}", collector.violations());
        assert_eq!(check.installed.len(), 1);
        assert_eq!(check.installed[0].0, id("b"));
    }
}
