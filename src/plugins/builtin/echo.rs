use anyhow::Result;
use tracing::info;

use crate::models::filter::WorkspaceFilter;
use crate::models::package::{PackageId, PackageProperties};
use crate::plugins::check::{CheckContext, ProgressCheck};
use crate::repo::Node;

/// Logs every lifecycle event.
pub struct Echo;

impl ProgressCheck for Echo {
    fn started_scan(&mut self, ctx: &mut CheckContext) -> Result<()> {
        info!(check = ctx.check_name(), "started scan");
        Ok(())
    }

    fn identify_package(&mut self, ctx: &mut CheckContext, package: &PackageId, source: &str) -> Result<()> {
        info!(check = ctx.check_name(), %package, source, pre_install = ctx.is_pre_install(), "identified package");
        Ok(())
    }

    fn identify_subpackage(&mut self, ctx: &mut CheckContext, package: &PackageId, parent: &PackageId) -> Result<()> {
        info!(check = ctx.check_name(), %package, %parent, "identified subpackage");
        Ok(())
    }

    fn before_extract(
        &mut self,
        ctx: &mut CheckContext,
        package: &PackageId,
        _properties: &PackageProperties,
        filter: &WorkspaceFilter,
        subpackages: &[PackageId],
    ) -> Result<()> {
        let roots: Vec<&str> = filter.roots().collect();
        info!(check = ctx.check_name(), %package, ?roots, subpackages = subpackages.len(), "before extract");
        Ok(())
    }

    fn imported_path(&mut self, ctx: &mut CheckContext, package: &PackageId, path: &str, node: &dyn Node) -> Result<()> {
        let primary_type = node.primary_type()?;
        info!(check = ctx.check_name(), %package, path, primary_type, "imported path");
        Ok(())
    }

    fn deleted_path(&mut self, ctx: &mut CheckContext, package: &PackageId, path: &str) -> Result<()> {
        info!(check = ctx.check_name(), %package, path, "deleted path");
        Ok(())
    }

    fn after_extract(&mut self, ctx: &mut CheckContext, package: &PackageId) -> Result<()> {
        info!(check = ctx.check_name(), %package, "after extract");
        Ok(())
    }

    fn finished_package(&mut self, ctx: &mut CheckContext, package: &PackageId) -> Result<()> {
        info!(check = ctx.check_name(), %package, "finished package");
        Ok(())
    }

    fn finished_scan(&mut self, ctx: &mut CheckContext) -> Result<()> {
        info!(check = ctx.check_name(), "finished scan");
        Ok(())
    }
}
