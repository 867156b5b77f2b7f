//! Install hook policy enforcement.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::engine::dispatch::panic_message;
use crate::error::HookError;
use crate::models::package::{PackageId, PackageProperties};
use crate::models::plan::InstallHookPolicy;
use crate::models::report::Violation;
use crate::models::severity::Severity;
use crate::repo::facade::SessionFacade;
use crate::repo::import::InstallPhase;
use crate::repo::{PropertyValue, RepoResult, Session};

/// Code a package runs while it is being installed.
pub trait InstallHook {
    fn execute(&mut self, phase: InstallPhase, ctx: &mut InstallContext) -> anyhow::Result<()>;
}

/// Hook access to the installing session. Reads go through a read-only
/// view; writes are part of the real install.
pub struct InstallContext<'a> {
    package: &'a PackageId,
    session: &'a dyn Session,
    view: Box<dyn Session>,
}

impl<'a> InstallContext<'a> {
    fn new(package: &'a PackageId, session: &'a dyn Session) -> Self {
        Self {
            package,
            session,
            view: SessionFacade::boxed(session.clone_session()),
        }
    }

    pub fn package(&self) -> &PackageId {
        self.package
    }

    pub fn session(&self) -> &dyn Session {
        self.view.as_ref()
    }

    pub fn add_node(&self, parent: &str, name: &str, primary_type: Option<&str>) -> RepoResult<String> {
        let node = self.session.node(parent)?.add_node(name, primary_type)?;
        Ok(node.path())
    }

    pub fn set_property(&self, node: &str, name: &str, value: PropertyValue) -> RepoResult<()> {
        self.session.node(node)?.set_property(name, value).map(|_| ())
    }

    pub fn remove(&self, path: &str) -> RepoResult<()> {
        self.session.remove_item(path)
    }
}

pub type HookFactory = Box<dyn Fn() -> Box<dyn InstallHook>>;

/// Hook implementations available to packages, by implementation reference.
#[derive(Default)]
pub struct HookRegistry {
    factories: BTreeMap<String, HookFactory>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, implementation: &str, factory: F)
    where
        F: Fn() -> Box<dyn InstallHook> + 'static,
    {
        self.factories.insert(implementation.to_string(), Box::new(factory));
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    fn create(&self, implementation: &str) -> Option<Box<dyn InstallHook>> {
        self.factories.get(implementation).map(|factory| factory())
    }
}

/// Hooks loaded for one package, in declaration order.
#[derive(Default)]
pub struct LoadedHooks {
    hooks: Vec<(String, Box<dyn InstallHook>)>,
}

impl LoadedHooks {
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Applies one package's hook policy and collects the violations it produces.
pub struct HookGovernor<'r> {
    policy: InstallHookPolicy,
    registry: &'r HookRegistry,
    violations: Vec<Violation>,
}

impl<'r> HookGovernor<'r> {
    pub fn new(policy: InstallHookPolicy, registry: &'r HookRegistry) -> Self {
        Self {
            policy,
            registry,
            violations: Vec::new(),
        }
    }

    pub fn policy(&self) -> InstallHookPolicy {
        self.policy
    }

    /// Fails under PROHIBIT when the package declares any hook.
    pub fn admit(&self, properties: &PackageProperties) -> Result<(), HookError> {
        if self.policy != InstallHookPolicy::Prohibit || !properties.has_hooks() {
            return Ok(());
        }
        let hooks = properties.hooks().into_iter().map(|h| h.name).collect();
        Err(HookError::Prohibited { hooks })
    }

    /// Resolves the declared hooks. An unresolvable hook aborts under ABORT
    /// and is recorded and left out under REPORT.
    pub fn load(&mut self, properties: &PackageProperties) -> Result<LoadedHooks, HookError> {
        let mut loaded = LoadedHooks::default();
        if matches!(self.policy, InstallHookPolicy::Skip | InstallHookPolicy::Prohibit) {
            if properties.has_hooks() {
                debug!(package = %properties.id, policy = %self.policy, "not loading install hooks");
            }
            return Ok(loaded);
        }
        for decl in properties.hooks() {
            match self.registry.create(&decl.implementation) {
                Some(hook) => {
                    info!(package = %properties.id, hook = %decl.name, "loaded install hook");
                    loaded.hooks.push((decl.name, hook));
                }
                None => {
                    let err = HookError::Unresolved {
                        hook: decl.name,
                        implementation: decl.implementation,
                    };
                    self.fail(&properties.id, err)?;
                }
            }
        }
        Ok(loaded)
    }

    /// Runs every loaded hook for `phase`.
    pub fn run_phase(
        &mut self,
        hooks: &mut LoadedHooks,
        phase: InstallPhase,
        session: &dyn Session,
        package: &PackageId,
    ) -> Result<(), HookError> {
        for (name, hook) in hooks.hooks.iter_mut() {
            let outcome = {
                let mut ctx = InstallContext::new(package, session);
                catch_unwind(AssertUnwindSafe(|| hook.execute(phase, &mut ctx)))
            };
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            let err = HookError::Failed {
                hook: name.clone(),
                message: format!("{message} (phase {phase})"),
            };
            self.fail(package, err)?;
        }
        Ok(())
    }

    fn fail(&mut self, package: &PackageId, err: HookError) -> Result<(), HookError> {
        if self.policy == InstallHookPolicy::Abort {
            return Err(err);
        }
        warn!(%package, error = %err, "install hook problem");
        self.violations
            .push(Violation::new(Severity::Major, err.to_string(), [package.clone()]));
        Ok(())
    }

    pub fn take_violations(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::mem::MemRepository;
    use crate::repo::Repository;

    struct Marker;

    impl InstallHook for Marker {
        fn execute(&mut self, phase: InstallPhase, ctx: &mut InstallContext) -> anyhow::Result<()> {
            if phase == InstallPhase::Installed {
                assert!(ctx.session().save().is_err());
                ctx.add_node("/", "hooked", None)?;
            }
            Ok(())
        }
    }

    struct Broken;

    impl InstallHook for Broken {
        fn execute(&mut self, _phase: InstallPhase, _ctx: &mut InstallContext) -> anyhow::Result<()> {
            anyhow::bail!("linkage error")
        }
    }

    fn registry() -> HookRegistry {
        let mut registry = HookRegistry::new();
        registry.register("acme.Marker", || Box::new(Marker));
        registry.register("acme.Broken", || Box::new(Broken));
        registry
    }

    fn properties(hooks: &[(&str, &str)]) -> PackageProperties {
        let mut props = PackageProperties {
            id: PackageId::new("acme", "hooks", "1.0"),
            ..PackageProperties::default()
        };
        for (name, implementation) in hooks {
            props
                .entries
                .insert(format!("installhook.{name}.class"), implementation.to_string());
        }
        props
    }

    #[test]
    fn prohibit_rejects_declared_hooks() {
        let registry = registry();
        let governor = HookGovernor::new(InstallHookPolicy::Prohibit, &registry);
        assert!(governor.admit(&properties(&[])).is_ok());
        let err = governor.admit(&properties(&[("marker", "acme.Marker")])).unwrap_err();
        assert_eq!(err, HookError::Prohibited { hooks: vec!["marker".into()] });
    }

    #[test]
    fn skip_loads_nothing() {
        let registry = registry();
        let mut governor = HookGovernor::new(InstallHookPolicy::Skip, &registry);
        let props = properties(&[("marker", "acme.Marker"), ("missing", "acme.Missing")]);
        assert!(governor.admit(&props).is_ok());
        assert!(governor.load(&props).unwrap().is_empty());
        assert!(governor.take_violations().is_empty());
    }

    #[test]
    fn report_records_unresolved_and_failing_hooks() {
        let registry = registry();
        let session = MemRepository::new().login().unwrap();
        let mut governor = HookGovernor::new(InstallHookPolicy::Report, &registry);
        let props = properties(&[("broken", "acme.Broken"), ("marker", "acme.Marker"), ("missing", "acme.Missing")]);

        let mut hooks = governor.load(&props).unwrap();
        assert_eq!(hooks.len(), 2);
        governor
            .run_phase(&mut hooks, InstallPhase::Installed, session.as_ref(), &props.id)
            .unwrap();

        assert!(session.node_exists("/hooked"));
        let violations = governor.take_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].description().contains("acme.Missing"));
        assert!(violations[1].description().contains("linkage error"));
        assert!(violations.iter().all(|v| v.severity() == Severity::Major));
    }

    #[test]
    fn abort_fails_fast() {
        let registry = registry();
        let session = MemRepository::new().login().unwrap();
        let mut governor = HookGovernor::new(InstallHookPolicy::Abort, &registry);

        let unresolved = properties(&[("missing", "acme.Missing")]);
        assert!(matches!(governor.load(&unresolved), Err(HookError::Unresolved { .. })));

        let props = properties(&[("broken", "acme.Broken")]);
        let mut hooks = governor.load(&props).unwrap();
        let err = governor
            .run_phase(&mut hooks, InstallPhase::Prepare, session.as_ref(), &props.id)
            .unwrap_err();
        assert!(matches!(err, HookError::Failed { ref hook, .. } if hook == "broken"));
        assert!(governor.take_violations().is_empty());
    }
}
