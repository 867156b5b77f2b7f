//! The scan engine: one disposable repository session, init stages, package
//! installs in order, and checks observing every step.

pub mod dispatch;
pub mod hooks;
pub mod init;
pub mod sequencer;

use std::ops::Deref;

use tracing::{debug, info};

use crate::collector::ViolationCollector;
use crate::error::ScanError;
use crate::models::plan::{InitStage, InstallHookPolicy};
use crate::models::report::ScanReport;
use crate::models::severity::Severity;
use crate::plugins::loader::ResolvedPlan;
use crate::plugins::registry::{CheckFactories, CheckRegistry};
use crate::repo::mem::MemRepository;
use crate::repo::{Repository, Session};

pub use dispatch::{EventDispatcher, ScanPhase};
pub use hooks::{HookGovernor, HookRegistry, InstallContext, InstallHook};
pub use init::RepositoryInitializer;
pub use sequencer::{InstallSequencer, PackageRole, PackageSource};

/// Logs the session out when dropped, whichever way the scan ends.
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn Session>) -> Self {
        debug!("repository session opened");
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.logout();
        debug!("repository session released");
    }
}

/// A configured scan. Consumed by [`Scanner::scan`].
pub struct Scanner {
    init_stages: Vec<InitStage>,
    checks: CheckRegistry,
    hooks: HookRegistry,
    hook_policy: InstallHookPolicy,
    enable_pre_install_hooks: bool,
    pre_install: Vec<PackageSource>,
    fail_on: Severity,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            init_stages: Vec::new(),
            checks: CheckRegistry::new(),
            hooks: HookRegistry::new(),
            hook_policy: InstallHookPolicy::default(),
            enable_pre_install_hooks: false,
            pre_install: Vec::new(),
            fail_on: Severity::Major,
        }
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates the plan's checks and adopts its init stages, hook
    /// settings and pre-install packages.
    pub fn from_plan(plan: &ResolvedPlan, factories: &CheckFactories) -> Result<Self, ScanError> {
        let checks = CheckRegistry::from_specs(&plan.checks, factories)?;
        Ok(Self {
            init_stages: plan.init_stages.clone(),
            checks,
            hook_policy: plan.hook_policy,
            enable_pre_install_hooks: plan.enable_pre_install_hooks,
            pre_install: plan.pre_install.iter().cloned().map(PackageSource::Dir).collect(),
            ..Self::default()
        })
    }

    pub fn init_stage(mut self, stage: InitStage) -> Self {
        self.init_stages.push(stage);
        self
    }

    pub fn checks(mut self, checks: CheckRegistry) -> Self {
        self.checks = checks;
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hook_policy(mut self, policy: InstallHookPolicy) -> Self {
        self.hook_policy = policy;
        self
    }

    pub fn enable_pre_install_hooks(mut self, enable: bool) -> Self {
        self.enable_pre_install_hooks = enable;
        self
    }

    pub fn pre_install(mut self, source: impl Into<PackageSource>) -> Self {
        self.pre_install.push(source.into());
        self
    }

    pub fn fail_on(mut self, minimum: Severity) -> Self {
        self.fail_on = minimum;
        self
    }

    /// Runs the whole lifecycle against a fresh repository.
    pub fn scan(self, packages: Vec<PackageSource>) -> Result<ScanReport, ScanError> {
        let Scanner {
            init_stages,
            checks,
            hooks,
            hook_policy,
            enable_pre_install_hooks,
            pre_install,
            fail_on,
        } = self;

        let repository = MemRepository::new();
        let session = SessionGuard::new(repository.login()?);
        let mut collector = ViolationCollector::new();
        let mut dispatcher = EventDispatcher::new(checks, session.clone_session());
        let check_names = dispatcher.check_names();
        info!(checks = check_names.len(), packages = packages.len(), pre_install = pre_install.len(), "starting scan");

        dispatcher.start_scan(&mut collector)?;
        RepositoryInitializer::new(&init_stages).apply(&*session, &mut collector)?;
        dispatcher.init_applied()?;

        let sequencer = InstallSequencer::new(&hooks, hook_policy, enable_pre_install_hooks);
        let pre_installed =
            sequencer.install_all(&*session, &mut dispatcher, &mut collector, pre_install, PackageRole::PreInstall)?;
        let scanned = sequencer.install_all(&*session, &mut dispatcher, &mut collector, packages, PackageRole::UnderTest)?;

        dispatcher.finish_scan(&mut collector)?;

        let report = ScanReport::new(collector.severity_sorted(), fail_on, scanned, pre_installed, check_names);
        info!(violations = report.violations.len(), passed = report.passed, "scan finished");
        Ok(report)
    }
}
