use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ConfigError;
use crate::models::plan::EffectiveCheck;
use crate::plugins::builtin;
use crate::plugins::check::ProgressCheck;

/// Builds a check from its `config` object.
pub type CheckFactory = Box<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn ProgressCheck>>>;

/// Maps implementation references (`impl` in a check spec) to constructors.
#[derive(Default)]
pub struct CheckFactories {
    factories: BTreeMap<String, CheckFactory>,
}

impl CheckFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// The checks shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut factories = Self::new();
        builtin::register_all(&mut factories);
        factories
    }

    pub fn register<F>(&mut self, implementation: &str, factory: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn ProgressCheck>> + 'static,
    {
        self.factories.insert(implementation.to_string(), Box::new(factory));
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn instantiate(&self, check: &EffectiveCheck) -> Result<Box<dyn ProgressCheck>, ConfigError> {
        check.spec.validate()?;
        let implementation = check.spec.implementation.as_deref().unwrap_or_default().trim();
        let factory = self
            .factories
            .get(implementation)
            .ok_or_else(|| ConfigError::UnknownCheck(implementation.to_string()))?;
        factory(&check.spec.config).map_err(|e| ConfigError::CheckConstruction {
            name: check.full_name(),
            message: format!("{e:#}"),
        })
    }
}

struct RegisteredCheck {
    name: String,
    check: Box<dyn ProgressCheck>,
}

/// Ordered, instantiated checks of one scan.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates every check in order; the first failure aborts.
    pub fn from_specs(specs: &[EffectiveCheck], factories: &CheckFactories) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register_spec(spec, factories)?;
        }
        Ok(registry)
    }

    /// Validates the spec before anything is constructed.
    pub fn register_spec(&mut self, spec: &EffectiveCheck, factories: &CheckFactories) -> Result<(), ConfigError> {
        let check = factories.instantiate(spec)?;
        self.register(spec.full_name(), check);
        Ok(())
    }

    pub fn register(&mut self, name: impl Into<String>, check: Box<dyn ProgressCheck>) {
        let name = name.into();
        debug!(check = %name, "registered check");
        self.checks.push(RegisteredCheck { name, check });
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name.clone()).collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut dyn ProgressCheck)> {
        self.checks
            .iter_mut()
            .map(|c| (c.name.as_str(), c.check.as_mut() as &mut dyn ProgressCheck))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::CheckSpec;
    use serde_json::json;

    struct Noop;
    impl ProgressCheck for Noop {}

    fn factories() -> CheckFactories {
        let mut factories = CheckFactories::new();
        factories.register("noop", |_| Ok(Box::new(Noop)));
        factories.register("picky", |config| {
            if config.get("ok").and_then(|v| v.as_bool()) == Some(true) {
                Ok(Box::new(Noop))
            } else {
                anyhow::bail!("needs ok=true")
            }
        });
        factories
    }

    #[test]
    fn names_without_separator_are_accepted() {
        let spec = EffectiveCheck::unprefixed(CheckSpec::new("OSGi Configs Check", "noop"));
        let registry = CheckRegistry::from_specs(&[spec], &factories()).unwrap();
        assert_eq!(registry.names(), vec!["OSGi Configs Check"]);
    }

    #[test]
    fn names_with_separator_are_rejected_before_instantiation() {
        let mut factories = CheckFactories::new();
        factories.register("boom", |_| panic!("must not be constructed"));
        let spec = EffectiveCheck::unprefixed(CheckSpec::new("bad/name", "boom"));
        let mut registry = CheckRegistry::new();
        let err = registry.register_spec(&spec, &factories).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCheckSpec { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn prefixed_names_are_kept() {
        let spec = EffectiveCheck {
            prefix: "basic/".into(),
            spec: CheckSpec::new("paths", "noop"),
        };
        let registry = CheckRegistry::from_specs(&[spec], &factories()).unwrap();
        assert_eq!(registry.names(), vec!["basic/paths"]);
    }

    #[test]
    fn unknown_and_failing_factories_are_config_errors() {
        let unknown = EffectiveCheck::unprefixed(CheckSpec::new("x", "missing"));
        assert!(matches!(
            CheckRegistry::from_specs(&[unknown], &factories()),
            Err(ConfigError::UnknownCheck(name)) if name == "missing"
        ));

        let picky = EffectiveCheck::unprefixed(CheckSpec::new("p", "picky"));
        assert!(matches!(
            CheckRegistry::from_specs(&[picky.clone()], &factories()),
            Err(ConfigError::CheckConstruction { .. })
        ));
        let configured = EffectiveCheck::unprefixed(picky.spec.with_config(json!({"ok": true})));
        assert_eq!(CheckRegistry::from_specs(&[configured], &factories()).unwrap().len(), 1);
    }

    #[test]
    fn builtins_are_registered() {
        let factories = CheckFactories::with_builtins();
        for name in ["echo", "overlaps", "paths", "subpackages"] {
            assert!(factories.contains(name), "{name}");
        }
    }
}
