use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::package::PackageId;
use crate::models::severity::Severity;

/// A severity-tagged finding attributed to one or more packages.
///
/// Two violations are equal when severity, description and package set are
/// all equal; the collector keeps such duplicates once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Violation {
    severity: Severity,
    description: String,
    #[serde(default)]
    packages: BTreeSet<PackageId>,
}

impl Violation {
    pub fn new<I>(severity: Severity, description: impl Into<String>, packages: I) -> Self
    where
        I: IntoIterator<Item = PackageId>,
    {
        Self {
            severity,
            description: description.into(),
            packages: packages.into_iter().collect(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn packages(&self) -> &BTreeSet<PackageId> {
        &self.packages
    }

    /// Copy of this violation attributed to `package` when it names none.
    pub(crate) fn attributed_to(self, package: Option<&PackageId>) -> Self {
        match package {
            Some(id) if self.packages.is_empty() => Self {
                packages: BTreeSet::from([id.clone()]),
                ..self
            },
            _ => self,
        }
    }
}

/// Terminal artifact of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// False when the scan stopped on a fatal error; `error` says why.
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fail_on: Severity,
    pub packages: Vec<PackageId>,
    #[serde(default)]
    pub pre_install: Vec<PackageId>,
    #[serde(default)]
    pub checks: Vec<String>,
    pub summary: BTreeMap<String, usize>,
    pub violations: Vec<Violation>,
    pub overall_severity: Option<Severity>,
    pub passed: bool,
}

impl ScanReport {
    /// Builds a report from severity-sorted violations.
    pub fn new(
        violations: Vec<Violation>,
        fail_on: Severity,
        packages: Vec<PackageId>,
        pre_install: Vec<PackageId>,
        checks: Vec<String>,
    ) -> Self {
        let overall_severity = violations.iter().map(Violation::severity).reduce(Severity::max);
        let passed = !violations.iter().any(|v| v.severity().meets_minimum(fail_on));

        let mut summary = BTreeMap::new();
        summary.insert("total_packages".to_string(), packages.len());
        summary.insert("total_pre_install".to_string(), pre_install.len());
        summary.insert("total_violations".to_string(), violations.len());
        for level in Severity::ALL {
            let count = violations.iter().filter(|v| v.severity() == level).count();
            summary.insert(level.as_str().to_lowercase(), count);
        }

        Self {
            complete: true,
            error: None,
            fail_on,
            packages,
            pre_install,
            checks,
            summary,
            violations,
            overall_severity,
            passed,
        }
    }

    /// A degenerate report for a scan that never produced results.
    pub fn incomplete(fail_on: Severity, error: impl Into<String>) -> Self {
        Self {
            complete: false,
            error: Some(error.into()),
            passed: false,
            ..Self::new(Vec::new(), fail_on, Vec::new(), Vec::new(), Vec::new())
        }
    }

    /// Re-evaluates the outcome against another gate.
    pub fn passes(&self, fail_on: Severity) -> bool {
        self.complete && !self.violations.iter().any(|v| v.severity().meets_minimum(fail_on))
    }

    pub fn failing_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |v| v.severity().meets_minimum(self.fail_on))
    }
}
