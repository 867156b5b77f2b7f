use std::cmp::Reverse;
use std::collections::HashSet;

use crate::models::report::Violation;
use crate::models::severity::Severity;

/// Accumulates violations for one scan.
///
/// Equal violations (same severity, description and packages) are kept once,
/// at the position of their first recording. Nothing is ever dropped.
#[derive(Debug, Default)]
pub struct ViolationCollector {
    violations: Vec<Violation>,
    seen: HashSet<Violation>,
}

impl ViolationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an equal violation was already recorded.
    pub fn record(&mut self, violation: Violation) -> bool {
        if self.seen.contains(&violation) {
            return false;
        }
        self.seen.insert(violation.clone());
        self.violations.push(violation);
        true
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Insertion order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// SEVERE first, then MAJOR, then MINOR; insertion order within a level.
    pub fn severity_sorted(&self) -> Vec<Violation> {
        let mut sorted = self.violations.clone();
        sorted.sort_by_key(|v| Reverse(v.severity()));
        sorted
    }

    /// True when no recorded violation reaches `minimum`.
    pub fn meets_gate(&self, minimum: Severity) -> bool {
        self.violations
            .iter()
            .all(|v| v.severity().is_less_severe_than(minimum))
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(Violation::severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::PackageId;

    fn v(severity: Severity, description: &str) -> Violation {
        Violation::new(severity, description, [PackageId::new("acme", "site", "1.0")])
    }

    #[test]
    fn duplicates_are_kept_once() {
        let mut collector = ViolationCollector::new();
        assert!(collector.record(v(Severity::Major, "dup")));
        assert!(!collector.record(v(Severity::Major, "dup")));
        assert!(collector.record(v(Severity::Minor, "dup")));
        assert!(collector.record(Violation::new(Severity::Major, "dup", [])));
        assert_eq!(collector.len(), 3);
        assert_eq!(collector.severity_sorted().len(), 3);
    }

    #[test]
    fn sorting_is_by_severity_then_insertion() {
        let mut collector = ViolationCollector::new();
        for (sev, desc) in [
            (Severity::Minor, "m1"),
            (Severity::Severe, "s1"),
            (Severity::Major, "j1"),
            (Severity::Minor, "m2"),
            (Severity::Severe, "s2"),
        ] {
            collector.record(v(sev, desc));
        }
        let sorted = collector.severity_sorted();
        let order: Vec<&str> = sorted.iter().map(Violation::description).collect();
        assert_eq!(order, vec!["s1", "s2", "j1", "m1", "m2"]);
        assert!(sorted.windows(2).all(|w| w[0].severity() >= w[1].severity()));
    }

    #[test]
    fn gate_fails_iff_a_violation_reaches_the_minimum() {
        let mut collector = ViolationCollector::new();
        for minimum in Severity::ALL {
            assert!(collector.meets_gate(minimum));
        }
        collector.record(v(Severity::Major, "x"));
        assert!(!collector.meets_gate(Severity::Minor));
        assert!(!collector.meets_gate(Severity::Major));
        assert!(collector.meets_gate(Severity::Severe));
        assert_eq!(collector.max_severity(), Some(Severity::Major));
    }
}
