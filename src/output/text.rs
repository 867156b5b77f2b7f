use crate::models::{ScanReport, Violation};

pub fn format_text_report(report: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str("════════════════════════════════════════════════════════════════\n");
    out.push_str("                      Package Scan Report                       \n");
    out.push_str("════════════════════════════════════════════════════════════════\n\n");

    if let Some(error) = &report.error {
        out.push_str(&format!("  SCAN INCOMPLETE: {}\n\n", error));
    }

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "  Packages scanned: {}\n",
        report.summary.get("total_packages").cloned().unwrap_or(0)
    ));
    out.push_str(&format!(
        "  Pre-install packages: {}\n",
        report.summary.get("total_pre_install").cloned().unwrap_or(0)
    ));
    out.push_str(&format!("  Checks: {}\n", report.checks.len()));
    out.push_str(&format!(
        "  Violations: {}\n",
        report.summary.get("total_violations").cloned().unwrap_or(0)
    ));
    out.push_str(&format!(
        "  Result: {} (fail on {})\n\n",
        if report.passed { "PASSED" } else { "FAILED" },
        report.fail_on
    ));

    if !report.packages.is_empty() {
        out.push_str("## Packages\n\n");
        for p in &report.packages {
            out.push_str(&format!("  {}\n", p));
        }
        out.push('\n');
    }

    out.push_str("## Violations\n\n");
    if report.violations.is_empty() {
        out.push_str("  none\n");
    }
    for v in &report.violations {
        out.push_str(&format_violation(v));
    }

    out
}

fn format_violation(v: &Violation) -> String {
    let mut s = String::new();
    s.push_str(&format!("  [{}] {}\n", v.severity(), v.description()));
    if !v.packages().is_empty() {
        let packages: Vec<String> = v.packages().iter().map(|p| p.to_string()).collect();
        s.push_str(&format!("    Packages: {}\n", packages.join(", ")));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PackageId, Severity};

    #[test]
    fn text_report_lists_violations_with_packages() {
        let pkg = PackageId::new("acme", "site", "1.0");
        let report = ScanReport::new(
            vec![Violation::new(Severity::Major, "denied path /libs/x", [pkg.clone()])],
            Severity::Major,
            vec![pkg],
            vec![],
            vec!["pkgvet/basic/paths".into()],
        );
        let text = format_text_report(&report);
        assert!(text.contains("[MAJOR] denied path /libs/x"));
        assert!(text.contains("Packages: acme:site:1.0"));
        assert!(text.contains("Result: FAILED (fail on MAJOR)"));
    }

    #[test]
    fn incomplete_reports_say_so() {
        let text = format_text_report(&ScanReport::incomplete(Severity::Major, "unknown plan"));
        assert!(text.contains("SCAN INCOMPLETE: unknown plan"));
        assert!(text.contains("  none\n"));
    }
}
