use crate::models::ScanReport;

pub fn render_html_report(report: &ScanReport) -> String {
    let total_packages = report.summary.get("total_packages").copied().unwrap_or(report.packages.len());
    let total_violations = report
        .summary
        .get("total_violations")
        .copied()
        .unwrap_or(report.violations.len());

    let mut out = String::new();
    out.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Package Scan Report</title>\n");
    out.push_str("</head>\n<body>\n");

    out.push_str("<h1>Package Scan Report</h1>\n");
    if let Some(error) = &report.error {
        out.push_str(&format!("<p><strong>Scan incomplete:</strong> {}</p>\n", escape_html(error)));
    }
    out.push_str("<ul>\n");
    out.push_str(&format!("<li>Total packages: {}</li>\n", total_packages));
    out.push_str(&format!("<li>Total violations: {}</li>\n", total_violations));
    out.push_str(&format!(
        "<li>Result: {} (fail on {})</li>\n",
        if report.passed { "passed" } else { "failed" },
        report.fail_on
    ));
    out.push_str("</ul>\n");

    out.push_str("<h2>Violations</h2>\n");
    out.push_str("<table border=\"1\" cellspacing=\"0\" cellpadding=\"6\">\n");
    out.push_str("<thead><tr><th>Severity</th><th>Description</th><th>Packages</th></tr></thead>\n");
    out.push_str("<tbody>\n");

    for v in &report.violations {
        let packages: Vec<String> = v.packages().iter().map(|p| escape_html(&p.to_string())).collect();
        out.push_str("<tr>");
        out.push_str(&format!("<td>{}</td>", v.severity()));
        out.push_str(&format!("<td>{}</td>", escape_html(v.description())));
        out.push_str(&format!("<td>{}</td>", packages.join("<br>")));
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody></table>\n");

    if !report.checks.is_empty() {
        out.push_str("<h2>Checks</h2>\n<ul>\n");
        for check in &report.checks {
            out.push_str(&format!("<li>{}</li>\n", escape_html(check)));
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PackageId, Severity, Violation};

    #[test]
    fn descriptions_are_escaped() {
        let report = ScanReport::new(
            vec![Violation::new(
                Severity::Minor,
                "<script>alert('x')</script>",
                [PackageId::new("acme", "site", "1.0")],
            )],
            Severity::Major,
            vec![PackageId::new("acme", "site", "1.0")],
            vec![],
            vec![],
        );
        let html = render_html_report(&report);
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(html.contains("<td>MINOR</td>"));
        assert!(html.contains("Result: passed"));
    }
}
