use crate::models::ScanReport;
use serde_json::Result;

pub fn format_json_report(report: &ScanReport) -> Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn parse_json_report(bytes: &[u8]) -> Result<ScanReport> {
    serde_json::from_slice(bytes)
}
