//! Markdown report generator: human-readable compliance reports.

use super::ComplianceReport;
use crate::finding::{Finding, RuleCategory, Severity};
use crate::rule::RuleCatalog;
use crate::scoring::ScoreBreakdown;

/// Generate a Markdown report.
pub fn report_to_markdown(
    report: &ComplianceReport,
    breakdown: &ScoreBreakdown,
    catalog: &RuleCatalog,
    title: &str,
) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {title}\n\n"));
    md.push_str(&format!(
        "**Score:** {}/100 ({})\n\n",
        report.score, report.band
    ));

    md.push_str("## Summary\n\n");
    md.push_str("| Severity | Count |\n");
    md.push_str("|----------|-------|\n");
    for severity in Severity::ALL {
        if let Some(count) = breakdown.counts.get(&severity) {
            md.push_str(&format!("| {severity} | {count} |\n"));
        }
    }
    md.push_str(&format!("| **Total** | **{}** |\n\n", report.findings.len()));

    if !breakdown.deductions.is_empty() {
        md.push_str("| Category | Deduction |\n");
        md.push_str("|----------|-----------|\n");
        for category in RuleCategory::ALL {
            if let Some(points) = breakdown.deductions.get(&category) {
                md.push_str(&format!("| {} | -{points} |\n", category.label()));
            }
        }
        md.push('\n');
    }

    if !report.diagnostics.is_empty() {
        md.push_str("## Diagnostics\n\n");
        md.push_str("Some rules could not be evaluated; the score only reflects the rest.\n\n");
        for diagnostic in &report.diagnostics {
            md.push_str(&format!("- `{}`: {}\n", diagnostic.rule_id, diagnostic.message));
        }
        md.push('\n');
    }

    if report.findings.is_empty() {
        md.push_str("No findings detected.\n");
        return md;
    }

    md.push_str("## Findings\n\n");

    for severity in Severity::ALL {
        let severity_findings: Vec<&Finding> = report
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect();

        if severity_findings.is_empty() {
            continue;
        }

        md.push_str(&format!("### {severity} ({})\n\n", severity_findings.len()));

        for finding in severity_findings {
            let title = catalog
                .get(&finding.rule_id)
                .map(|rule| rule.meta().title)
                .unwrap_or_default();
            md.push_str(&format!("#### {} {title}\n\n", finding.rule_id));

            if let Some(ref loc) = finding.location {
                md.push_str(&format!("**Location:** `{loc}`\n\n"));
            }

            md.push_str(&format!(
                "**Category:** {}",
                finding.category.label()
            ));
            if let Some(op) = finding.operation {
                md.push_str(&format!(" | **Operation:** `{op}`"));
            }
            md.push_str("\n\n");

            md.push_str(&format!("{}\n\n", finding.message));

            if !finding.evidence.is_empty() {
                let evidence: Vec<String> =
                    finding.evidence.iter().map(|e| format!("`{e}`")).collect();
                md.push_str(&format!("**Evidence:** {}\n\n", evidence.join(", ")));
            }

            md.push_str("---\n\n");
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleEvaluationError;
    use crate::pipeline::{Operation, OperationKind, SourceLocation};
    use crate::scoring::ScoringEngine;

    fn sample_finding(rule_id: &str) -> Finding {
        let meta = RuleCatalog::builtin().get(rule_id).unwrap().meta();
        let op = Operation::new(OperationKind::Split).at(SourceLocation::new(10).in_file("model.R"));
        Finding::new(meta, "A test finding").at(&op)
    }

    fn render(findings: Vec<Finding>, diagnostics: Vec<RuleEvaluationError>) -> String {
        let scoring = ScoringEngine::default();
        let score = scoring.score(&findings);
        let breakdown = scoring.breakdown(&findings);
        let report = ComplianceReport::new(findings, score, diagnostics);
        report_to_markdown(&report, &breakdown, RuleCatalog::builtin(), "Compliance Report")
    }

    #[test]
    fn test_markdown_report() {
        let report = render(
            vec![sample_finding("DL-002"), sample_finding("RS-001")],
            Vec::new(),
        );

        assert!(report.contains("# Compliance Report"));
        assert!(report.contains("**Score:** 65/100 (Acceptable)"));
        assert!(report.contains("| Critical | 1 |"));
        assert!(report.contains("| Major | 1 |"));
        assert!(report.contains("| **Total** | **2** |"));
        assert!(report.contains("| Data leakage | -25 |"));
        assert!(report.contains("### Critical"));
        assert!(report.contains("#### DL-002 Preprocessor estimated on pre-split data"));
        assert!(report.contains("model.R:10"));
    }

    #[test]
    fn test_empty_findings_report() {
        let report = render(Vec::new(), Vec::new());
        assert!(report.contains("**Score:** 100/100 (Perfect)"));
        assert!(report.contains("No findings detected."));
    }

    #[test]
    fn test_diagnostics_listed() {
        let report = render(
            Vec::new(),
            vec![RuleEvaluationError::new("ME-002", "bad metrics")],
        );
        assert!(report.contains("## Diagnostics"));
        assert!(report.contains("- `ME-002`: bad metrics"));
    }

    #[test]
    fn test_severity_ordering() {
        let report = render(
            vec![sample_finding("RP-004"), sample_finding("DL-001")],
            Vec::new(),
        );
        let critical_pos = report.find("### Critical").unwrap();
        let minor_pos = report.find("### Minor").unwrap();
        assert!(critical_pos < minor_pos, "Critical should appear before Minor");
    }
}
