//! Report emission: JSON, SARIF and Markdown renderings of a compliance report.

pub mod markdown;
pub mod sarif;

use crate::error::{AnalyzerError, RuleEvaluationError};
use crate::finding::Finding;
use crate::rule::RuleCatalog;
use crate::scoring::{Band, Score, ScoringEngine};
use serde::{Deserialize, Serialize};

/// The terminal artifact of one analysis run.
///
/// Holds no timestamps or run ids: the same pipeline always serializes to
/// the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    /// Findings in report order.
    pub findings: Vec<Finding>,
    /// Integer in `[0, 100]`.
    pub score: u8,
    pub band: Band,
    /// Rules that failed to evaluate. A non-empty list means the score is
    /// partial.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<RuleEvaluationError>,
}

impl ComplianceReport {
    pub fn new(findings: Vec<Finding>, score: Score, diagnostics: Vec<RuleEvaluationError>) -> Self {
        Self {
            findings,
            score: score.value,
            band: score.band,
            diagnostics,
        }
    }

    pub fn score(&self) -> Score {
        Score {
            value: self.score,
            band: self.band,
        }
    }

    /// Whether some rules failed and their findings are missing.
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Output format of a rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Sarif,
    Markdown,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Sarif => "sarif",
            ReportFormat::Markdown => "markdown",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "sarif" => Ok(ReportFormat::Sarif),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => Err(format!(
                "unknown report format '{other}' (expected json, sarif or markdown)"
            )),
        }
    }
}

/// Renders reports produced with a given catalog and weight table.
#[derive(Debug, Clone)]
pub struct ReportRenderer<'a> {
    catalog: &'a RuleCatalog,
    scoring: ScoringEngine,
    pretty: bool,
    title: String,
}

impl<'a> ReportRenderer<'a> {
    pub fn new(catalog: &'a RuleCatalog, scoring: ScoringEngine) -> Self {
        Self {
            catalog,
            scoring,
            pretty: true,
            title: "Pipeline Compliance Report".to_string(),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn render(
        &self,
        report: &ComplianceReport,
        format: ReportFormat,
    ) -> Result<String, AnalyzerError> {
        let rendered = match format {
            ReportFormat::Json => report.to_json(self.pretty)?,
            ReportFormat::Sarif => {
                let log = sarif::findings_to_sarif(
                    &report.findings,
                    report.score(),
                    self.catalog,
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION"),
                );
                sarif::to_json(&log)?
            }
            ReportFormat::Markdown => {
                let breakdown = self.scoring.breakdown(&report.findings);
                markdown::report_to_markdown(report, &breakdown, self.catalog, &self.title)
            }
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Operation, OperationId, OperationKind, SourceLocation};
    use pretty_assertions::assert_eq;

    fn report() -> ComplianceReport {
        let meta = RuleCatalog::builtin().get("DL-002").unwrap().meta();
        let mut op = Operation::new(OperationKind::PrepPreprocessor).at(SourceLocation::new(12));
        op.id = OperationId(3);
        let findings = vec![Finding::new(meta, "prep on full data").at(&op)];
        let score = ScoringEngine::default().score(&findings);
        ComplianceReport::new(findings, score, Vec::new())
    }

    #[test]
    fn test_json_shape() {
        let value: serde_json::Value = serde_json::from_str(&report().to_json(false).unwrap()).unwrap();
        assert_eq!(value["score"], 75);
        assert_eq!(value["band"], "Acceptable");
        let finding = &value["findings"][0];
        assert_eq!(finding["ruleId"], "DL-002");
        assert_eq!(finding["severity"], "Critical");
        assert_eq!(finding["category"], "DataLeakage");
        assert_eq!(finding["location"], serde_json::json!({"line": 12}));
        assert_eq!(finding["evidence"], serde_json::json!(["op#3"]));
        assert_eq!(finding["operation"], 3);
        assert!(value.get("diagnostics").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let original = report();
        let parsed: ComplianceReport =
            serde_json::from_str(&original.to_json(true).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_diagnostics_serialized_when_present() {
        let mut report = report();
        report.diagnostics.push(RuleEvaluationError::new("ME-002", "boom"));
        assert!(report.is_partial());
        let json = report.to_json(false).unwrap();
        assert!(json.contains(r#""diagnostics":[{"ruleId":"ME-002","message":"boom"}]"#));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("SARIF".parse::<ReportFormat>(), Ok(ReportFormat::Sarif));
        assert_eq!("md".parse::<ReportFormat>(), Ok(ReportFormat::Markdown));
        assert!("html".parse::<ReportFormat>().is_err());
        assert_eq!(ReportFormat::default().to_string(), "json");
    }

    #[test]
    fn test_renderer_formats() {
        let renderer = ReportRenderer::new(RuleCatalog::builtin(), ScoringEngine::default());
        let report = report();
        assert!(renderer
            .render(&report, ReportFormat::Sarif)
            .unwrap()
            .contains("\"2.1.0\""));
        assert!(renderer
            .render(&report, ReportFormat::Markdown)
            .unwrap()
            .starts_with("# Pipeline Compliance Report"));
        let compact = renderer.clone().pretty(false);
        assert!(!compact.render(&report, ReportFormat::Json).unwrap().contains('\n'));
    }
}
