//! SARIF 2.1.0 export: Static Analysis Results Interchange Format.
//!
//! Lets code-scanning consumers (GitHub Code Scanning, Azure DevOps) display
//! pipeline findings next to the analysed script.

use crate::finding::{Finding, Severity};
use crate::rule::RuleCatalog;
use crate::scoring::Score;
use serde::Serialize;
use std::collections::BTreeSet;

const SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json";

/// A complete SARIF log.
#[derive(Debug, Serialize)]
pub struct SarifLog {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

/// A single analysis run in SARIF.
#[derive(Debug, Serialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<SarifRunProperties>,
}

/// Compliance score attached to the run's property bag.
#[derive(Debug, Serialize)]
pub struct SarifRunProperties {
    pub score: u8,
    pub band: String,
}

#[derive(Debug, Serialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize)]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SarifRule>,
}

/// A SARIF rule definition.
#[derive(Debug, Serialize)]
pub struct SarifRule {
    pub id: String,
    #[serde(rename = "shortDescription")]
    pub short_description: SarifMessage,
    #[serde(rename = "defaultConfiguration")]
    pub default_configuration: SarifRuleConfiguration,
    pub properties: SarifRuleProperties,
}

#[derive(Debug, Serialize)]
pub struct SarifRuleConfiguration {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct SarifRuleProperties {
    pub category: String,
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct SarifMessage {
    pub text: String,
}

/// A SARIF result (finding).
#[derive(Debug, Serialize)]
pub struct SarifResult {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub level: String,
    pub message: SarifMessage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SarifLocation>,
    pub fingerprints: SarifFingerprints,
}

/// A result location: a source region when the front-end supplied a file,
/// and always the pipeline operation.
#[derive(Debug, Serialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation", skip_serializing_if = "Option::is_none")]
    pub physical_location: Option<SarifPhysicalLocation>,
    #[serde(rename = "logicalLocations", skip_serializing_if = "Vec::is_empty")]
    pub logical_locations: Vec<SarifLogicalLocation>,
}

#[derive(Debug, Serialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifactLocation,
    pub region: SarifRegion,
}

#[derive(Debug, Serialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct SarifRegion {
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine", skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SarifLogicalLocation {
    pub name: String,
    pub kind: String,
}

/// SARIF fingerprints for deduplication.
#[derive(Debug, Serialize)]
pub struct SarifFingerprints {
    #[serde(rename = "contentHash/sha256")]
    pub content_hash: String,
}

/// Convert a severity to SARIF level string.
fn severity_to_sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "error",
        Severity::Major => "warning",
        Severity::Minor => "note",
    }
}

fn to_location(finding: &Finding) -> Option<SarifLocation> {
    let physical_location = finding.location.as_ref().and_then(|loc| {
        loc.file.as_ref().map(|file| SarifPhysicalLocation {
            artifact_location: SarifArtifactLocation {
                uri: file.to_string_lossy().replace('\\', "/"),
            },
            region: SarifRegion {
                start_line: loc.line,
                end_line: loc.end_line,
            },
        })
    });
    let logical_locations: Vec<_> = finding
        .operation
        .map(|op| SarifLogicalLocation {
            name: op.to_string(),
            kind: "operation".to_string(),
        })
        .into_iter()
        .collect();

    if physical_location.is_none() && logical_locations.is_empty() {
        return None;
    }
    Some(SarifLocation {
        physical_location,
        logical_locations,
    })
}

/// Convert findings to a SARIF log. Rule descriptors come from the catalog
/// and only cover rules that produced results.
pub fn findings_to_sarif(
    findings: &[Finding],
    score: Score,
    catalog: &RuleCatalog,
    tool_name: &str,
    tool_version: &str,
) -> SarifLog {
    let fired: BTreeSet<&str> = findings.iter().map(|f| f.rule_id.as_str()).collect();
    let rules = catalog
        .metas()
        .filter(|meta| fired.contains(meta.id))
        .map(|meta| SarifRule {
            id: meta.id.to_string(),
            short_description: SarifMessage {
                text: meta.title.to_string(),
            },
            default_configuration: SarifRuleConfiguration {
                level: severity_to_sarif_level(meta.severity).to_string(),
            },
            properties: SarifRuleProperties {
                category: meta.category.to_string(),
                version: meta.version,
            },
        })
        .collect();

    let results = findings
        .iter()
        .map(|f| SarifResult {
            rule_id: f.rule_id.clone(),
            level: severity_to_sarif_level(f.severity).to_string(),
            message: SarifMessage {
                text: f.message.clone(),
            },
            locations: to_location(f).into_iter().collect(),
            fingerprints: SarifFingerprints {
                content_hash: f.fingerprint.clone(),
            },
        })
        .collect();

    SarifLog {
        schema: SCHEMA.to_string(),
        version: "2.1.0".to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: tool_name.to_string(),
                    version: tool_version.to_string(),
                    rules,
                },
            },
            results,
            properties: Some(SarifRunProperties {
                score: score.value,
                band: score.band.to_string(),
            }),
        }],
    }
}

/// Serialize a SARIF log to JSON string.
pub fn to_json(sarif: &SarifLog) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(sarif)
}
