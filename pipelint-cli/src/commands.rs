//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use pipelint_core::{
    Analyzer, AnalyzerConfig, AnnotatedPipeline, ComplianceReport, OperationId, Pipeline,
    Provenance, ReportFormat, load_config,
};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Analyze {
            pipeline,
            format,
            output,
            parallel,
            fail_under,
            disabled,
        } => {
            let mut config = load_config(Some(workspace), config_path)?;
            config.engine.parallel |= parallel;
            config.engine.disabled_rules.extend(disabled);
            let format = format.unwrap_or(config.report.format);

            let (report, rendered) = analyze(&config, &pipeline, format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!(
                        "Score {} ({}), {} finding(s). Report written to {}",
                        report.score,
                        report.band,
                        report.findings.len(),
                        path.display()
                    );
                }
                None => println!("{rendered}"),
            }

            if report.is_partial() {
                tracing::warn!(
                    failed_rules = report.diagnostics.len(),
                    "Some rules failed to evaluate; the score is partial"
                );
            }
            if let Some(threshold) = fail_under
                && report.score < threshold
            {
                anyhow::bail!(
                    "compliance score {} is below the required {}",
                    report.score,
                    threshold
                );
            }
            Ok(())
        }
        Commands::Rules { json } => {
            let config = load_config(Some(workspace), config_path)?;
            let analyzer = Analyzer::from_config(&config)?;
            println!("{}", list_rules(&analyzer, json)?);
            Ok(())
        }
        Commands::Lineage { pipeline } => {
            let pipeline = read_pipeline(&pipeline)?;
            let annotated = AnnotatedPipeline::new(pipeline)?;
            println!("{}", serde_json::to_string_pretty(&lineage_view(&annotated))?);
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let path = init_config(workspace)?;
                println!("Created {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                let config = load_config(Some(workspace), config_path)?;
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}

/// Run the analyzer over a pipeline file and render the report.
pub async fn analyze(
    config: &AnalyzerConfig,
    path: &Path,
    format: ReportFormat,
) -> anyhow::Result<(ComplianceReport, String)> {
    let pipeline = read_pipeline(path)?;
    let analyzer = Analyzer::from_config(config)?;
    let report = analyzer.run(pipeline).await?;
    let rendered = analyzer
        .renderer()
        .pretty(config.report.pretty)
        .render(&report, format)?;
    Ok((report, rendered))
}

/// Read a pipeline from a JSON file, or from stdin when the path is `-`.
fn read_pipeline(path: &Path) -> anyhow::Result<Pipeline> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read pipeline from stdin")?;
        return Pipeline::from_json(&buf).context("invalid pipeline JSON on stdin");
    }
    Pipeline::from_path(path).with_context(|| format!("failed to load {}", path.display()))
}

fn list_rules(analyzer: &Analyzer, json: bool) -> anyhow::Result<String> {
    let metas: Vec<_> = analyzer.catalog().metas().copied().collect();
    if json {
        return Ok(serde_json::to_string_pretty(&metas)?);
    }
    let mut out = String::new();
    for meta in metas {
        out.push_str(&format!(
            "{:<8} {:<9} {:<16} {}\n",
            meta.id,
            meta.severity,
            meta.category.as_str(),
            meta.title
        ));
    }
    Ok(out.trim_end().to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactView {
    id: String,
    provenance: Provenance,
    /// Provenance after following derivation chains.
    resolved: Option<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    producer: Option<OperationId>,
    consumers: Vec<OperationId>,
    data_bearing: bool,
}

fn lineage_view(annotated: &AnnotatedPipeline) -> Vec<ArtifactView> {
    let lineage = annotated.lineage();
    lineage
        .artifacts()
        .map(|artifact| ArtifactView {
            id: artifact.id.to_string(),
            provenance: artifact.provenance.clone(),
            resolved: lineage.resolve(&artifact.id).cloned(),
            producer: artifact.producer,
            consumers: lineage.consumers(&artifact.id).to_vec(),
            data_bearing: artifact.data_bearing,
        })
        .collect()
}

/// Write a default `.pipelint/config.toml`, refusing to overwrite one.
fn init_config(workspace: &Path) -> anyhow::Result<PathBuf> {
    let dir = workspace.join(".pipelint");
    let path = dir.join("config.toml");
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, toml::to_string_pretty(&AnalyzerConfig::default())?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const LEAKY: &str = r#"{
        "metadata": { "name": "leaky" },
        "sources": ["raw"],
        "operations": [
            { "kind": "PrepPreprocessor", "inputs": ["raw"], "outputs": ["prepped"] },
            { "kind": "Split", "inputs": ["raw"], "outputs": ["train", "test"],
              "attributes": { "seeded": true } },
            { "kind": "Fit", "inputs": ["train"], "outputs": ["model"] },
            { "kind": "Evaluate", "inputs": ["model", "test"] }
        ]
    }"#;

    fn write_pipeline(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    fn analyze_cmd(pipeline: PathBuf, output: Option<PathBuf>, fail_under: Option<u8>) -> Commands {
        Commands::Analyze {
            pipeline,
            format: Some(ReportFormat::Json),
            output,
            parallel: false,
            fail_under,
            disabled: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_analyze_writes_report() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, LEAKY);
        let out = dir.path().join("report.json");

        handle_command(analyze_cmd(pipeline, Some(out.clone()), None), dir.path(), None)
            .await
            .unwrap();

        let report: ComplianceReport =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        let ids: Vec<_> = report.findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["DL-002"]);
        assert_eq!(report.score, 75);
    }

    #[tokio::test]
    async fn test_fail_under_threshold() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, LEAKY);
        let out = dir.path().join("report.json");

        let err = handle_command(
            analyze_cmd(pipeline.clone(), Some(out.clone()), Some(80)),
            dir.path(),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("below the required 80"));

        handle_command(analyze_cmd(pipeline, Some(out), Some(75)), dir.path(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_analyze_honours_workspace_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".pipelint")).unwrap();
        std::fs::write(
            dir.path().join(".pipelint/config.toml"),
            "[engine]\ndisabled_rules = [\"DL-002\"]\n",
        )
        .unwrap();
        let pipeline = write_pipeline(&dir, LEAKY);
        let config = load_config(Some(dir.path()), None).unwrap();

        let (report, rendered) = analyze(&config, &pipeline, ReportFormat::Markdown)
            .await
            .unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.score, 100);
        assert!(rendered.contains("100"));
    }

    #[tokio::test]
    async fn test_disable_flag_repeats_workspace_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".pipelint")).unwrap();
        std::fs::write(
            dir.path().join(".pipelint/config.toml"),
            "[engine]\ndisabled_rules = [\"DL-002\"]\n",
        )
        .unwrap();
        let pipeline = write_pipeline(&dir, LEAKY);
        let out = dir.path().join("report.json");
        let command = Commands::Analyze {
            pipeline,
            format: Some(ReportFormat::Json),
            output: Some(out.clone()),
            parallel: false,
            fail_under: Some(100),
            disabled: vec!["DL-002".into()],
        };

        handle_command(command, dir.path(), None).await.unwrap();
        let report: ComplianceReport =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(report.score, 100);
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let err = handle_command(analyze_cmd(missing, None, None), dir.path(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }

    #[tokio::test]
    async fn test_analyze_dangling_reference() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(
            &dir,
            r#"{ "operations": [ { "kind": "Fit", "inputs": ["ghost"], "outputs": ["m"] } ] }"#,
        );
        let result = handle_command(analyze_cmd(pipeline, None, None), dir.path(), None).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_list_rules() {
        let analyzer = Analyzer::default();
        let table = list_rules(&analyzer, false).unwrap();
        assert_eq!(table.lines().count(), 23);
        assert!(table.lines().next().unwrap().starts_with("DL-001"));

        let json: Vec<serde_json::Value> =
            serde_json::from_str(&list_rules(&analyzer, true).unwrap()).unwrap();
        assert_eq!(json.len(), 23);
        assert_eq!(json[0]["id"], "DL-001");
    }

    #[test]
    fn test_lineage_view() {
        let annotated = AnnotatedPipeline::new(Pipeline::from_json(LEAKY).unwrap()).unwrap();
        let view = lineage_view(&annotated);
        let train = view.iter().find(|a| a.id == "train").unwrap();
        assert_eq!(train.provenance, Provenance::Train);
        assert_eq!(train.producer, Some(OperationId(1)));
        let raw = view.iter().find(|a| a.id == "raw").unwrap();
        assert_eq!(raw.consumers, vec![OperationId(0), OperationId(1)]);
        assert!(raw.producer.is_none());
    }

    #[tokio::test]
    async fn test_config_init_and_show() {
        let dir = TempDir::new().unwrap();
        let path = init_config(dir.path()).unwrap();
        assert!(path.exists());
        assert!(init_config(dir.path()).is_err());

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config, AnalyzerConfig::default());

        handle_command(
            Commands::Config {
                action: ConfigAction::Show,
            },
            dir.path(),
            None,
        )
        .await
        .unwrap();
    }
}
