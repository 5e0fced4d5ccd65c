//! Analyzer configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace `.pipelint/config.toml` -> explicit file -> `PIPELINT_`
//! environment -> programmatic overrides (any figment provider, so only the
//! keys it sets replace earlier layers).

use crate::engine::DEFAULT_MAX_CONCURRENT_RULES;
use crate::error::AnalyzerError;
use crate::report::ReportFormat;
use crate::scoring::SeverityWeights;
use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Deduction per finding severity.
    pub scoring: SeverityWeights,
    pub engine: EngineConfig,
    pub report: ReportConfig,
}

/// Rule engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate rules on the blocking thread pool.
    pub parallel: bool,
    pub max_concurrent_rules: usize,
    /// Rule ids to leave out of the catalog.
    pub disabled_rules: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrent_rules: DEFAULT_MAX_CONCURRENT_RULES,
            disabled_rules: Vec::new(),
        }
    }
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub pretty: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Json,
            pretty: true,
        }
    }
}

/// Directory holding the user-level `config.toml`.
pub fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "pipelint", "pipelint")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Load configuration from all layers.
///
/// `explicit` must exist when given; the user and workspace files are
/// optional.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<AnalyzerConfig, AnalyzerError> {
    load_config_with(workspace, explicit, Figment::new())
}

/// Like [`load_config`], with `overrides` merged last.
///
/// Only the keys `overrides` provides are replaced, e.g.
/// `Serialized::default("engine.max_concurrent_rules", 16)`.
pub fn load_config_with(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: impl Provider,
) -> Result<AnalyzerConfig, AnalyzerError> {
    let mut figment = Figment::from(Serialized::defaults(AnalyzerConfig::default()));

    // User-level config
    if let Some(dir) = user_config_dir() {
        let user_config = dir.join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".pipelint").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(AnalyzerError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (PIPELINT_ENGINE__PARALLEL, PIPELINT_SCORING__MAJOR, etc.)
    figment = figment.merge(Env::prefixed("PIPELINT_").split("__"));

    figment = figment.merge(overrides);

    let config: AnalyzerConfig = figment
        .extract()
        .map_err(|e| AnalyzerError::Config(e.to_string()))?;
    tracing::debug!(
        parallel = config.engine.parallel,
        disabled = config.engine.disabled_rules.len(),
        format = %config.report.format,
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.scoring.critical, 25);
        assert_eq!(config.scoring.major, 10);
        assert_eq!(config.scoring.minor, 5);
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.max_concurrent_rules, 4);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert!(config.report.pretty);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AnalyzerConfig::default();
        config.engine.disabled_rules = vec!["RP-002".into()];
        config.report.format = ReportFormat::Sarif;
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AnalyzerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AnalyzerConfig = toml::from_str("[scoring]\nmajor = 15\n").unwrap();
        assert_eq!(config.scoring.major, 15);
        assert_eq!(config.scoring.critical, 25);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".pipelint");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            r#"
[engine]
parallel = true
disabled_rules = ["RP-002", "RP-005"]

[report]
format = "markdown"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert!(config.engine.parallel);
        assert_eq!(config.engine.disabled_rules, vec!["RP-002", "RP-005"]);
        assert_eq!(config.report.format, ReportFormat::Markdown);
    }

    #[test]
    fn test_explicit_file_overrides_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".pipelint");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), "[scoring]\nminor = 1\n").unwrap();
        let explicit = dir.path().join("strict.toml");
        std::fs::write(&explicit, "[scoring]\nminor = 8\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&explicit)).unwrap();
        assert_eq!(config.scoring.minor, 8);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_config(None, Some(&missing)),
            Err(AnalyzerError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = Serialized::default("engine.max_concurrent_rules", 16);
        let config = load_config_with(None, None, overrides).unwrap();
        assert_eq!(config.engine.max_concurrent_rules, 16);
    }

    #[test]
    fn test_overrides_keep_workspace_values() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".pipelint");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[engine]\nparallel = true\n\n[scoring]\nminor = 2\n",
        )
        .unwrap();

        let overrides = Serialized::default("engine.max_concurrent_rules", 16);
        let config = load_config_with(Some(dir.path()), None, overrides).unwrap();
        assert!(config.engine.parallel);
        assert_eq!(config.scoring.minor, 2);
        assert_eq!(config.engine.max_concurrent_rules, 16);
    }
}
