//! Configuration management for forge
//!
//! This module provides hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. Supports TOML configuration files with `[generation]`,
//! `[retrieval]`, `[pipeline]`, `[llm]` and `[artifacts]` sections.

mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use cli_args::CliArgs;
pub use discovery::FORGE_HOME_ENV;
pub use forge_utils::types::ConfigSource;
pub use model::*;

use std::collections::HashMap;
use std::time::Duration;

use forge_utils::error::ConfigError;

impl Config {
    /// Parse the configured default flow.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything other than `flat` or
    /// `hierarchical`.
    pub fn pipeline_flow(&self) -> Result<PipelineFlow, ConfigError> {
        match self.pipeline.flow.as_str() {
            "flat" => Ok(PipelineFlow::Flat),
            "hierarchical" => Ok(PipelineFlow::Hierarchical),
            other => Err(ConfigError::InvalidValue {
                key: "flow".to_string(),
                value: format!("Unknown pipeline flow: {other}"),
            }),
        }
    }

    /// Parse the configured model gateway provider.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown provider name.
    pub fn llm_provider(&self) -> Result<LlmProvider, ConfigError> {
        match self.llm.provider.as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "scripted" => Ok(LlmProvider::Scripted),
            other => Err(ConfigError::InvalidValue {
                key: "llm_provider".to_string(),
                value: format!("Unknown LLM provider: {other}"),
            }),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.request_timeout_secs)
    }

    #[must_use]
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.timeout_secs)
    }

    /// Build a config from defaults only, attributing every key to
    /// `programmatic`. Used by embedders that do not want discovery.
    #[must_use]
    pub fn programmatic() -> Self {
        let mut config = Self {
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            llm: LlmConfig::default(),
            artifacts: ArtifactsConfig::default(),
            source_attribution: HashMap::new(),
        };
        for key in config.effective_config().into_keys() {
            config
                .source_attribution
                .insert(key, ConfigSource::Programmatic);
        }
        config
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Config {
    /// Create a minimal Config for testing purposes
    ///
    /// Uses the scripted gateway, the flat flow and no retrieval endpoint, so
    /// nothing in a test touches the network.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        let mut config = Self::programmatic();
        config.llm.provider = LlmProvider::Scripted.as_str().to_string();
        config.generation.model = "test-model".to_string();
        config.generation.worker_model = "test-worker-model".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let forge_dir = dir.join(".forge");
        fs::create_dir_all(&forge_dir).unwrap();
        let path = forge_dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_config_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let config = Config::discover_from(temp_dir.path(), None, &CliArgs::default()).unwrap();

        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert_eq!(config.pipeline.refinement_min_code_len, 100);
        assert_eq!(config.pipeline_flow().unwrap(), PipelineFlow::Flat);
        assert!(!config.retrieval.enabled);
        assert_eq!(
            config.source_attribution.get("model"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_config_discovery_with_cli_override() {
        let temp_dir = TempDir::new().unwrap();
        write_config(
            temp_dir.path(),
            r#"
[generation]
model = "file-model"
planning_temperature = 0.5

[pipeline]
flow = "hierarchical"
"#,
        );

        let cli_args = CliArgs {
            model: Some("cli-model".to_string()),
            ..Default::default()
        };
        let config = Config::discover_from(temp_dir.path(), None, &cli_args).unwrap();

        assert_eq!(config.generation.model, "cli-model");
        assert!((config.generation.planning_temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.pipeline_flow().unwrap(), PipelineFlow::Hierarchical);
        assert_eq!(
            config.source_attribution.get("model"),
            Some(&ConfigSource::Cli)
        );
        assert_eq!(
            config.source_attribution.get("planning_temperature"),
            Some(&ConfigSource::Config)
        );
        assert_eq!(
            config.source_attribution.get("coding_temperature"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_upward_search_finds_parent_config() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), "[llm]\nprovider = \"scripted\"\n");
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, None, &CliArgs::default()).unwrap();
        assert_eq!(config.llm_provider().unwrap(), LlmProvider::Scripted);
    }

    #[test]
    fn test_forge_home_takes_precedence_over_upward_search() {
        let project = TempDir::new().unwrap();
        write_config(project.path(), "[generation]\nmodel = \"project\"\n");
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("config.toml"),
            "[generation]\nmodel = \"home\"\n",
        )
        .unwrap();

        let config =
            Config::discover_from(project.path(), Some(home.path()), &CliArgs::default()).unwrap();
        assert_eq!(config.generation.model, "home");
    }

    #[test]
    fn test_explicit_missing_config_path_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli_args = CliArgs {
            config_path: Some(temp_dir.path().join("nope.toml")),
            ..Default::default()
        };
        let err = Config::discover_from(temp_dir.path(), None, &cli_args).unwrap_err();
        assert!(err.to_string().contains("not found"), "unexpected error: {err}");
    }

    #[test]
    fn test_validation_rejects_out_of_range_temperature() {
        let mut config = Config::minimal_for_testing();
        config.generation.coding_temperature = 1.5;
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "coding_temperature"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_collects_multiple_errors() {
        let mut config = Config::minimal_for_testing();
        config.retrieval.top_k = 0;
        config.pipeline.flow = "spiral".to_string();
        config.llm.provider = "carrier-pigeon".to_string();
        match config.validate() {
            Err(ConfigError::ValidationFailed {
                errors,
                error_count,
            }) => {
                assert_eq!(error_count, 3);
                assert!(errors.iter().any(|e| e.contains("top_k")));
                assert!(errors.iter().any(|e| e.contains("spiral")));
                assert!(errors.iter().any(|e| e.contains("carrier-pigeon")));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_non_http_endpoint_when_enabled() {
        let mut config = Config::minimal_for_testing();
        config.retrieval.endpoint = Some("ftp://docs".to_string());
        assert!(config.validate().is_ok(), "disabled retrieval ignores endpoint");

        config.retrieval.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_toml_key_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), "[generation]\nmodle = \"typo\"\n");
        let result = Config::discover_from(temp_dir.path(), None, &CliArgs::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_effective_config_never_contains_secrets() {
        let config = Config::minimal_for_testing();
        let effective = config.effective_config();
        assert_eq!(
            effective.get("llm_api_key_env").map(|(v, _)| v.as_str()),
            Some(DEFAULT_LLM_API_KEY_ENV)
        );
        assert_eq!(
            effective.get("model").map(|(_, s)| s.as_str()),
            Some("programmatic")
        );
    }

    #[test]
    fn test_retrieval_is_active_requires_endpoint() {
        let mut retrieval = RetrievalConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!retrieval.is_active());
        retrieval.endpoint = Some("  ".to_string());
        assert!(!retrieval.is_active());
        retrieval.endpoint = Some("https://kb.example/v1/retrieve".to_string());
        assert!(retrieval.is_active());
    }
}
