use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{
    ArtifactsConfig, CliArgs, Config, ConfigSource, GenerationConfig, LlmConfig, PipelineConfig,
    RetrievalConfig,
};

/// Environment variable naming a directory that holds `config.toml`.
pub const FORGE_HOME_ENV: &str = "FORGE_HOME";

/// TOML configuration file structure. Every key is optional so that
/// attribution can tell file values apart from defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    generation: Option<TomlGeneration>,
    retrieval: Option<TomlRetrieval>,
    pipeline: Option<TomlPipeline>,
    llm: Option<TomlLlm>,
    artifacts: Option<TomlArtifacts>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGeneration {
    model: Option<String>,
    worker_model: Option<String>,
    planning_temperature: Option<f32>,
    coding_temperature: Option<f32>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRetrieval {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
    collection: Option<String>,
    top_k: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPipeline {
    flow: Option<String>,
    refinement_min_code_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlLlm {
    provider: Option<String>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    budget: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlArtifacts {
    log_path: Option<Utf8PathBuf>,
}

/// Overwrite `slot` when `value` is present and record where it came from.
fn apply<T>(
    slot: &mut T,
    value: Option<T>,
    key: &str,
    source: ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(value) = value {
        *slot = value;
        attribution.insert(key.to_string(), source);
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined, a config
    /// file exists but cannot be parsed, or validation fails.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        let forge_home = std::env::var_os(FORGE_HOME_ENV).map(PathBuf::from);
        Self::discover_from(&start_dir, forge_home.as_deref(), cli_args)
    }

    /// Path-driven variant of [`discover`](Self::discover) that does not read
    /// process-global state.
    ///
    /// # Errors
    ///
    /// See [`discover`](Self::discover).
    pub fn discover_from(
        start_dir: &Path,
        forge_home: Option<&Path>,
        cli_args: &CliArgs,
    ) -> Result<Self> {
        let mut source_attribution = HashMap::new();
        for key in [
            "model",
            "worker_model",
            "planning_temperature",
            "coding_temperature",
            "request_timeout_secs",
            "retrieval_enabled",
            "retrieval_top_k",
            "flow",
            "refinement_min_code_len",
            "llm_provider",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let mut generation = GenerationConfig::default();
        let mut retrieval = RetrievalConfig::default();
        let mut pipeline = PipelineConfig::default();
        let mut llm = LlmConfig::default();
        let mut artifacts = ArtifactsConfig::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(forge_utils::error::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir, forge_home)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let src = ConfigSource::Config;
            let attr = &mut source_attribution;

            if let Some(g) = file.generation {
                apply(&mut generation.model, g.model, "model", src, attr);
                apply(&mut generation.worker_model, g.worker_model, "worker_model", src, attr);
                apply(
                    &mut generation.planning_temperature,
                    g.planning_temperature,
                    "planning_temperature",
                    src,
                    attr,
                );
                apply(
                    &mut generation.coding_temperature,
                    g.coding_temperature,
                    "coding_temperature",
                    src,
                    attr,
                );
                apply(
                    &mut generation.request_timeout_secs,
                    g.request_timeout_secs,
                    "request_timeout_secs",
                    src,
                    attr,
                );
            }

            if let Some(r) = file.retrieval {
                apply(&mut retrieval.enabled, r.enabled, "retrieval_enabled", src, attr);
                apply(
                    &mut retrieval.endpoint,
                    r.endpoint.map(Some),
                    "retrieval_endpoint",
                    src,
                    attr,
                );
                apply(&mut retrieval.api_key_env, r.api_key_env, "retrieval_api_key_env", src, attr);
                apply(&mut retrieval.collection, r.collection, "retrieval_collection", src, attr);
                apply(&mut retrieval.top_k, r.top_k, "retrieval_top_k", src, attr);
                apply(&mut retrieval.timeout_secs, r.timeout_secs, "retrieval_timeout_secs", src, attr);
            }

            if let Some(p) = file.pipeline {
                apply(&mut pipeline.flow, p.flow, "flow", src, attr);
                apply(
                    &mut pipeline.refinement_min_code_len,
                    p.refinement_min_code_len,
                    "refinement_min_code_len",
                    src,
                    attr,
                );
            }

            if let Some(l) = file.llm {
                apply(&mut llm.provider, l.provider, "llm_provider", src, attr);
                apply(&mut llm.api_key_env, l.api_key_env, "llm_api_key_env", src, attr);
                apply(&mut llm.base_url, l.base_url, "llm_base_url", src, attr);
                apply(&mut llm.budget, l.budget.map(Some), "llm_budget", src, attr);
            }

            if let Some(a) = file.artifacts {
                apply(
                    &mut artifacts.log_path,
                    a.log_path.map(Some),
                    "artifacts_log_path",
                    src,
                    attr,
                );
            }

            tracing::debug!(path = %path.display(), "Loaded configuration file");
        }

        // CLI overrides everything
        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        apply(&mut generation.model, cli_args.model.clone(), "model", cli, attr);
        apply(
            &mut generation.worker_model,
            cli_args.worker_model.clone(),
            "worker_model",
            cli,
            attr,
        );
        apply(&mut pipeline.flow, cli_args.flow.clone(), "flow", cli, attr);
        apply(&mut llm.provider, cli_args.llm_provider.clone(), "llm_provider", cli, attr);
        apply(
            &mut retrieval.enabled,
            cli_args.retrieval_enabled,
            "retrieval_enabled",
            cli,
            attr,
        );
        apply(
            &mut retrieval.endpoint,
            cli_args.retrieval_endpoint.clone().map(Some),
            "retrieval_endpoint",
            cli,
            attr,
        );
        apply(
            &mut artifacts.log_path,
            cli_args.artifacts_log.clone().map(Some),
            "artifacts_log_path",
            cli,
            attr,
        );

        let config = Self {
            generation,
            retrieval,
            pipeline,
            llm,
            artifacts,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Locate a config file without an explicit path.
    ///
    /// `$FORGE_HOME/config.toml` wins when it exists. Otherwise walks up from
    /// `start_dir` looking for `.forge/config.toml`, stopping at repository root
    /// markers (.git, .hg, .svn) or the filesystem root.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the signature stable for
    /// discovery sources that can fail.
    pub fn discover_config_file_from(
        start_dir: &Path,
        forge_home: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        if let Some(home) = forge_home {
            let candidate = home.join("config.toml");
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }

        let mut current_dir = start_dir.to_path_buf();
        loop {
            let config_path = current_dir.join(".forge").join("config.toml");
            if config_path.is_file() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            forge_utils::error::ConfigError::InvalidFile(format!("{}: {e}", path.display()))
        })?;
        Ok(config)
    }
}
