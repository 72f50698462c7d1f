use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use forge_utils::types::ConfigSource;

/// Model used for planning, architecture, assembly and refinement.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
/// Faster model tier used by component workers.
pub const DEFAULT_WORKER_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_PLANNING_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_CODING_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIEVAL_TOP_K: u32 = 5;
pub const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRIEVAL_COLLECTION: &str = "kpc_docs";
pub const DEFAULT_RETRIEVAL_API_KEY_ENV: &str = "FORGE_RETRIEVAL_API_KEY";
/// Minimum trimmed code length for an artifact to count as refinable.
pub const DEFAULT_REFINEMENT_MIN_CODE_LEN: usize = 100;
pub const DEFAULT_LLM_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Generation flow used when no per-request override is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineFlow {
    /// Refine substantial existing code in place, otherwise build hierarchically.
    #[default]
    Flat,
    /// Always run the architect/fabricate/assemble pipeline.
    Hierarchical,
}

impl PipelineFlow {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for PipelineFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model gateway implementation selected by `[llm] provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    Scripted,
}

impl LlmProvider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Scripted => "scripted",
        }
    }
}

/// `[generation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub worker_model: String,
    pub planning_temperature: f32,
    pub coding_temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            worker_model: DEFAULT_WORKER_MODEL.to_string(),
            planning_temperature: DEFAULT_PLANNING_TEMPERATURE,
            coding_temperature: DEFAULT_CODING_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// `[retrieval]` section.
///
/// The API key itself never lives in the file; `api_key_env` names the
/// environment variable that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub collection: String,
    pub top_k: u32,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key_env: DEFAULT_RETRIEVAL_API_KEY_ENV.to_string(),
            collection: DEFAULT_RETRIEVAL_COLLECTION.to_string(),
            top_k: DEFAULT_RETRIEVAL_TOP_K,
            timeout_secs: DEFAULT_RETRIEVAL_TIMEOUT_SECS,
        }
    }
}

impl RetrievalConfig {
    /// Whether a network lookup should be attempted at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled
            && self
                .endpoint
                .as_deref()
                .is_some_and(|endpoint| !endpoint.trim().is_empty())
    }

    /// Resolve the bearer token from the environment, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

/// `[pipeline]` section. `flow` stays a string so unknown values surface as a
/// validation error with the offending key rather than a TOML parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub flow: String,
    pub refinement_min_code_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flow: PipelineFlow::Flat.as_str().to_string(),
            refinement_min_code_len: DEFAULT_REFINEMENT_MIN_CODE_LEN,
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key_env: String,
    pub base_url: String,
    /// Maximum number of model calls per generation of one document. `None`
    /// means unlimited.
    pub budget: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini.as_str().to_string(),
            api_key_env: DEFAULT_LLM_API_KEY_ENV.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            budget: None,
        }
    }
}

/// `[artifacts]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Append-only JSON-lines history log. History is memory-only when unset.
    pub log_path: Option<Utf8PathBuf>,
}

/// Configuration for forge.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults.
///
/// # Discovery
///
/// Use [`Config::discover()`] for CLI-like behavior that:
/// - Honors an explicit `--config` path
/// - Respects the `FORGE_HOME` environment variable
/// - Searches for `.forge/config.toml` upward from the current directory
/// - Applies built-in defaults for unspecified values
///
/// # Source Attribution
///
/// Each configuration value tracks its source (`cli`, `config`, `programmatic`,
/// or `default`) for `forge config` output.
#[derive(Debug, Clone)]
pub struct Config {
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub artifacts: ArtifactsConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
}
