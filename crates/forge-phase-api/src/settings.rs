use std::time::Duration;

use forge_config::{Config, PipelineFlow, RetrievalConfig};
use forge_utils::error::ConfigError;

/// Resolved generation parameters shared by every executor of one orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model for planning, architecting and streaming phases.
    pub model: String,
    /// Cheaper tier used by component workers.
    pub worker_model: String,
    pub planning_temperature: f32,
    pub coding_temperature: f32,
    pub request_timeout: Duration,
    pub retrieval: RetrievalConfig,
    /// Minimum trimmed code length for the refinement branch.
    pub refinement_min_code_len: usize,
    pub flow: PipelineFlow,
}

impl GenerationSettings {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the configured flow is unknown.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            model: config.generation.model.clone(),
            worker_model: config.generation.worker_model.clone(),
            planning_temperature: config.generation.planning_temperature,
            coding_temperature: config.generation.coding_temperature,
            request_timeout: config.request_timeout(),
            retrieval: config.retrieval.clone(),
            refinement_min_code_len: config.pipeline.refinement_min_code_len,
            flow: config.pipeline_flow()?,
        })
    }

    /// Whether `code` at `version` is substantial enough to refine in place.
    #[must_use]
    pub fn is_substantial(&self, version: u64, code: &str) -> bool {
        version > 0 && code.trim().len() >= self.refinement_min_code_len
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let config = Config::programmatic();
        Self {
            model: config.generation.model.clone(),
            worker_model: config.generation.worker_model.clone(),
            planning_temperature: config.generation.planning_temperature,
            coding_temperature: config.generation.coding_temperature,
            request_timeout: config.request_timeout(),
            retrieval: config.retrieval,
            refinement_min_code_len: config.pipeline.refinement_min_code_len,
            flow: PipelineFlow::default(),
        }
    }
}
