use forge_utils::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values.
    ///
    /// Collects every problem instead of stopping at the first one so that a
    /// user fixing their file sees the full list at once.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a single problem, or
    /// `ConfigError::ValidationFailed` listing all of them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<(String, String)> = Vec::new();

        for (key, value) in [
            ("planning_temperature", self.generation.planning_temperature),
            ("coding_temperature", self.generation.coding_temperature),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push((key.to_string(), format!("{value} is outside [0.0, 1.0]")));
            }
        }

        if self.generation.model.trim().is_empty() {
            errors.push(("model".to_string(), "must not be empty".to_string()));
        }
        if self.generation.worker_model.trim().is_empty() {
            errors.push(("worker_model".to_string(), "must not be empty".to_string()));
        }
        if self.generation.request_timeout_secs == 0 {
            errors.push((
                "request_timeout_secs".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            errors.push(("retrieval.top_k".to_string(), "must be greater than 0".to_string()));
        }
        if self.retrieval.timeout_secs == 0 {
            errors.push((
                "retrieval.timeout_secs".to_string(),
                "must be greater than 0".to_string(),
            ));
        }
        if self.retrieval.enabled
            && let Some(endpoint) = &self.retrieval.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            errors.push((
                "retrieval.endpoint".to_string(),
                format!("'{endpoint}' is not an http(s) URL"),
            ));
        }

        if let Err(e) = self.pipeline_flow() {
            errors.push(("pipeline.flow".to_string(), e.to_string()));
        }
        if let Err(e) = self.llm_provider() {
            errors.push(("llm.provider".to_string(), e.to_string()));
        }
        if self.llm.budget == Some(0) {
            errors.push(("llm.budget".to_string(), "must be greater than 0".to_string()));
        }

        match errors.len() {
            0 => Ok(()),
            1 => {
                let (key, value) = errors.remove(0);
                Err(ConfigError::InvalidValue { key, value })
            }
            n => Err(ConfigError::ValidationFailed {
                errors: errors
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect(),
                error_count: n,
            }),
        }
    }
}
