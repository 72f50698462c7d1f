use std::collections::BTreeMap;

use crate::ConfigSource;

use super::Config;

fn source_label(source: Option<&ConfigSource>) -> String {
    source.copied().unwrap_or(ConfigSource::Default).to_string()
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    ///
    /// Secrets are never included; only the names of their environment
    /// variables are.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source));
        };

        add("model", self.generation.model.clone());
        add("worker_model", self.generation.worker_model.clone());
        add(
            "planning_temperature",
            self.generation.planning_temperature.to_string(),
        );
        add(
            "coding_temperature",
            self.generation.coding_temperature.to_string(),
        );
        add(
            "request_timeout_secs",
            self.generation.request_timeout_secs.to_string(),
        );

        add("retrieval_enabled", self.retrieval.enabled.to_string());
        if let Some(endpoint) = &self.retrieval.endpoint {
            add("retrieval_endpoint", endpoint.clone());
        }
        add("retrieval_api_key_env", self.retrieval.api_key_env.clone());
        add("retrieval_collection", self.retrieval.collection.clone());
        add("retrieval_top_k", self.retrieval.top_k.to_string());
        add(
            "retrieval_timeout_secs",
            self.retrieval.timeout_secs.to_string(),
        );

        add("flow", self.pipeline.flow.clone());
        add(
            "refinement_min_code_len",
            self.pipeline.refinement_min_code_len.to_string(),
        );

        add("llm_provider", self.llm.provider.clone());
        add("llm_api_key_env", self.llm.api_key_env.clone());
        add("llm_base_url", self.llm.base_url.clone());
        if let Some(budget) = self.llm.budget {
            add("llm_budget", budget.to_string());
        }

        if let Some(path) = &self.artifacts.log_path {
            add("artifacts_log_path", path.to_string());
        }

        config
    }
}
