//! Model gateway for forge
//!
//! Every phase executor talks to the model through the [`LlmBackend`] trait,
//! which offers a single-shot and a streaming completion. Providers:
//!
//! - `gemini`: HTTP backend for the Generative Language API
//! - `scripted`: deterministic canned responses (tests, offline demo)
//!
//! Either can be wrapped in a [`BudgetedBackend`] call limit.

mod budgeted_backend;
mod gemini_backend;
mod scripted_backend;
mod transport;
mod types;

pub use budgeted_backend::{BUDGET_ENV_VAR, BudgetedBackend};
pub use forge_utils::error::LlmError;
pub use scripted_backend::{
    RecordedCall, ScriptGate, ScriptedBackend, ScriptedResponse, demo_backend,
};
pub use types::{
    ContentPart, FieldKind, InlineImage, LlmBackend, LlmInvocation, LlmResult, ResponseSchema,
    SamplingConfig, SchemaField, TextDelta, TextStream,
};

use forge_config::{Config, LlmProvider};
use std::sync::Arc;
use tracing::info;

use gemini_backend::GeminiBackend;

/// Create a backend from configuration.
///
/// The `scripted` provider yields [`demo_backend`]. A budget from
/// `[llm] budget` or `FORGE_LLM_BUDGET` wraps the result in a
/// [`BudgetedBackend`].
///
/// # Errors
///
/// Returns `LlmError::Unsupported` for an unknown provider and
/// `LlmError::Misconfiguration` when provider settings are incomplete.
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let provider = config
        .llm_provider()
        .map_err(|e| LlmError::Unsupported(e.to_string()))?;

    let backend: Box<dyn LlmBackend> = match provider {
        LlmProvider::Gemini => Box::new(GeminiBackend::new_from_config(config)?),
        LlmProvider::Scripted => Box::new(demo_backend()),
    };

    info!(provider = provider.as_str(), "Model gateway ready");

    Ok(match BudgetedBackend::resolve_limit(config.llm.budget) {
        Some(limit) => Arc::new(BudgetedBackend::new(backend, limit)),
        None => Arc::from(backend),
    })
}
