//! Context retrieval for forge prompts
//!
//! A [`ContextRetriever`] resolves a knowledge snippet for a query. Retrieval
//! never fails from the caller's point of view: when the external source is
//! disabled, unreachable, or returns something unusable, the static reference
//! document is returned instead.

mod http;
mod reference;
mod response;

use async_trait::async_trait;
use serde::Serialize;

pub use forge_config::RetrievalConfig;
pub use http::HttpContextRetriever;
pub use reference::STATIC_REFERENCE;

/// Where a context block came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextSource {
    /// Retrieval is disabled or has no endpoint.
    Disabled,
    /// The endpoint was queried but could not be used.
    Fallback { reason: String },
    /// The endpoint returned this many snippets.
    Remote { snippets: usize },
}

/// Context block handed to prompt builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedContext {
    pub text: String,
    pub source: ContextSource,
}

impl RetrievedContext {
    #[must_use]
    pub fn fallback(source: ContextSource) -> Self {
        Self {
            text: STATIC_REFERENCE.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self.source, ContextSource::Remote { .. })
    }
}

/// Resolves a domain knowledge snippet for a query.
///
/// Implementations make at most one outbound request per call and never
/// retry; the caller is blocked for no longer than one request timeout.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, config: &RetrievalConfig) -> RetrievedContext;
}

/// Retriever that always returns the static reference document.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRetriever;

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve(&self, _query: &str, _config: &RetrievalConfig) -> RetrievedContext {
        RetrievedContext::fallback(ContextSource::Disabled)
    }
}
