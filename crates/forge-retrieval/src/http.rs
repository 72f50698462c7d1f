use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::response::{annotate, extract_snippets};
use crate::{ContextRetriever, ContextSource, RetrievalConfig, RetrievedContext};

/// Why a remote lookup was abandoned. Only ever logged and recorded in
/// [`ContextSource::Fallback`].
#[derive(Debug, Error)]
enum RetrievalFailure {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("response body is not JSON: {0}")]
    Body(String),
    #[error("response has no documents, results or text field")]
    Shape,
    #[error("endpoint returned no snippets")]
    Empty,
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    collection_name: &'a str,
    top_k: u32,
}

/// Retriever backed by a single HTTP POST to a vector-search endpoint.
#[derive(Debug, Clone)]
pub struct HttpContextRetriever {
    client: reqwest::Client,
    attempts: std::sync::Arc<AtomicU64>,
}

impl Default for HttpContextRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpContextRetriever {
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            attempts: std::sync::Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of outbound requests issued so far.
    #[must_use]
    pub fn network_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn query_endpoint(
        &self,
        endpoint: &str,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<String>, RetrievalFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut request = self
            .client
            .post(endpoint)
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&RetrievalRequest {
                query,
                collection_name: &config.collection,
                top_k: config.top_k,
            });
        if let Some(key) = config.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RetrievalFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalFailure::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RetrievalFailure::Body(e.without_url().to_string()))?;

        let snippets = extract_snippets(&body).ok_or(RetrievalFailure::Shape)?;
        if snippets.is_empty() {
            return Err(RetrievalFailure::Empty);
        }
        Ok(snippets)
    }
}

#[async_trait]
impl ContextRetriever for HttpContextRetriever {
    async fn retrieve(&self, query: &str, config: &RetrievalConfig) -> RetrievedContext {
        let endpoint = match config.endpoint.as_deref() {
            Some(endpoint) if config.is_active() => endpoint,
            _ => return RetrievedContext::fallback(ContextSource::Disabled),
        };

        match self.query_endpoint(endpoint, query, config).await {
            Ok(snippets) => {
                debug!(
                    snippets = snippets.len(),
                    collection = %config.collection,
                    "Retrieved remote context"
                );
                RetrievedContext {
                    text: annotate(&config.collection, &snippets),
                    source: ContextSource::Remote {
                        snippets: snippets.len(),
                    },
                }
            }
            Err(failure) => {
                warn!(reason = %failure, "Context retrieval failed, using static reference");
                RetrievedContext::fallback(ContextSource::Fallback {
                    reason: failure.to_string(),
                })
            }
        }
    }
}
