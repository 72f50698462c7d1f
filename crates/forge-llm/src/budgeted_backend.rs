//! Budgeted backend wrapper for model call limiting
//!
//! Wraps any `LlmBackend` and enforces a limit on the number of invocations
//! one generation of one document may make. A hierarchical build fans out one
//! call per component, so a runaway plan can otherwise burn through a
//! provider quota quickly. The count starts over when the document begins a
//! newer generation, so a long chat session is never locked out.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, TextStream};

/// Environment variable overriding the configured budget
pub const BUDGET_ENV_VAR: &str = "FORGE_LLM_BUDGET";

/// Calls made by the newest generation seen for one document.
#[derive(Debug, Clone, Copy)]
struct Window {
    generation: u64,
    used: u32,
}

/// A wrapper around an `LlmBackend` that enforces a budget limit on invocations.
///
/// The budget tracks attempted calls, not successful requests: a failed call
/// still consumes its slot. Streaming and single-shot calls count the same.
/// Calls tagged with an older generation than the newest one seen for their
/// document share the newest generation's window.
pub struct BudgetedBackend {
    inner: Box<dyn LlmBackend>,
    windows: Mutex<HashMap<String, Window>>,
    total: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    #[must_use]
    pub fn new(inner: Box<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit = limit, "Creating BudgetedBackend");
        Self {
            inner,
            windows: Mutex::new(HashMap::new()),
            total: AtomicU32::new(0),
            limit,
        }
    }

    /// Resolve the limit with precedence env var > config file.
    ///
    /// Returns `None` when neither sets a limit, meaning the backend should
    /// not be wrapped at all.
    #[must_use]
    pub fn resolve_limit(config_budget: Option<u32>) -> Option<u32> {
        let from_env = std::env::var(BUDGET_ENV_VAR)
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(limit) = from_env {
            debug!(limit = limit, "Using budget limit from {}", BUDGET_ENV_VAR);
            return Some(limit);
        }
        if let Some(limit) = config_budget {
            debug!(limit = limit, "Using budget limit from config file");
        }
        config_budget
    }

    /// Calls attempted over the backend's lifetime, across all generations.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Reserve one call slot in the invocation's generation window.
    fn reserve(&self, inv: &LlmInvocation) -> Result<u32, LlmError> {
        // Count before calling the inner backend so failures still count
        self.total.fetch_add(1, Ordering::SeqCst);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows
            .entry(inv.document_id.clone())
            .or_insert(Window {
                generation: inv.generation,
                used: 0,
            });
        if inv.generation > window.generation {
            *window = Window {
                generation: inv.generation,
                used: 0,
            };
        }
        window.used = window.used.saturating_add(1);
        if window.used > self.limit {
            warn!(
                limit = self.limit,
                attempted = window.used,
                document_id = %inv.document_id,
                generation = window.generation,
                phase = %inv.phase,
                "Budget limit exceeded"
            );
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted: window.used,
            });
        }
        Ok(window.used)
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let call = self.reserve(&inv)?;
        debug!(call_count = call, limit = self.limit, "Budget check passed");

        let result = self.inner.invoke(inv).await;
        if let Err(e) = &result {
            debug!(
                call_count = call,
                error = %e,
                "Inner backend invocation failed (budget slot still consumed)"
            );
        }
        result
    }

    async fn invoke_streaming(&self, inv: LlmInvocation) -> Result<TextStream, LlmError> {
        let call = self.reserve(&inv)?;
        debug!(call_count = call, limit = self.limit, "Budget check passed (streaming)");
        self.inner.invoke_streaming(inv).await
    }

    fn provider(&self) -> &'static str {
        self.inner.provider()
    }
}
