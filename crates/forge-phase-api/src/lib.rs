//! Shared contract between the orchestrator and phase executors
//!
//! This crate holds the types both sides need without introducing a
//! dependency cycle: plans, requests, snapshots, the generation token and
//! the [`PhaseContext`] every executor runs in.

mod output;
mod plan;
mod request;
mod settings;
mod token;

use std::sync::Arc;

use forge_llm::{LlmBackend, LlmInvocation, SamplingConfig};
use forge_retrieval::{ContextRetriever, RetrievedContext};
use forge_utils::error::PhaseError;
pub use forge_utils::types::{AgentType, DocumentId, PipelinePhase};

pub use output::{CodeSnapshot, FABRICATION_FAILED_MARKER, FabricatedComponent, StepProgress};
pub use plan::{ArchitectPlan, ComponentSpec, Plan, PlanKind};
pub use request::{Branch, GenerationRequest};
pub use settings::GenerationSettings;
pub use token::{EpochCounter, GenerationToken};

/// Callback invoked once per streamed snapshot, in emission order.
pub type SnapshotSink<'a> = &'a mut (dyn FnMut(CodeSnapshot) + Send);

/// A pipeline phase as seen by the orchestrator.
pub trait Phase {
    /// State the document is in while this phase runs.
    fn id(&self) -> PipelinePhase;

    /// Agent tag for chat entries produced by this phase.
    fn agent(&self) -> AgentType;

    /// System instruction sent with every invocation of this phase.
    fn system_instruction(&self) -> String;
}

/// Everything an executor needs for one generation of one document.
#[derive(Clone)]
pub struct PhaseContext {
    pub document_id: DocumentId,
    pub backend: Arc<dyn LlmBackend>,
    pub retriever: Arc<dyn ContextRetriever>,
    pub settings: Arc<GenerationSettings>,
    pub token: GenerationToken,
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("document_id", &self.document_id)
            .field("backend", &self.backend.provider())
            .field("epoch", &self.token.epoch())
            .finish_non_exhaustive()
    }
}

impl PhaseContext {
    /// Start an invocation tagged with this document and `phase`.
    #[must_use]
    pub fn invocation(
        &self,
        phase: PipelinePhase,
        model: &str,
        sampling: SamplingConfig,
    ) -> LlmInvocation {
        LlmInvocation::new(
            self.document_id.as_str(),
            phase.as_str(),
            model,
            self.settings.request_timeout,
            sampling,
        )
        .with_generation(self.token.epoch())
    }

    /// Resolve context for `query` as a cancellable suspension point.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` when the token goes stale; retrieval
    /// itself never fails.
    pub async fn retrieve(
        &self,
        phase: PipelinePhase,
        query: &str,
    ) -> Result<RetrievedContext, PhaseError> {
        self.token
            .guard(
                phase,
                self.retriever.retrieve(query, &self.settings.retrieval),
            )
            .await
    }

    /// Single-shot model call as a cancellable suspension point.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` for a stale token and `PhaseError::Llm`
    /// when the gateway fails.
    pub async fn complete(
        &self,
        phase: PipelinePhase,
        invocation: LlmInvocation,
    ) -> Result<String, PhaseError> {
        let result = self
            .token
            .guard(phase, self.backend.invoke(invocation))
            .await?
            .map_err(|source| PhaseError::Llm {
                phase: phase.as_str().to_string(),
                source,
            })?;
        Ok(result.raw_response)
    }
}
