use tracing::{debug, warn};

use forge_llm::SamplingConfig;
use forge_phase_api::{
    AgentType, ComponentSpec, FabricatedComponent, Phase, PhaseContext, PipelinePhase,
};
use forge_utils::error::PhaseError;

use crate::clean::clean_code;
use crate::prompts;

/// Builds one component from its [`ComponentSpec`] on the worker model.
///
/// Only cancellation is returned as an error. Every other failure becomes a
/// [`FabricatedComponent::failure`] placeholder so the fan-out always yields
/// one output per spec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricateExecutor;

impl FabricateExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` when the generation token goes stale.
    pub async fn execute(
        &self,
        ctx: &PhaseContext,
        spec: &ComponentSpec,
        global_state: &str,
    ) -> Result<FabricatedComponent, PhaseError> {
        match self.try_execute(ctx, spec, global_state).await {
            Ok(component) => Ok(component),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(
                    document_id = %ctx.document_id,
                    component = %spec.name,
                    error = %e,
                    "Component fabrication failed"
                );
                Ok(FabricatedComponent::failure(&spec.name, &e.to_string()))
            }
        }
    }

    async fn try_execute(
        &self,
        ctx: &PhaseContext,
        spec: &ComponentSpec,
        global_state: &str,
    ) -> Result<FabricatedComponent, PhaseError> {
        let phase = self.id();
        let query = format!("{} {}", spec.name, spec.description);
        let context = ctx.retrieve(phase, &query).await?;

        let invocation = ctx
            .invocation(
                phase,
                &ctx.settings.worker_model,
                SamplingConfig::text(ctx.settings.coding_temperature),
            )
            .with_system_instruction(self.system_instruction())
            .with_text(prompts::worker_prompt(spec, global_state, &context));

        let raw = ctx.complete(phase, invocation).await?;
        let code = clean_code(&raw);
        if code.is_empty() {
            return Err(PhaseError::EmptyResponse {
                phase: phase.as_str().to_string(),
            });
        }
        debug!(component = %spec.name, bytes = code.len(), "Component fabricated");
        Ok(FabricatedComponent::success(&spec.name, code))
    }
}

impl Phase for FabricateExecutor {
    fn id(&self) -> PipelinePhase {
        PipelinePhase::Fabricating
    }

    fn agent(&self) -> AgentType {
        AgentType::Worker
    }

    fn system_instruction(&self) -> String {
        prompts::WORKER_SYSTEM_INSTRUCTION.to_string()
    }
}
