use tracing::debug;

use forge_llm::{FieldKind, ResponseSchema, SamplingConfig, SchemaField};
use forge_phase_api::{
    AgentType, GenerationRequest, Phase, PhaseContext, PipelinePhase, Plan,
};
use forge_utils::error::PhaseError;
use forge_utils::logging::log_degraded;

use crate::clean::clean_code;
use crate::prompts;

/// Structured-output schema for [`Plan`]: four required fields.
#[must_use]
pub fn plan_schema() -> ResponseSchema {
    ResponseSchema::object(vec![
        SchemaField::required("thought_process", FieldKind::String)
            .describe("Analysis of the request and its business scenario"),
        SchemaField::required("component_list", FieldKind::StringArray)
            .describe("KPC components the page needs"),
        SchemaField::required("layout_strategy", FieldKind::String)
            .describe("Page layout description"),
        SchemaField::required("implementation_steps", FieldKind::StringArray)
            .describe("Ordered implementation steps"),
    ])
}

#[derive(Debug, Clone)]
enum PlanVariant {
    Initial,
    Refinement { current_code: String },
}

/// Produces a flat [`Plan`].
///
/// Never fails except on cancellation: any gateway or parse failure degrades
/// to [`Plan::fallback`].
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    variant: PlanVariant,
}

impl PlanExecutor {
    /// Plan for a build from scratch.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            variant: PlanVariant::Initial,
        }
    }

    /// Plan for changing `current_code` in place.
    #[must_use]
    pub fn refinement(current_code: impl Into<String>) -> Self {
        Self {
            variant: PlanVariant::Refinement {
                current_code: current_code.into(),
            },
        }
    }

    #[must_use]
    pub const fn is_refinement(&self) -> bool {
        matches!(self.variant, PlanVariant::Refinement { .. })
    }

    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` when the generation token goes stale.
    pub async fn execute(
        &self,
        ctx: &PhaseContext,
        request: &GenerationRequest,
    ) -> Result<Plan, PhaseError> {
        match self.try_execute(ctx, request).await {
            Ok(plan) => Ok(plan),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                log_degraded(
                    ctx.document_id.as_str(),
                    self.id().as_str(),
                    &e.to_string(),
                );
                Ok(Plan::fallback())
            }
        }
    }

    async fn try_execute(
        &self,
        ctx: &PhaseContext,
        request: &GenerationRequest,
    ) -> Result<Plan, PhaseError> {
        let phase = self.id();
        let context = ctx.retrieve(phase, &request.text).await?;

        let prompt = match &self.variant {
            PlanVariant::Initial => prompts::plan_prompt(&request.text, &context),
            PlanVariant::Refinement { current_code } => {
                prompts::refinement_plan_prompt(&request.text, current_code, &context)
            }
        };

        let mut invocation = ctx
            .invocation(
                phase,
                &ctx.settings.model,
                SamplingConfig::structured(ctx.settings.planning_temperature, plan_schema()),
            )
            .with_system_instruction(self.system_instruction())
            .with_text(prompt);
        if let Some(image) = &request.image {
            invocation = invocation.with_image(image.clone());
        }

        let raw = ctx.complete(phase, invocation).await?;
        let plan = parse_plan(&raw)?;
        debug!(
            document_id = %ctx.document_id,
            steps = plan.implementation_steps.len(),
            components = plan.component_list.len(),
            "Plan parsed"
        );
        Ok(plan)
    }
}

impl Phase for PlanExecutor {
    fn id(&self) -> PipelinePhase {
        PipelinePhase::Planning
    }

    fn agent(&self) -> AgentType {
        AgentType::Planner
    }

    fn system_instruction(&self) -> String {
        match self.variant {
            PlanVariant::Initial => prompts::PLANNER_SYSTEM_INSTRUCTION.to_string(),
            PlanVariant::Refinement { .. } => {
                prompts::REFINEMENT_PLANNER_SYSTEM_INSTRUCTION.to_string()
            }
        }
    }
}

fn parse_plan(raw: &str) -> Result<Plan, PhaseError> {
    let phase = PipelinePhase::Planning.as_str().to_string();
    let json = clean_code(raw);
    if json.is_empty() {
        return Err(PhaseError::EmptyResponse { phase });
    }
    serde_json::from_str(&json).map_err(|e| PhaseError::InvalidStructure {
        phase,
        reason: e.to_string(),
    })
}
