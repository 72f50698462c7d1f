use serde_json::Value;
use tracing::info;

use forge_llm::{FieldKind, ResponseSchema, SamplingConfig, SchemaField};
use forge_phase_api::{
    AgentType, ArchitectPlan, GenerationRequest, Phase, PhaseContext, PipelinePhase,
};
use forge_utils::error::PhaseError;

use crate::clean::clean_code;
use crate::prompts;

/// Structured-output schema for [`ArchitectPlan`].
#[must_use]
pub fn architect_schema() -> ResponseSchema {
    let component = vec![
        SchemaField::required("name", FieldKind::String)
            .describe("Unique PascalCase component name"),
        SchemaField::required("description", FieldKind::String),
        SchemaField::required("props_contract", FieldKind::String)
            .describe("Exact props the component accepts"),
        SchemaField::required("emits_contract", FieldKind::String)
            .describe("Exact events the component emits"),
    ];
    ResponseSchema::object(vec![
        SchemaField::required("thought_process", FieldKind::String),
        SchemaField::required("global_state_definition", FieldKind::String)
            .describe("State owned by the page root"),
        SchemaField::required("components", FieldKind::ObjectArray(component)),
        SchemaField::required("main_logic_flow", FieldKind::String),
    ])
}

/// Produces the hierarchical [`ArchitectPlan`].
///
/// Unlike [`crate::PlanExecutor`] a structure the fan-out cannot use is a hard
/// error: the build has nothing to fabricate from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchitectExecutor;

impl ArchitectExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` for a stale token, `PhaseError::Llm` when
    /// the gateway fails, and `PhaseError::EmptyResponse` or
    /// `PhaseError::InvalidStructure` when the reply cannot be used.
    pub async fn execute(
        &self,
        ctx: &PhaseContext,
        request: &GenerationRequest,
    ) -> Result<ArchitectPlan, PhaseError> {
        let phase = self.id();
        let context = ctx.retrieve(phase, &request.text).await?;

        let mut invocation = ctx
            .invocation(
                phase,
                &ctx.settings.model,
                SamplingConfig::structured(ctx.settings.planning_temperature, architect_schema()),
            )
            .with_system_instruction(self.system_instruction())
            .with_text(prompts::architect_prompt(&request.text, &context));
        if let Some(image) = &request.image {
            invocation = invocation.with_image(image.clone());
        }

        let raw = ctx.complete(phase, invocation).await?;
        let plan = parse_architect_plan(&raw)?;
        info!(
            document_id = %ctx.document_id,
            components = plan.components.len(),
            "Architect plan ready"
        );
        Ok(plan)
    }
}

impl Phase for ArchitectExecutor {
    fn id(&self) -> PipelinePhase {
        PipelinePhase::Architecting
    }

    fn agent(&self) -> AgentType {
        AgentType::Architect
    }

    fn system_instruction(&self) -> String {
        prompts::ARCHITECT_SYSTEM_INSTRUCTION.to_string()
    }
}

fn invalid(reason: impl Into<String>) -> PhaseError {
    PhaseError::InvalidStructure {
        phase: PipelinePhase::Architecting.as_str().to_string(),
        reason: reason.into(),
    }
}

/// Parse model output into an [`ArchitectPlan`].
///
/// A missing or `null` `components` field becomes an empty list. Duplicate
/// component names are rejected because outputs are keyed by name.
pub(crate) fn parse_architect_plan(raw: &str) -> Result<ArchitectPlan, PhaseError> {
    let json = clean_code(raw);
    if json.is_empty() {
        return Err(PhaseError::EmptyResponse {
            phase: PipelinePhase::Architecting.as_str().to_string(),
        });
    }

    let mut value: Value = serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
    let Some(object) = value.as_object_mut() else {
        return Err(invalid("expected a JSON object"));
    };
    if object.get("components").is_none_or(Value::is_null) {
        object.insert("components".to_string(), Value::Array(Vec::new()));
    }

    let plan: ArchitectPlan = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
    if let Some(name) = plan.duplicate_component() {
        return Err(invalid(format!("component name '{name}' appears more than once")));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, failing};
    use forge_llm::{ScriptedBackend, ScriptedResponse};

    #[test]
    fn test_missing_components_become_empty() {
        let plan = parse_architect_plan(
            r#"{"thought_process":"t","global_state_definition":"g","main_logic_flow":"m"}"#,
        )
        .unwrap();
        assert!(plan.components.is_empty());
    }

    #[test]
    fn test_null_components_become_empty() {
        let plan = parse_architect_plan(
            r#"{"thought_process":"t","global_state_definition":"g","components":null,"main_logic_flow":"m"}"#,
        )
        .unwrap();
        assert!(plan.components.is_empty());
    }

    #[test]
    fn test_malformed_plan_is_hard_error() {
        let err = parse_architect_plan("{ not json").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidStructure { .. }));

        let err = parse_architect_plan("[1, 2]").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidStructure { .. }));
    }

    #[test]
    fn test_empty_reply_is_reported_as_empty() {
        assert!(matches!(
            parse_architect_plan("  "),
            Err(PhaseError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let raw = r#"{
            "thought_process": "t",
            "global_state_definition": "g",
            "components": [
                {"name": "Nav", "description": "", "props_contract": "", "emits_contract": ""},
                {"name": "Nav", "description": "", "props_contract": "", "emits_contract": ""}
            ],
            "main_logic_flow": "m"
        }"#;
        let err = parse_architect_plan(raw).unwrap_err();
        assert!(err.to_string().contains("Nav"));
    }

    #[tokio::test]
    async fn test_execute_uses_main_model_and_schema() {
        let backend = forge_llm::demo_backend();
        let (ctx, backend) = context(backend);
        let plan = ArchitectExecutor::new()
            .execute(&ctx, &GenerationRequest::new("region picker"))
            .await
            .unwrap();

        assert_eq!(plan.components.len(), 2);
        let call = &backend.calls()[0];
        assert_eq!(call.model, ctx.settings.model);
        assert!(call.structured);
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let (ctx, _) = context(failing("architecting"));
        let err = ArchitectExecutor::new()
            .execute(&ctx, &GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::Llm { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_reply_fails_execute() {
        let backend = ScriptedBackend::new()
            .on("architecting", ScriptedResponse::text("I would build a header"));
        let (ctx, _) = context(backend);
        let err = ArchitectExecutor::new()
            .execute(&ctx, &GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::InvalidStructure { .. }));
    }
}
