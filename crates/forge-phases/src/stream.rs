use futures_util::StreamExt;
use tracing::debug;

use forge_llm::SamplingConfig;
use forge_phase_api::{
    AgentType, ArchitectPlan, CodeSnapshot, FabricatedComponent, Phase, PhaseContext,
    PipelinePhase, Plan, SnapshotSink,
};
use forge_utils::error::PhaseError;

use crate::clean::{clean_code, scan_steps};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Assemble,
    Code,
    Refine,
}

/// Streaming code phase: assembly, direct coding, or refinement.
///
/// Each received delta produces a [`CodeSnapshot`] holding the whole cleaned
/// document so far. The last snapshot equals the returned code.
#[derive(Debug, Clone)]
pub struct StreamExecutor {
    kind: StreamKind,
    prompt: String,
    steps: usize,
}

impl StreamExecutor {
    /// Merge fabricated components according to the architect plan.
    #[must_use]
    pub fn assemble(plan: &ArchitectPlan, components: &[FabricatedComponent]) -> Self {
        Self {
            kind: StreamKind::Assemble,
            prompt: prompts::assemble_prompt(plan, components),
            steps: components.len(),
        }
    }

    /// Generate a page directly from a flat plan.
    #[must_use]
    pub fn code(plan: &Plan) -> Self {
        Self {
            kind: StreamKind::Code,
            prompt: prompts::code_prompt(plan),
            steps: plan.implementation_steps.len(),
        }
    }

    /// Modify `current_code` according to `request` and the refinement plan.
    #[must_use]
    pub fn refine(plan: &Plan, current_code: &str, request: &str) -> Self {
        Self {
            kind: StreamKind::Refine,
            prompt: prompts::refine_prompt(current_code, request, plan),
            steps: plan.implementation_steps.len(),
        }
    }

    /// Number of steps progress is reported against.
    #[must_use]
    pub const fn step_count(&self) -> usize {
        self.steps
    }

    /// Stream the code, calling `sink` once per snapshot in emission order.
    ///
    /// Every wait on the stream is a cancellable suspension point; once the
    /// token goes stale no further snapshot is delivered.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` for a stale token, `PhaseError::Llm`
    /// when the stream cannot be opened, `PhaseError::StreamFailed` when it
    /// breaks midway, and `PhaseError::EmptyResponse` when it ends with no code.
    pub async fn execute(
        &self,
        ctx: &PhaseContext,
        sink: SnapshotSink<'_>,
    ) -> Result<String, PhaseError> {
        let phase = self.id();
        let invocation = ctx
            .invocation(
                phase,
                &ctx.settings.model,
                SamplingConfig::text(ctx.settings.coding_temperature),
            )
            .with_system_instruction(self.system_instruction())
            .with_text(self.prompt.clone());

        let mut stream = ctx
            .token
            .guard(phase, ctx.backend.invoke_streaming(invocation))
            .await?
            .map_err(|source| PhaseError::Llm {
                phase: phase.as_str().to_string(),
                source,
            })?;

        let mut raw = String::new();
        let mut sequence = 0;
        while let Some(item) = ctx.token.guard(phase, stream.next()).await? {
            let delta = item.map_err(|e| PhaseError::StreamFailed {
                phase: phase.as_str().to_string(),
                reason: e.to_string(),
            })?;
            raw.push_str(&delta.text);

            let code = clean_code(&raw);
            if code.is_empty() {
                continue;
            }
            let step = scan_steps(&code, self.steps);
            sink(CodeSnapshot {
                code,
                sequence,
                step,
            });
            sequence += 1;
        }

        let code = clean_code(&raw);
        if code.is_empty() {
            return Err(PhaseError::EmptyResponse {
                phase: phase.as_str().to_string(),
            });
        }
        debug!(
            document_id = %ctx.document_id,
            phase = %phase,
            snapshots = sequence,
            bytes = code.len(),
            "Stream complete"
        );
        Ok(code)
    }
}

impl Phase for StreamExecutor {
    fn id(&self) -> PipelinePhase {
        match self.kind {
            StreamKind::Assemble => PipelinePhase::Assembling,
            StreamKind::Code => PipelinePhase::Coding,
            StreamKind::Refine => PipelinePhase::Refining,
        }
    }

    fn agent(&self) -> AgentType {
        match self.kind {
            StreamKind::Assemble => AgentType::Assembler,
            StreamKind::Code => AgentType::Coder,
            StreamKind::Refine => AgentType::Refiner,
        }
    }

    fn system_instruction(&self) -> String {
        prompts::stream_instruction(match self.kind {
            StreamKind::Assemble => prompts::ASSEMBLER_SYSTEM_INSTRUCTION,
            StreamKind::Code => prompts::CODER_SYSTEM_INSTRUCTION,
            StreamKind::Refine => prompts::REFINER_SYSTEM_INSTRUCTION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use forge_llm::{LlmError, ScriptedBackend, ScriptedResponse};
    use forge_phase_api::{EpochCounter, StepProgress};

    fn plan(steps: usize) -> Plan {
        Plan {
            thought_process: String::new(),
            component_list: Vec::new(),
            layout_strategy: String::new(),
            implementation_steps: (1..=steps).map(|i| format!("step {i}")).collect(),
        }
    }

    #[tokio::test]
    async fn test_snapshots_are_cumulative_and_cleaned() {
        let backend = ScriptedBackend::new().on(
            "coding",
            ScriptedResponse::chunks([
                "```html\n<html>",
                "<!-- [KPC:STEP:1] --><body>",
                "<!-- [KPC:STEP:2] --></body></html>\n`",
                "``",
            ]),
        );
        let (ctx, _) = context(backend);

        let mut snapshots = Vec::new();
        let code = StreamExecutor::code(&plan(2))
            .execute(&ctx, &mut |s| snapshots.push(s))
            .await
            .unwrap();

        assert_eq!(snapshots.len(), 4);
        assert_eq!(snapshots[0].code, "<html>");
        assert_eq!(snapshots[0].step, None);
        assert_eq!(
            snapshots[1].step,
            Some(StepProgress { current: 1, total: 2 })
        );
        for (i, s) in snapshots.iter().enumerate() {
            assert_eq!(s.sequence, i);
            assert!(!s.code.contains('`'));
        }
        assert_eq!(snapshots.last().unwrap().code, code);
        assert!(code.ends_with("</html>"));
    }

    #[tokio::test]
    async fn test_broken_stream_is_stream_failure() {
        let backend = ScriptedBackend::new().on(
            "refining",
            ScriptedResponse::broken(
                ["<html>"],
                LlmError::Transport("connection reset".to_string()),
            ),
        );
        let (ctx, _) = context(backend);

        let mut count = 0;
        let err = StreamExecutor::refine(&plan(1), "<p/>", "bigger")
            .execute(&ctx, &mut |_| count += 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::StreamFailed { .. }));
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_response() {
        let backend =
            ScriptedBackend::new().on("assembling", ScriptedResponse::chunks(["```html\n"]));
        let (ctx, _) = context(backend);
        let plan = ArchitectPlan {
            thought_process: String::new(),
            global_state_definition: String::new(),
            components: Vec::new(),
            main_logic_flow: String::new(),
        };
        let err = StreamExecutor::assemble(&plan, &[])
            .execute(&ctx, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_stale_token_stops_snapshots() {
        let mut backend =
            ScriptedBackend::new().on("coding", ScriptedResponse::chunks(["<a>", "<b>", "<c>"]));
        let gate = backend.gate("coding");
        let (mut ctx, _) = context(backend);
        let counter = EpochCounter::new();
        ctx.token = counter.next_token();

        let executor = StreamExecutor::code(&plan(1));
        let mut snapshots = Vec::new();
        let mut collect = |s: CodeSnapshot| snapshots.push(s);
        let run = executor.execute(&ctx, &mut collect);

        let cancel = async {
            tokio::task::yield_now().await;
            counter.advance();
            gate.release(5);
        };
        let (result, ()) = tokio::join!(run, cancel);

        assert!(result.unwrap_err().is_cancelled());
        assert!(snapshots.len() <= 1);
    }

    #[test]
    fn test_phase_identity() {
        let p = plan(1);
        assert_eq!(StreamExecutor::code(&p).id(), PipelinePhase::Coding);
        assert_eq!(StreamExecutor::refine(&p, "", "").agent(), AgentType::Refiner);
        let arch = ArchitectPlan {
            thought_process: String::new(),
            global_state_definition: String::new(),
            components: Vec::new(),
            main_logic_flow: String::new(),
        };
        let assemble = StreamExecutor::assemble(&arch, &[]);
        assert_eq!(assemble.id(), PipelinePhase::Assembling);
        assert_eq!(assemble.step_count(), 0);
    }
}
