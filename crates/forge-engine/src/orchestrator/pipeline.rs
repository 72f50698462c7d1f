//! Phase sequences for the three branches.

use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::Instrument;

use forge_artifacts::Artifact;
use forge_phase_api::{
    AgentType, ArchitectPlan, Branch, CodeSnapshot, FabricatedComponent, GenerationRequest,
    Phase, PhaseContext, PipelinePhase, PlanKind,
};
use forge_phases::{ArchitectExecutor, FabricateExecutor, PlanExecutor, StreamExecutor};
use forge_utils::error::PhaseError;
use forge_utils::logging::{log_phase_complete, phase_span};
use forge_utils::types::Sender;

use super::document::DocumentSlot;
use crate::events::{ChatMessage, ForgeEvent};

/// Code produced by a finished phase sequence, ready to commit.
#[derive(Debug)]
pub(crate) struct Built {
    pub code: String,
    pub agent: AgentType,
}

/// One generation attempt for one document.
pub(crate) struct Generation {
    pub slot: Arc<DocumentSlot>,
    pub ctx: PhaseContext,
    pub events: broadcast::Sender<ForgeEvent>,
    pub request: GenerationRequest,
}

impl Generation {
    pub async fn run(&self, branch: Branch, base: &Artifact) -> Result<Built, PhaseError> {
        match branch {
            Branch::Refine => self.refine(base).await,
            Branch::Hierarchical => self.hierarchical().await,
            Branch::Direct => self.direct().await,
        }
    }

    async fn refine(&self, base: &Artifact) -> Result<Built, PhaseError> {
        let planner = PlanExecutor::refinement(base.code.clone());
        self.enter(&planner)?;
        let plan = self
            .timed(planner.id(), planner.execute(&self.ctx, &self.request))
            .await?;
        self.record_plan(&planner, PlanKind::Flat(plan.clone()), &plan.thought_process)?;

        let refiner = StreamExecutor::refine(&plan, &base.code, &self.request.text);
        self.stream(&refiner).await
    }

    async fn direct(&self) -> Result<Built, PhaseError> {
        let planner = PlanExecutor::initial();
        self.enter(&planner)?;
        let plan = self
            .timed(planner.id(), planner.execute(&self.ctx, &self.request))
            .await?;
        self.record_plan(&planner, PlanKind::Flat(plan.clone()), &plan.thought_process)?;

        let coder = StreamExecutor::code(&plan);
        self.stream(&coder).await
    }

    async fn hierarchical(&self) -> Result<Built, PhaseError> {
        let architect = ArchitectExecutor::new();
        self.enter(&architect)?;
        let plan = self
            .timed(architect.id(), architect.execute(&self.ctx, &self.request))
            .await?;
        self.record_plan(
            &architect,
            PlanKind::Hierarchical(plan.clone()),
            &plan.thought_process,
        )?;

        let worker = FabricateExecutor::new();
        self.enter(&worker)?;
        let components = self
            .timed(worker.id(), self.fabricate_all(&worker, &plan))
            .await?;
        self.say(&worker, fabrication_summary(&components))?;

        let assembler = StreamExecutor::assemble(&plan, &components);
        self.stream(&assembler).await
    }

    /// Fan out one worker per component and wait for all of them.
    ///
    /// Per-component failures arrive as placeholders, so the only error is
    /// cancellation, which every worker observes through the shared token.
    async fn fabricate_all(
        &self,
        worker: &FabricateExecutor,
        plan: &ArchitectPlan,
    ) -> Result<Vec<FabricatedComponent>, PhaseError> {
        let jobs = plan
            .components
            .iter()
            .map(|spec| worker.execute(&self.ctx, spec, &plan.global_state_definition));
        join_all(jobs).await.into_iter().collect()
    }

    async fn stream(&self, executor: &StreamExecutor) -> Result<Built, PhaseError> {
        self.enter(executor)?;
        let phase = executor.id();
        let slot = &self.slot;
        let token = &self.ctx.token;
        let events = &self.events;

        let mut apply = |snapshot: CodeSnapshot| {
            // A stale token means the document belongs to someone else now
            let _ = slot.update(token, phase, |state| {
                state.view.code.clone_from(&snapshot.code);
                state.step = snapshot.step;
                let _ = events.send(ForgeEvent::Snapshot {
                    document_id: slot.id.clone(),
                    code: snapshot.code,
                    step: snapshot.step,
                });
            });
        };

        let code = self
            .timed(phase, executor.execute(&self.ctx, &mut apply))
            .await?;
        Ok(Built {
            code,
            agent: executor.agent(),
        })
    }

    fn enter(&self, phase: &dyn Phase) -> Result<(), PhaseError> {
        let id = phase.id();
        self.slot.update(&self.ctx.token, id, |state| {
            state.phase = id;
            state.step = None;
            let _ = self.events.send(ForgeEvent::PhaseChanged {
                document_id: self.slot.id.clone(),
                phase: id,
            });
        })
    }

    fn record_plan(
        &self,
        phase: &dyn Phase,
        plan: PlanKind,
        thought_process: &str,
    ) -> Result<(), PhaseError> {
        let mut message = ChatMessage::new(0, Sender::Ai, thought_process);
        message.agent = Some(phase.agent());
        message.plan = Some(plan.clone());
        self.slot.update(&self.ctx.token, phase.id(), |state| {
            state.plan = Some(plan);
            let message = state.push_message(message);
            let _ = self.events.send(ForgeEvent::Message {
                document_id: self.slot.id.clone(),
                message,
            });
        })
    }

    fn say(&self, phase: &dyn Phase, text: String) -> Result<(), PhaseError> {
        let mut message = ChatMessage::new(0, Sender::Ai, text);
        message.agent = Some(phase.agent());
        self.slot.update(&self.ctx.token, phase.id(), |state| {
            let message = state.push_message(message);
            let _ = self.events.send(ForgeEvent::Message {
                document_id: self.slot.id.clone(),
                message,
            });
        })
    }

    async fn timed<T, F>(&self, phase: PipelinePhase, fut: F) -> Result<T, PhaseError>
    where
        F: Future<Output = Result<T, PhaseError>>,
    {
        let started = Instant::now();
        let document_id = self.ctx.document_id.as_str();
        let result = fut.instrument(phase_span(document_id, phase.as_str())).await;
        if result.is_ok() {
            log_phase_complete(document_id, phase.as_str(), started.elapsed().as_millis());
        }
        result
    }
}

fn fabrication_summary(components: &[FabricatedComponent]) -> String {
    if components.is_empty() {
        return "The plan has no components; assembling the page shell.".to_string();
    }
    let failed: Vec<&str> = components
        .iter()
        .filter(|c| c.failed)
        .map(|c| c.name.as_str())
        .collect();
    if failed.is_empty() {
        format!("Built {} components.", components.len())
    } else {
        format!(
            "Built {} components; {} could not be generated: {}.",
            components.len() - failed.len(),
            failed.len(),
            failed.join(", ")
        )
    }
}
