use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forge_artifacts::Artifact;
use forge_phase_api::{
    EpochCounter, GenerationToken, PipelinePhase, PlanKind, StepProgress,
};
use forge_utils::error::PhaseError;
use forge_utils::types::{DocumentId, Sender};

use crate::events::ChatMessage;

pub(crate) const WELCOME_MESSAGE: &str =
    "Welcome to KPC Forge. Describe the interface you want and I will plan and build it.";

/// Read-only view of one document for UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSnapshot {
    pub document_id: DocumentId,
    pub name: String,
    pub phase: PipelinePhase,
    /// Current view. While streaming, `code` is the partial output and
    /// `version` is the last committed or restored version.
    pub current_artifact: Artifact,
    /// Newest first.
    pub history: Vec<Artifact>,
    pub current_plan: Option<PlanKind>,
    pub step: Option<StepProgress>,
}

/// Listing entry for [`Orchestrator::list_documents`](crate::Orchestrator::list_documents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    pub name: String,
    pub phase: PipelinePhase,
    pub version: u64,
}

/// Mutable per-document state. Only ever touched with the slot lock held.
#[derive(Debug)]
pub(crate) struct DocumentState {
    pub name: String,
    pub phase: PipelinePhase,
    pub view: Artifact,
    pub plan: Option<PlanKind>,
    pub step: Option<StepProgress>,
    pub messages: Vec<ChatMessage>,
    /// Epoch invalidated by the last explicit cancel.
    pub cancelled_epoch: Option<u64>,
}

impl DocumentState {
    pub fn new(name: String, view: Artifact) -> Self {
        let phase = if view.version == 0 {
            PipelinePhase::Idle
        } else {
            PipelinePhase::Ready
        };
        Self {
            name,
            phase,
            view,
            plan: None,
            step: None,
            messages: Vec::new(),
            cancelled_epoch: None,
        }
    }

    /// Append a message, assigning the next id. Returns a copy for publishing.
    pub fn push_message(&mut self, mut message: ChatMessage) -> ChatMessage {
        message.id = self.messages.last().map_or(1, |m| m.id + 1);
        self.messages.push(message.clone());
        message
    }

    pub fn system_message(&mut self, text: impl Into<String>) -> ChatMessage {
        self.push_message(ChatMessage::new(0, Sender::System, text))
    }
}

/// Registry entry: the epoch counter and the state it guards.
#[derive(Debug)]
pub(crate) struct DocumentSlot {
    pub id: DocumentId,
    pub epochs: Arc<EpochCounter>,
    state: Mutex<DocumentState>,
}

impl DocumentSlot {
    pub fn new(id: DocumentId, state: DocumentState) -> Self {
        Self {
            id,
            epochs: EpochCounter::new(),
            state: Mutex::new(state),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the state only if `token` is still current.
    ///
    /// The check and the mutation happen under one lock, and cancel/submit
    /// advance the epoch under the same lock, so a stale generation can never
    /// slip a write in after it has been superseded.
    pub fn update<R>(
        &self,
        token: &GenerationToken,
        phase: PipelinePhase,
        f: impl FnOnce(&mut DocumentState) -> R,
    ) -> Result<R, PhaseError> {
        let mut state = self.lock();
        token.ensure_current(phase)?;
        Ok(f(&mut state))
    }
}
