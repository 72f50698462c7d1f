//! Chat-log entries and the event stream published to UI collaborators.

use chrono::{DateTime, Utc};
use serde::Serialize;

use forge_llm::InlineImage;
use forge_phase_api::{PlanKind, StepProgress};
use forge_utils::types::{AgentType, DocumentId, PipelinePhase, Sender};

/// One entry of a document's chat log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// 1-based, unique within the document.
    pub id: u64,
    pub sender: Sender,
    pub agent: Option<AgentType>,
    pub text: String,
    pub plan: Option<PlanKind>,
    pub image: Option<InlineImage>,
    /// Version this message corresponds to; used by restore-from-chat.
    pub related_version: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub(crate) fn new(id: u64, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            agent: None,
            text: text.into(),
            plan: None,
            image: None,
            related_version: None,
            created_at: Utc::now(),
        }
    }
}

/// How a call to [`submit`](crate::Orchestrator::submit) ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// A new version was committed and is now current.
    Committed { version: u64 },
    /// [`cancel`](crate::Orchestrator::cancel) stopped the generation.
    Cancelled,
    /// A newer request for the same document took over.
    Superseded,
    /// The generation failed; the document was reset to `idle`.
    Failed { message: String },
}

/// Notification for UI collaborators, in the order state changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ForgeEvent {
    DocumentCreated {
        document_id: DocumentId,
        name: String,
    },
    PhaseChanged {
        document_id: DocumentId,
        phase: PipelinePhase,
    },
    Message {
        document_id: DocumentId,
        message: ChatMessage,
    },
    /// In-progress code of the streaming phase; not a committed version.
    Snapshot {
        document_id: DocumentId,
        code: String,
        step: Option<StepProgress>,
    },
    Committed {
        document_id: DocumentId,
        version: u64,
    },
    Restored {
        document_id: DocumentId,
        version: u64,
    },
    Settled {
        document_id: DocumentId,
        outcome: GenerationOutcome,
    },
}

impl ForgeEvent {
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::DocumentCreated { document_id, .. }
            | Self::PhaseChanged { document_id, .. }
            | Self::Message { document_id, .. }
            | Self::Snapshot { document_id, .. }
            | Self::Committed { document_id, .. }
            | Self::Restored { document_id, .. }
            | Self::Settled { document_id, .. } => document_id,
        }
    }
}
