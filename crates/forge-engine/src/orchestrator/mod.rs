//! Generation orchestrator
//!
//! The [`Orchestrator`] owns the document registry and drives one generation
//! per document at a time through the phase sequence chosen by
//! [`select_branch`]. Every state change is published on a broadcast channel
//! as a [`ForgeEvent`].
//!
//! Ownership of a document's state is decided by the epoch counter in its
//! slot: [`submit`](Orchestrator::submit), [`cancel`](Orchestrator::cancel)
//! and [`restore`](Orchestrator::restore) advance the epoch while holding the
//! slot lock, and every write from a running generation re-checks its token
//! under that same lock.

mod branch;
mod document;
mod pipeline;

pub use branch::select_branch;
pub use document::{DocumentSnapshot, DocumentSummary};

use camino::Utf8Path;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{Instrument, info, warn};

use forge_artifacts::{Artifact, ArtifactStore, export_artifact};
use forge_config::Config;
use forge_llm::LlmBackend;
use forge_phase_api::{
    Branch, GenerationRequest, GenerationSettings, GenerationToken, PhaseContext, PipelinePhase,
};
use forge_retrieval::{ContextRetriever, HttpContextRetriever};
use forge_utils::error::{ForgeError, PhaseError, StoreError};
use forge_utils::logging::generation_span;
use forge_utils::types::{DocumentId, Sender};
use forge_utils::UserFriendlyError;

use self::document::{DocumentSlot, DocumentState, WELCOME_MESSAGE};
use self::pipeline::{Built, Generation};
use crate::events::{ChatMessage, ForgeEvent, GenerationOutcome};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 1024;

const COMMIT_SUMMARY_CHARS: usize = 60;

/// Drives generations for any number of documents.
///
/// Share it behind an `Arc`; every method takes `&self`. Generations for
/// different documents run independently.
pub struct Orchestrator {
    backend: Arc<dyn LlmBackend>,
    retriever: Arc<dyn ContextRetriever>,
    settings: Arc<GenerationSettings>,
    store: Arc<ArtifactStore>,
    documents: Mutex<HashMap<DocumentId, Arc<DocumentSlot>>>,
    events: broadcast::Sender<ForgeEvent>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.backend.provider())
            .field("flow", &self.settings.flow)
            .field("documents", &self.registry().len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator over `store`. Documents already in the store (for
    /// example replayed from a log) are registered under their recorded name,
    /// or their id when none was recorded.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        retriever: Arc<dyn ContextRetriever>,
        settings: GenerationSettings,
        store: ArtifactStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut documents = HashMap::new();
        for id in store.documents() {
            let Some(current) = store.current(&id) else {
                continue;
            };
            let name = store.name(&id).unwrap_or_else(|| id.to_string());
            let mut state = DocumentState::new(name, current);
            state.push_message(ChatMessage::new(0, Sender::Ai, WELCOME_MESSAGE));
            documents.insert(id.clone(), Arc::new(DocumentSlot::new(id, state)));
        }

        Self {
            backend,
            retriever,
            settings: Arc::new(settings),
            store: Arc::new(store),
            documents: Mutex::new(documents),
            events,
        }
    }

    /// Build the gateway, retriever and store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::Config` for invalid settings, `ForgeError::Llm`
    /// when the gateway cannot be constructed and `ForgeError::Store` when the
    /// artifact log cannot be replayed.
    pub fn from_config(config: &Config) -> Result<Self, ForgeError> {
        let settings = GenerationSettings::from_config(config)?;
        let backend = forge_llm::from_config(config)?;
        let store = match &config.artifacts.log_path {
            Some(path) => ArtifactStore::open(path)?,
            None => ArtifactStore::new(),
        };
        Ok(Self::new(
            backend,
            Arc::new(HttpContextRetriever::new()),
            settings,
            store,
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Receive every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ForgeEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn contains(&self, document: &DocumentId) -> bool {
        self.registry().contains_key(document)
    }

    /// Register a new document with its seed artifact (version 0).
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::DocumentExists` if the id is taken and
    /// `ForgeError::Store` if the seed cannot be logged.
    pub fn create_document(
        &self,
        id: impl Into<DocumentId>,
        name: impl Into<String>,
    ) -> Result<DocumentSummary, ForgeError> {
        let id = id.into();
        let name = name.into();
        let mut documents = self.registry();
        if documents.contains_key(&id) {
            return Err(ForgeError::DocumentExists { id: id.to_string() });
        }

        let seed = self.store.ensure_document(&id, &name)?;
        let mut state = DocumentState::new(name.clone(), seed);
        let welcome = state.push_message(ChatMessage::new(0, Sender::Ai, WELCOME_MESSAGE));
        let summary = DocumentSummary {
            document_id: id.clone(),
            name: name.clone(),
            phase: state.phase,
            version: state.view.version,
        };
        documents.insert(id.clone(), Arc::new(DocumentSlot::new(id.clone(), state)));
        drop(documents);

        info!(document_id = %id, "Document created");
        self.emit(ForgeEvent::DocumentCreated {
            document_id: id.clone(),
            name,
        });
        self.emit(ForgeEvent::Message {
            document_id: id,
            message: welcome,
        });
        Ok(summary)
    }

    /// All documents in id order.
    #[must_use]
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        let mut slots: Vec<_> = self.registry().values().cloned().collect();
        slots.sort_by(|a, b| a.id.cmp(&b.id));
        slots
            .iter()
            .map(|slot| {
                let state = slot.lock();
                DocumentSummary {
                    document_id: slot.id.clone(),
                    name: state.name.clone(),
                    phase: state.phase,
                    version: state.view.version,
                }
            })
            .collect()
    }

    /// Consistent view of one document.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::DocumentNotFound` for an unknown id.
    pub fn snapshot(&self, document: &DocumentId) -> Result<DocumentSnapshot, ForgeError> {
        let slot = self.slot(document)?;
        let state = slot.lock();
        let history = self.store.list_history(document)?;
        Ok(DocumentSnapshot {
            document_id: slot.id.clone(),
            name: state.name.clone(),
            phase: state.phase,
            current_artifact: state.view.clone(),
            history,
            current_plan: state.plan.clone(),
            step: state.step,
        })
    }

    /// The chat log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::DocumentNotFound` for an unknown id.
    pub fn messages(&self, document: &DocumentId) -> Result<Vec<ChatMessage>, ForgeError> {
        Ok(self.slot(document)?.lock().messages.clone())
    }

    /// Run one generation for `document` and settle it.
    ///
    /// Any generation already in flight for the document is superseded: it
    /// stops at its next suspension point and none of its later output reaches
    /// the document. Phase failures do not surface as `Err`; they settle the
    /// document back to `idle` and return [`GenerationOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::EmptyRequest` when the request has neither text
    /// nor image and `ForgeError::DocumentNotFound` for an unknown id.
    pub async fn submit(
        &self,
        document: &DocumentId,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, ForgeError> {
        if request.is_empty() {
            return Err(ForgeError::EmptyRequest);
        }
        let slot = self.slot(document)?;

        let (token, base) = {
            let mut state = slot.lock();
            let base = self.committed(document)?;
            let token = slot.epochs.next_token();
            if !state.phase.is_resting() {
                info!(document_id = %document, epoch = token.epoch(), "Superseding generation in progress");
                state.view = base.clone();
                state.step = None;
                let notice = state
                    .system_message("A newer request replaced the generation that was in progress.");
                self.emit_message(document, notice);
            }

            let mut message = ChatMessage::new(0, Sender::User, request.text.clone());
            message.image.clone_from(&request.image);
            let message = state.push_message(message);
            self.emit_message(document, message);
            (token, base)
        };

        let substantial = self.settings.is_substantial(base.version, &base.code);
        let branch = select_branch(request.branch, self.settings.flow, substantial);
        let span = generation_span(document.as_str(), token.epoch(), branch.as_str());
        info!(parent: &span, base_version = base.version, "Generation started");

        let summary = commit_message(branch, &request.text);
        let generation = Generation {
            slot: Arc::clone(&slot),
            ctx: PhaseContext {
                document_id: document.clone(),
                backend: Arc::clone(&self.backend),
                retriever: Arc::clone(&self.retriever),
                settings: Arc::clone(&self.settings),
                token: token.clone(),
            },
            events: self.events.clone(),
            request,
        };
        let result = generation
            .run(branch, &base)
            .instrument(span.clone())
            .await;

        let outcome = span.in_scope(|| self.settle(&slot, &token, summary, result));
        Ok(outcome)
    }

    /// Stop the generation in flight for `document`, if any.
    ///
    /// The document returns to `ready` with the last committed or restored
    /// version as its view; history is untouched. Returns `false` when the
    /// document was already resting.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::DocumentNotFound` for an unknown id.
    pub fn cancel(&self, document: &DocumentId) -> Result<bool, ForgeError> {
        let slot = self.slot(document)?;
        let mut state = slot.lock();
        if state.phase.is_resting() {
            return Ok(false);
        }

        let current = self.committed(document)?;
        Self::invalidate(&slot, &mut state);
        state.view = current;
        state.step = None;
        state.phase = PipelinePhase::Ready;
        info!(document_id = %document, version = state.view.version, "Generation cancelled");

        self.emit_phase(document, state.phase);
        let version = state.view.version;
        let notice = state.system_message(format!(
            "Generation cancelled. Version {} remains current.",
            version
        ));
        self.emit_message(document, notice);
        Ok(true)
    }

    /// Make `version` current again without minting a new version.
    ///
    /// A generation in flight is cancelled first. Restoring an absent version
    /// leaves everything as it was apart from a notice in the chat log.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::Store(StoreError::VersionNotFound)` for an absent
    /// version and `ForgeError::DocumentNotFound` for an unknown id.
    pub fn restore(&self, document: &DocumentId, version: u64) -> Result<Artifact, ForgeError> {
        let slot = self.slot(document)?;
        let mut state = slot.lock();

        if self.store.get(document, version).is_none() {
            let latest = self.store.next_version(document)?.saturating_sub(1);
            let err = StoreError::VersionNotFound {
                document: document.to_string(),
                version,
                latest,
            };
            warn!(document_id = %document, version, latest, "Restore of unknown version ignored");
            let notice = state.system_message(err.user_message());
            self.emit_message(document, notice);
            return Err(err.into());
        }

        if !state.phase.is_resting() {
            Self::invalidate(&slot, &mut state);
        }
        let artifact = self.store.restore(document, version)?;
        state.view = artifact.clone();
        state.step = None;
        state.phase = if version == 0 {
            PipelinePhase::Idle
        } else {
            PipelinePhase::Ready
        };
        self.emit_phase(document, state.phase);

        let mut message = ChatMessage::new(0, Sender::System, format!("Restored version {version}."));
        message.related_version = Some(version);
        let message = state.push_message(message);
        self.emit_message(document, message);
        self.emit(ForgeEvent::Restored {
            document_id: document.clone(),
            version,
        });
        Ok(artifact)
    }

    /// Restore the version a chat message refers to.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::MessageNotFound` or
    /// `ForgeError::MessageHasNoVersion` when the message cannot be used, and
    /// anything [`restore`](Self::restore) returns.
    pub fn restore_from_message(
        &self,
        document: &DocumentId,
        message_id: u64,
    ) -> Result<Artifact, ForgeError> {
        let related = {
            let slot = self.slot(document)?;
            let state = slot.lock();
            let message = state
                .messages
                .iter()
                .find(|m| m.id == message_id)
                .ok_or_else(|| ForgeError::MessageNotFound {
                    id: document.to_string(),
                    message_id,
                })?;
            message.related_version
        };
        let version = related.ok_or_else(|| ForgeError::MessageHasNoVersion {
            id: document.to_string(),
            message_id,
        })?;
        self.restore(document, version)
    }

    /// Write the current committed or restored version to `path`. Partial
    /// streamed output is never exported.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::DocumentNotFound` for an unknown id and
    /// `ForgeError::Store(StoreError::Export)` when the file cannot be written.
    pub fn export(&self, document: &DocumentId, path: &Utf8Path) -> Result<Artifact, ForgeError> {
        self.slot(document)?;
        let artifact = self.committed(document)?;
        export_artifact(&artifact, path)?;
        Ok(artifact)
    }

    /// Apply the result of a finished generation, if it still owns the document.
    fn settle(
        &self,
        slot: &DocumentSlot,
        token: &GenerationToken,
        summary: String,
        result: Result<Built, PhaseError>,
    ) -> GenerationOutcome {
        let document = &slot.id;
        let mut state = slot.lock();

        let outcome = if !token.is_current() {
            if state.cancelled_epoch == Some(token.epoch()) {
                GenerationOutcome::Cancelled
            } else {
                GenerationOutcome::Superseded
            }
        } else {
            match result.map_err(ForgeError::from).and_then(|built| {
                let artifact = self.store.commit_next(document, built.code, summary)?;
                Ok((artifact, built.agent))
            }) {
                Ok((artifact, agent)) => {
                    let version = artifact.version;
                    state.view = artifact;
                    state.step = None;
                    state.phase = PipelinePhase::Ready;
                    self.emit_phase(document, state.phase);

                    let mut message =
                        ChatMessage::new(0, Sender::Ai, format!("Version {version} is ready."));
                    message.agent = Some(agent);
                    message.related_version = Some(version);
                    let message = state.push_message(message);
                    self.emit_message(document, message);
                    self.emit(ForgeEvent::Committed {
                        document_id: document.clone(),
                        version,
                    });
                    GenerationOutcome::Committed { version }
                }
                Err(err) => self.fail(document, &mut state, &err),
            }
        };

        info!(document_id = %document, epoch = token.epoch(), outcome = ?outcome, "Generation settled");
        self.emit(ForgeEvent::Settled {
            document_id: document.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    fn fail(
        &self,
        document: &DocumentId,
        state: &mut DocumentState,
        err: &ForgeError,
    ) -> GenerationOutcome {
        warn!(document_id = %document, error = %err, "Generation failed");
        let message = err.user_message();
        if let Some(current) = self.store.current(document) {
            state.view = current;
        }
        state.step = None;
        state.phase = PipelinePhase::Idle;
        self.emit_phase(document, state.phase);

        let notice = state.system_message(format!("Generation failed: {message}"));
        self.emit_message(document, notice);
        GenerationOutcome::Failed { message }
    }

    /// Retire the in-flight generation as cancelled. Caller holds the slot lock.
    fn invalidate(slot: &DocumentSlot, state: &mut DocumentState) {
        state.cancelled_epoch = Some(slot.epochs.current());
        slot.epochs.advance();
    }

    fn committed(&self, document: &DocumentId) -> Result<Artifact, StoreError> {
        self.store
            .current(document)
            .ok_or_else(|| StoreError::DocumentNotFound {
                document: document.to_string(),
            })
    }

    fn slot(&self, document: &DocumentId) -> Result<Arc<DocumentSlot>, ForgeError> {
        self.registry()
            .get(document)
            .cloned()
            .ok_or_else(|| ForgeError::DocumentNotFound {
                id: document.to_string(),
            })
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<DocumentId, Arc<DocumentSlot>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ForgeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_phase(&self, document: &DocumentId, phase: PipelinePhase) {
        self.emit(ForgeEvent::PhaseChanged {
            document_id: document.clone(),
            phase,
        });
    }

    fn emit_message(&self, document: &DocumentId, message: ChatMessage) {
        self.emit(ForgeEvent::Message {
            document_id: document.clone(),
            message,
        });
    }
}

/// Commit message: the branch and the start of the request text.
fn commit_message(branch: Branch, request: &str) -> String {
    let text = request.trim();
    if text.is_empty() {
        return format!("{branch}: image request");
    }
    let mut summary: String = text.chars().take(COMMIT_SUMMARY_CHARS).collect();
    if text.chars().count() > COMMIT_SUMMARY_CHARS {
        summary.push_str("...");
    }
    format!("{branch}: {summary}")
}
