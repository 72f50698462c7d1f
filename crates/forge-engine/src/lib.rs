//! Generation engine for forge
//!
//! | Module | Role |
//! |--------|------|
//! | [`orchestrator`] | Document registry, branch selection, phase sequencing, cancellation |
//! | [`events`] | Chat log entries and the [`ForgeEvent`] stream |
//!
//! A caller creates documents, submits [`GenerationRequest`]s and watches
//! [`ForgeEvent`]s; committed output lands in the
//! [`ArtifactStore`](forge_artifacts::ArtifactStore).

pub mod events;
pub mod orchestrator;

pub use events::{ChatMessage, ForgeEvent, GenerationOutcome};
pub use forge_phase_api::{Branch, GenerationRequest};
pub use orchestrator::{DocumentSnapshot, DocumentSummary, Orchestrator, select_branch};
