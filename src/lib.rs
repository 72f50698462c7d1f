//! forge - multi-phase UI generation with versioned artifacts
//!
//! forge turns a natural-language request (optionally with a reference image)
//! into a single-file UI page. A generation runs through one of three phase
//! sequences:
//!
//! - **hierarchical**: `architecting -> fabricating -> assembling`. An
//!   architect plan splits the page into components with explicit
//!   props/emits contracts, one worker per component runs concurrently, and
//!   the assembler streams the merged page.
//! - **refine**: `planning -> refining`. Existing code is modified in place.
//! - **direct**: `planning -> coding`. A flat plan followed by one streamed
//!   build.
//!
//! Every finished build is committed as a new version of its document;
//! [`Orchestrator::restore`] makes an earlier version current again without
//! touching history. A new request for a document supersedes the one in
//! flight, and [`Orchestrator::cancel`] stops it; neither ever leaves a
//! partial version behind.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Interactive session
//! forge chat
//!
//! # One-shot build, offline with canned responses
//! forge generate "A login card" --llm-provider scripted
//! ```
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge::{ArtifactStore, GenerationRequest, GenerationSettings, Orchestrator};
//! use forge::{DocumentId, StaticRetriever, demo_backend};
//!
//! # async fn example() -> Result<(), forge::ForgeError> {
//! let orchestrator = Orchestrator::new(
//!     Arc::new(demo_backend()),
//!     Arc::new(StaticRetriever),
//!     GenerationSettings::default(),
//!     ArtifactStore::new(),
//! );
//! orchestrator.create_document("home", "Home")?;
//! let outcome = orchestrator
//!     .submit(&DocumentId::from("home"), GenerationRequest::new("A region picker card"))
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod cli;

pub use forge_artifacts::{Artifact, ArtifactLog, ArtifactStore, LogRecord, export_artifact};
pub use forge_config::{CliArgs, Config, PipelineFlow, RetrievalConfig};
pub use forge_engine::{
    Branch, ChatMessage, DocumentSnapshot, DocumentSummary, ForgeEvent, GenerationOutcome,
    GenerationRequest, Orchestrator, select_branch,
};
pub use forge_llm::{
    BUDGET_ENV_VAR, InlineImage, LlmBackend, RecordedCall, ScriptGate, ScriptedBackend,
    ScriptedResponse, demo_backend,
};
pub use forge_phase_api::{
    AgentType, ArchitectPlan, CodeSnapshot, ComponentSpec, DocumentId, EpochCounter,
    FABRICATION_FAILED_MARKER, FabricatedComponent, GenerationSettings, GenerationToken,
    PipelinePhase, Plan, PlanKind, StepProgress,
};
pub use forge_phases::{STEP_MARKER_FORMAT, clean_code, scan_steps};
pub use forge_retrieval::{
    ContextRetriever, ContextSource, HttpContextRetriever, RetrievedContext, STATIC_REFERENCE,
    StaticRetriever,
};
pub use forge_utils::error::{
    ConfigError, ForgeError, LlmError, PhaseError, StoreError, UserFriendlyError,
};
pub use forge_utils::exit_codes::ExitCode;
pub use forge_utils::types::Sender;
