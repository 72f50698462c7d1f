//! Versioned artifact history for forge documents
//!
//! Every document has an append-only history starting at a seed artifact
//! (version 0). Commits append, restores move the "current" pointer, and
//! nothing is ever pruned. An optional JSON-lines [`ArtifactLog`] makes the
//! history survive restarts.

mod artifact;
mod export;
mod log;
mod store;

pub use artifact::{Artifact, INITIAL_CODE, SEED_COMMIT_MESSAGE};
pub use export::export_artifact;
pub use log::{ArtifactLog, LogRecord};
pub use store::ArtifactStore;
