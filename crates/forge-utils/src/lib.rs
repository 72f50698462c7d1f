//! Foundation utilities shared by every forge crate.
//!
//! - [`error`] - typed error hierarchy and user-facing error reporting
//! - [`logging`] - tracing subscriber setup and generation spans
//! - [`types`] - identifiers and enums shared across crate boundaries
//! - [`exit_codes`] - CLI exit code mapping

pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod types;

pub use error::{ForgeError, UserFriendlyError};
pub use types::{DocumentId, PipelinePhase};
