//! Identifiers and enums shared across the forge workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString, VariantNames};

/// Identifier of one logical document (a "page") and its version history.
///
/// Document ids are opaque strings chosen by the caller. They are compared
/// byte-for-byte; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pipeline phase of a single document.
///
/// Exactly one phase is active per document. `Idle` and `Ready` are the
/// resting states; every other phase means a generation is in flight.
///
/// # Serialization
///
/// `PipelinePhase` serializes to its lowercase name (e.g. `"architecting"`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelinePhase {
    /// No build exists beyond the seed artifact, or the last attempt failed.
    #[default]
    Idle,
    /// Flat plan is being produced (initial or refinement variant).
    Planning,
    /// Hierarchical component plan is being produced.
    Architecting,
    /// Component workers are running concurrently.
    Fabricating,
    /// Component outputs are being merged into one document.
    Assembling,
    /// Code is being generated directly from a flat plan.
    Coding,
    /// Existing code is being modified according to a flat plan.
    Refining,
    /// The last generation completed or was cancelled and settled.
    Ready,
}

impl PipelinePhase {
    /// Canonical lowercase name, used as the phase tag on model invocations.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Architecting => "architecting",
            Self::Fabricating => "fabricating",
            Self::Assembling => "assembling",
            Self::Coding => "coding",
            Self::Refining => "refining",
            Self::Ready => "ready",
        }
    }

    /// Whether this is a resting state (`Idle` or `Ready`).
    #[must_use]
    pub const fn is_resting(&self) -> bool {
        matches!(self, Self::Idle | Self::Ready)
    }
}

/// Source of a configuration value (for status display and debugging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Cli,
    Config,
    Programmatic,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Config => write!(f, "config"),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Author of a chat-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    System,
}

/// Pipeline role that produced an AI chat-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AgentType {
    Planner,
    Architect,
    Worker,
    Assembler,
    Coder,
    Refiner,
}
