use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use forge_llm::InlineImage;
use forge_utils::error::ConfigError;

/// Phase sequence a generation runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    /// `planning -> refining`: modify existing code in place.
    Refine,
    /// `architecting -> fabricating -> assembling`.
    Hierarchical,
    /// `planning -> coding`: single-pass build from a flat plan.
    Direct,
}

impl Branch {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::Hierarchical => "hierarchical",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refine" => Ok(Self::Refine),
            "hierarchical" => Ok(Self::Hierarchical),
            "direct" => Ok(Self::Direct),
            other => Err(ConfigError::InvalidValue {
                key: "branch".to_string(),
                value: format!("Unknown branch: {other}"),
            }),
        }
    }
}

/// One user message asking for a build or a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub text: String,
    pub image: Option<InlineImage>,
    /// Overrides the configured branch policy for this request only.
    pub branch: Option<Branch>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            branch: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branch = Some(branch);
        self
    }

    /// A request with neither text nor image has nothing to build from.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}
