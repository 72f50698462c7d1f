use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder markup of every document's seed artifact (version 0).
pub const INITIAL_CODE: &str = r#"<!-- KPC Forge environment -->
<!-- Preloaded: Vue 3, Tailwind CSS, @king-design/vue -->
<div class="flex flex-col items-center justify-center h-screen text-gray-500 space-y-2">
  <p>Environment ready.</p>
  <p class="text-xs opacity-75">Describe a page in the chat to start building.</p>
</div>"#;

pub const SEED_COMMIT_MESSAGE: &str = "Initial environment";

/// One immutable version of a document's code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub code: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub commit_message: String,
}

impl Artifact {
    #[must_use]
    pub fn new(code: impl Into<String>, version: u64, commit_message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            version,
            created_at: Utc::now(),
            commit_message: commit_message.into(),
        }
    }

    /// Version 0 with the placeholder markup.
    #[must_use]
    pub fn seed() -> Self {
        Self::new(INITIAL_CODE, 0, SEED_COMMIT_MESSAGE)
    }

    /// BLAKE3 hex digest of `code`.
    #[must_use]
    pub fn content_hash(&self) -> String {
        blake3::hash(self.code.as_bytes()).to_hex().to_string()
    }
}
