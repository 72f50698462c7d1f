//! Core types for the model gateway contract

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::LlmError;

/// Inline image attached to a request (base64 payload, never a URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// One ordered element of the request content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    InlineImage(InlineImage),
}

/// Type of a field in a structured-output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    StringArray,
    Object(Vec<SchemaField>),
    ObjectArray(Vec<SchemaField>),
}

/// A named field of a structured-output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

impl SchemaField {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Top-level JSON object shape requested from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub fields: Vec<SchemaField>,
}

impl ResponseSchema {
    #[must_use]
    pub fn object(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Names of the fields marked required, in declaration order.
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Sampling parameters for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// In `[0, 1]`.
    pub temperature: f32,
    /// When set, the provider is asked for JSON matching this schema.
    pub response_schema: Option<ResponseSchema>,
}

impl SamplingConfig {
    #[must_use]
    pub fn text(temperature: f32) -> Self {
        Self {
            temperature,
            response_schema: None,
        }
    }

    #[must_use]
    pub fn structured(temperature: f32, schema: ResponseSchema) -> Self {
        Self {
            temperature,
            response_schema: Some(schema),
        }
    }
}

/// Input to a model gateway invocation
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Document the invocation runs for
    pub document_id: String,
    /// Generation epoch of that document; call budgets are counted per generation
    pub generation: u64,
    /// Pipeline phase tag, e.g. `"architecting"` or `"fabricating"`
    pub phase: String,
    pub model: String,
    pub timeout: Duration,
    pub system_instruction: Option<String>,
    /// Ordered content; at most one image in practice
    pub parts: Vec<ContentPart>,
    pub sampling: SamplingConfig,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        document_id: impl Into<String>,
        phase: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            generation: 0,
            phase: phase.into(),
            model: model.into(),
            timeout,
            system_instruction: None,
            parts: Vec::new(),
            sampling,
        }
    }

    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.parts.push(ContentPart::InlineImage(image));
        self
    }

    /// All text parts joined with newlines.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineImage(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ContentPart::InlineImage(_)))
            .count()
    }
}

/// Result from a single-shot invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    /// Raw response text from the model
    pub raw_response: String,
    /// Provider name (e.g. "gemini", "scripted")
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// One increment of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    pub text: String,
}

impl TextDelta {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Stream of text deltas. Ends after the last delta; an `Err` item is terminal.
pub type TextStream = BoxStream<'static, Result<TextDelta, LlmError>>;

/// Trait for model gateway implementations
///
/// The orchestrator works with any provider through this trait. Dropping a
/// returned future or stream aborts the underlying request.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Single-shot completion
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for transport failures, provider errors (auth,
    /// quota, outages), timeouts and budget exhaustion.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;

    /// Streaming completion
    ///
    /// The default implementation performs a single-shot call and yields its
    /// whole text as one delta.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` if the stream cannot be opened. Failures after the
    /// stream has started arrive as an `Err` item.
    async fn invoke_streaming(&self, inv: LlmInvocation) -> Result<TextStream, LlmError> {
        let result = self.invoke(inv).await?;
        Ok(stream::once(async move { Ok(TextDelta::new(result.raw_response)) }).boxed())
    }

    /// Provider name for logging.
    fn provider(&self) -> &'static str;
}
