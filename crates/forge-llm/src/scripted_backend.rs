//! Deterministic backend with canned responses
//!
//! Used by the test suite and by `provider = "scripted"` for offline demos.
//! Responses are keyed by phase tag and optionally by a substring of the
//! prompt text. Every call is recorded for later assertions.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, TextDelta, TextStream};

const PROVIDER: &str = "scripted";

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Whole text; streamed as a single delta.
    Text(String),
    /// Streamed as these deltas in order; single-shot calls get them joined.
    Chunks(Vec<String>),
    /// The call fails before producing anything.
    Fail(LlmError),
    /// Streams `chunks` and then fails. Single-shot calls fail immediately.
    Broken { chunks: Vec<String>, error: LlmError },
}

impl ScriptedResponse {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn fail(error: LlmError) -> Self {
        Self::Fail(error)
    }

    #[must_use]
    pub fn broken<I, S>(chunks: I, error: LlmError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Broken {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error,
        }
    }
}

/// What the backend saw for one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub document_id: String,
    pub phase: String,
    pub model: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: f32,
    pub structured: bool,
    pub image_count: usize,
    pub streaming: bool,
}

#[derive(Debug)]
struct Rule {
    phase: String,
    needle: Option<String>,
    responses: VecDeque<ScriptedResponse>,
}

/// Handle that releases calls held back by [`ScriptedBackend::gate`].
#[derive(Debug, Clone)]
pub struct ScriptGate {
    permits: Arc<Semaphore>,
}

impl ScriptGate {
    /// Let `n` more gated steps proceed.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

/// Scripted gateway.
///
/// Rules are checked in insertion order; the first rule whose phase equals the
/// invocation's phase tag and whose needle (if any) occurs in the prompt text
/// wins, so register needle rules before catch-all rules for the same phase.
/// A rule with several queued responses hands them out in order and then keeps
/// repeating the last one.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
    gates: HashMap<String, Arc<Semaphore>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for every call tagged `phase`.
    #[must_use]
    pub fn on(self, phase: &str, response: ScriptedResponse) -> Self {
        self.push_rule(phase, None, response);
        self
    }

    /// Queue a response for calls tagged `phase` whose prompt contains `needle`.
    #[must_use]
    pub fn on_matching(self, phase: &str, needle: &str, response: ScriptedResponse) -> Self {
        self.push_rule(phase, Some(needle.to_string()), response);
        self
    }

    /// Hold back calls tagged `phase` until the returned gate releases them.
    ///
    /// A gated single-shot call waits for one permit before returning. A gated
    /// stream yields its first delta freely and waits for one permit before
    /// each later delta.
    pub fn gate(&mut self, phase: &str) -> ScriptGate {
        let permits = Arc::new(Semaphore::new(0));
        self.gates.insert(phase.to_string(), Arc::clone(&permits));
        ScriptGate { permits }
    }

    /// Sleep between streamed deltas.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self, phase: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.phase == phase)
            .count()
    }

    fn push_rule(&self, phase: &str, needle: Option<String>, response: ScriptedResponse) {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.phase == phase && r.needle == needle)
        {
            rule.responses.push_back(response);
            return;
        }
        rules.push(Rule {
            phase: phase.to_string(),
            needle,
            responses: VecDeque::from([response]),
        });
    }

    fn record(&self, inv: &LlmInvocation, streaming: bool) -> String {
        let prompt = inv.prompt_text();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                document_id: inv.document_id.clone(),
                phase: inv.phase.clone(),
                model: inv.model.clone(),
                prompt: prompt.clone(),
                system_instruction: inv.system_instruction.clone(),
                temperature: inv.sampling.temperature,
                structured: inv.sampling.response_schema.is_some(),
                image_count: inv.image_count(),
                streaming,
            });
        prompt
    }

    fn next_response(&self, phase: &str, prompt: &str) -> Result<ScriptedResponse, LlmError> {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let rule = rules
            .iter_mut()
            .find(|r| {
                r.phase == phase
                    && r.needle
                        .as_deref()
                        .is_none_or(|needle| prompt.contains(needle))
            })
            .ok_or_else(|| {
                LlmError::Unsupported(format!("no scripted response for phase '{phase}'"))
            })?;

        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };
        response.ok_or_else(|| {
            LlmError::Unsupported(format!("scripted rule for phase '{phase}' is empty"))
        })
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let prompt = self.record(&inv, false);
        let response = self.next_response(&inv.phase, &prompt)?;
        debug!(provider = PROVIDER, phase = %inv.phase, "Scripted invoke");

        if let Some(gate) = self.gates.get(&inv.phase) {
            gate.acquire()
                .await
                .map_err(|e| LlmError::Transport(format!("scripted gate closed: {e}")))?
                .forget();
        }

        match response {
            ScriptedResponse::Text(text) => Ok(LlmResult::new(text, PROVIDER, inv.model)),
            ScriptedResponse::Chunks(chunks) => {
                Ok(LlmResult::new(chunks.concat(), PROVIDER, inv.model))
            }
            ScriptedResponse::Fail(error) | ScriptedResponse::Broken { error, .. } => Err(error),
        }
    }

    async fn invoke_streaming(&self, inv: LlmInvocation) -> Result<TextStream, LlmError> {
        let prompt = self.record(&inv, true);
        let response = self.next_response(&inv.phase, &prompt)?;
        debug!(provider = PROVIDER, phase = %inv.phase, "Scripted stream");

        let items: VecDeque<Result<TextDelta, LlmError>> = match response {
            ScriptedResponse::Text(text) => VecDeque::from([Ok(TextDelta::new(text))]),
            ScriptedResponse::Chunks(chunks) => {
                chunks.into_iter().map(|c| Ok(TextDelta::new(c))).collect()
            }
            ScriptedResponse::Fail(error) => return Err(error),
            ScriptedResponse::Broken { chunks, error } => chunks
                .into_iter()
                .map(|c| Ok(TextDelta::new(c)))
                .chain(std::iter::once(Err(error)))
                .collect(),
        };

        let gate = self.gates.get(&inv.phase).cloned();
        let delay = self.chunk_delay;

        let deltas = stream::unfold((items, 0usize), move |(mut items, emitted)| {
            let gate = gate.clone();
            async move {
                let item = items.pop_front()?;
                if emitted > 0 {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    if let Some(gate) = gate {
                        match gate.acquire_owned().await {
                            Ok(permit) => permit.forget(),
                            Err(e) => {
                                let error = LlmError::Transport(format!("scripted gate closed: {e}"));
                                return Some((Err(error), (VecDeque::new(), emitted + 1)));
                            }
                        }
                    }
                }
                Some((item, (items, emitted + 1)))
            }
        });

        Ok(deltas.boxed())
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}

/// Canned demo responses for offline use, modelled on a small card layout.
#[must_use]
pub fn demo_backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_chunk_delay(Duration::from_millis(60))
        .on("planning", ScriptedResponse::text(DEMO_PLAN))
        .on("architecting", ScriptedResponse::text(DEMO_ARCHITECT_PLAN))
        .on_matching(
            "fabricating",
            "RegionPicker",
            ScriptedResponse::text(DEMO_REGION_PICKER),
        )
        .on(
            "fabricating",
            ScriptedResponse::text(DEMO_ACTION_BAR),
        )
        .on("assembling", ScriptedResponse::chunks(DEMO_PAGE_CHUNKS))
        .on("coding", ScriptedResponse::chunks(DEMO_PAGE_CHUNKS))
        .on("refining", ScriptedResponse::chunks(DEMO_PAGE_CHUNKS))
}

const DEMO_PLAN: &str = r#"{
  "thought_process": "The user needs a card with a cascading region picker and two action buttons. k-card is the container, k-cascader the picker, k-button the actions.",
  "component_list": ["k-card", "k-cascader", "k-button"],
  "layout_strategy": "Centered flex column; space-y-4 for vertical rhythm inside the card.",
  "implementation_steps": [
    "Create the HTML shell with Vue 3 and Tailwind",
    "Define the mock component library",
    "Register the components on the app",
    "Bind data and handlers",
    "Render"
  ]
}"#;

const DEMO_ARCHITECT_PLAN: &str = r#"{
  "thought_process": "Split into a picker and an action bar sharing the selected region.",
  "global_state_definition": "const selectedArea = ref('')",
  "components": [
    {
      "name": "RegionPicker",
      "description": "Cascading region selector inside a bordered card",
      "props_contract": "modelValue: string",
      "emits_contract": "update:modelValue(value: string)"
    },
    {
      "name": "ActionBar",
      "description": "Submit and reset buttons",
      "props_contract": "disabled: boolean",
      "emits_contract": "submit(), reset()"
    }
  ],
  "main_logic_flow": "RegionPicker updates selectedArea; ActionBar submits or clears it."
}"#;

const DEMO_REGION_PICKER: &str = r#"<k-card title="Region" type="border">
  <k-cascader :data="areaData" v-model="selectedArea"></k-cascader>
</k-card>"#;

const DEMO_ACTION_BAR: &str = r#"<div class="flex gap-3 pt-4">
  <k-button type="primary" @click="$emit('submit')">Submit</k-button>
  <k-button type="secondary" @click="$emit('reset')">Reset</k-button>
</div>"#;

const DEMO_PAGE_CHUNKS: [&str; 5] = [
    "```html\n<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n",
    "  <script src=\"https://cdn.tailwindcss.com\"></script>\n  <script src=\"https://unpkg.com/vue@3/dist/vue.global.js\"></script>\n</head>\n",
    "<body class=\"flex items-center justify-center min-h-screen\">\n  <!-- [KPC:STEP:1] -->\n  <div id=\"app\" class=\"w-full max-w-lg p-4\">\n",
    "    <!-- [KPC:STEP:3] -->\n    <k-card title=\"Region\" type=\"border\">\n      <k-cascader :data=\"areaData\" v-model=\"selectedArea\"></k-cascader>\n    </k-card>\n",
    "  </div>\n  <!-- [KPC:STEP:5] -->\n  <script>Vue.createApp({ data: () => ({ selectedArea: '', areaData: [] }) }).mount('#app')</script>\n</body>\n</html>\n```",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SamplingConfig;

    fn inv(phase: &str, prompt: &str) -> LlmInvocation {
        LlmInvocation::new(
            "doc",
            phase,
            "test-model",
            Duration::from_secs(1),
            SamplingConfig::text(0.4),
        )
        .with_text(prompt)
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, String>> {
        stream
            .map(|item| item.map(|d| d.text).map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_needle_rule_wins_over_catch_all() {
        let backend = ScriptedBackend::new()
            .on_matching("fabricating", "Header", ScriptedResponse::text("<header/>"))
            .on("fabricating", ScriptedResponse::text("<div/>"));

        let header = backend.invoke(inv("fabricating", "build Header")).await.unwrap();
        let other = backend.invoke(inv("fabricating", "build Footer")).await.unwrap();
        assert_eq!(header.raw_response, "<header/>");
        assert_eq!(other.raw_response, "<div/>");
        assert_eq!(backend.call_count("fabricating"), 2);
    }

    #[tokio::test]
    async fn test_queued_responses_then_sticky_last() {
        let backend = ScriptedBackend::new()
            .on("planning", ScriptedResponse::text("one"))
            .on("planning", ScriptedResponse::text("two"));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(backend.invoke(inv("planning", "x")).await.unwrap().raw_response);
        }
        assert_eq!(seen, vec!["one", "two", "two"]);
    }

    #[tokio::test]
    async fn test_unscripted_phase_is_an_error() {
        let backend = ScriptedBackend::new();
        let err = backend.invoke(inv("architecting", "x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Unsupported(_)));
        assert_eq!(backend.calls().len(), 1, "failed calls are still recorded");
    }

    #[tokio::test]
    async fn test_broken_stream_yields_chunks_then_error() {
        let backend = ScriptedBackend::new().on(
            "assembling",
            ScriptedResponse::broken(["<a>", "<b>"], LlmError::Transport("reset".to_string())),
        );
        let items = collect(backend.invoke_streaming(inv("assembling", "x")).await.unwrap()).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref(), Ok("<a>"));
        assert_eq!(items[1].as_deref(), Ok("<b>"));
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_gate_holds_later_chunks() {
        let mut backend =
            ScriptedBackend::new().on("refining", ScriptedResponse::chunks(["1", "2", "3"]));
        let gate = backend.gate("refining");

        let mut stream = backend.invoke_streaming(inv("refining", "x")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().text, "1");

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "second chunk must wait for the gate");

        gate.release(2);
        let rest = collect(stream).await;
        assert_eq!(rest, vec![Ok("2".to_string()), Ok("3".to_string())]);
    }

    #[tokio::test]
    async fn test_records_call_details() {
        let backend = ScriptedBackend::new().on("planning", ScriptedResponse::text("{}"));
        let _ = backend
            .invoke(inv("planning", "make a form").with_system_instruction("sys"))
            .await;
        let calls = backend.calls();
        assert_eq!(calls[0].prompt, "make a form");
        assert_eq!(calls[0].system_instruction.as_deref(), Some("sys"));
        assert!(!calls[0].streaming);
        assert!((calls[0].temperature - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_demo_plan_is_valid_json() {
        let backend = demo_backend();
        for phase in ["planning", "architecting"] {
            let text = backend.invoke(inv(phase, "card")).await.unwrap().raw_response;
            assert!(
                serde_json::from_str::<serde_json::Value>(&text).is_ok(),
                "demo {phase} response must be JSON"
            );
        }
    }
}
