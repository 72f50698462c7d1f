//! Gemini HTTP backend
//!
//! Talks to the `generateContent` and `streamGenerateContent` (server-sent
//! events) endpoints of the Generative Language API.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::VecDeque;
use tracing::debug;

use crate::LlmError;
use crate::transport::{ByteStream, HttpTransport, redact};
use crate::types::{
    ContentPart, FieldKind, LlmBackend, LlmInvocation, LlmResult, ResponseSchema, SchemaField,
    TextDelta, TextStream,
};
use forge_config::Config;

const PROVIDER: &str = "gemini";

#[derive(Clone)]
pub(crate) struct GeminiBackend {
    transport: HttpTransport,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(api_key: String, base_url: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self::with_transport(api_key, base_url, HttpTransport::new()?))
    }

    pub(crate) fn with_transport(
        api_key: String,
        base_url: impl Into<String>,
        transport: HttpTransport,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment variable
    /// is unset or the HTTP client cannot be constructed
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = &config.llm.api_key_env;
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "Gemini API key not found in environment variable '{api_key_env}'. \
                     Set it or configure a different api_key_env in [llm]."
                ))
            })?;
        Self::new(api_key, config.llm.base_url.clone())
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    fn request(&self, url: String, body: &GenerateContentRequest) -> reqwest::RequestBuilder {
        self.transport
            .post(&url, &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        debug!(
            provider = PROVIDER,
            model = %inv.model,
            phase = %inv.phase,
            temperature = inv.sampling.temperature,
            structured = inv.sampling.response_schema.is_some(),
            "Invoking Gemini backend"
        );

        let body = build_request(&inv);
        let request = self.request(self.endpoint(&inv.model, "generateContent"), &body);
        let response = self.transport.send(request, inv.timeout).await?;

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::MalformedResponse(format!(
                "Failed to parse Gemini response: {}",
                redact(&e.to_string())
            ))
        })?;

        let text = parsed.text().ok_or_else(|| {
            LlmError::MalformedResponse(match parsed.block_reason() {
                Some(reason) => format!("Gemini returned no text (blocked: {reason})"),
                None => "Gemini response has no candidate text".to_string(),
            })
        })?;

        let mut result = LlmResult::new(text, PROVIDER, inv.model.clone());
        if let Some(usage) = parsed.usage_metadata {
            result = result.with_tokens(
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0),
            );
        }
        Ok(result)
    }

    async fn invoke_streaming(&self, inv: LlmInvocation) -> Result<TextStream, LlmError> {
        debug!(
            provider = PROVIDER,
            model = %inv.model,
            phase = %inv.phase,
            "Opening Gemini stream"
        );

        let body = build_request(&inv);
        let url = format!("{}?alt=sse", self.endpoint(&inv.model, "streamGenerateContent"));
        // inv.timeout bounds only the wait for headers; chunks fall under the idle timeout
        let body = self
            .transport
            .open_stream(self.request(url, &body), inv.timeout)
            .await?;

        let state = SseState {
            body,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let deltas = stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        for payload in state.decoder.push(&bytes) {
                            state.pending.extend(delta_from_payload(&payload));
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.push_back(Err(e));
                    }
                    None => {
                        state.finished = true;
                        if let Some(payload) = state.decoder.finish() {
                            state.pending.extend(delta_from_payload(&payload));
                        }
                    }
                }
            }
        });

        Ok(deltas.boxed())
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<TextDelta, LlmError>>,
    finished: bool,
}

/// Turn one SSE `data:` payload into zero or one delta.
fn delta_from_payload(payload: &str) -> Option<Result<TextDelta, LlmError>> {
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<GenerateContentResponse>(trimmed) {
        Ok(chunk) => chunk
            .text()
            .filter(|text| !text.is_empty())
            .map(|text| Ok(TextDelta::new(text))),
        Err(e) => Some(Err(LlmError::MalformedResponse(format!(
            "Unparseable Gemini stream chunk: {e}"
        )))),
    }
}

/// Incremental server-sent-events decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// the buffer is raw bytes and only complete events are decoded.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes; returns the `data` payload of every completed event.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(payload) = Self::data_of(&event[..end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let event = std::mem::take(&mut self.buffer);
        Self::data_of(&event)
    }

    fn data_of(event: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(event);
        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .collect();
        if data.is_empty() {
            None
        } else {
            Some(data.join("\n"))
        }
    }
}

fn build_request(inv: &LlmInvocation) -> GenerateContentRequest {
    let parts = inv
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::InlineImage(image) => json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }),
        })
        .collect();

    let (response_mime_type, response_schema) = match &inv.sampling.response_schema {
        Some(schema) => (
            Some("application/json".to_string()),
            Some(schema_to_json(schema)),
        ),
        None => (None, None),
    };

    GenerateContentRequest {
        system_instruction: inv
            .system_instruction
            .as_ref()
            .map(|text| json!({ "parts": [{ "text": text }] })),
        contents: vec![RequestContent {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: inv.sampling.temperature,
            response_mime_type,
            response_schema,
        },
    }
}

/// Map a response schema onto Gemini's OpenAPI-subset schema format.
pub(crate) fn schema_to_json(schema: &ResponseSchema) -> Value {
    object_schema(&schema.fields)
}

fn object_schema(fields: &[SchemaField]) -> Value {
    let mut properties = serde_json::Map::new();
    for field in fields {
        let mut value = field_schema(&field.kind);
        if let (Some(description), Some(obj)) = (&field.description, value.as_object_mut()) {
            obj.insert("description".to_string(), json!(description));
        }
        properties.insert(field.name.clone(), value);
    }
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();
    json!({ "type": "OBJECT", "properties": properties, "required": required })
}

fn field_schema(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::String => json!({ "type": "STRING" }),
        FieldKind::StringArray => json!({ "type": "ARRAY", "items": { "type": "STRING" } }),
        FieldKind::Object(fields) => object_schema(fields),
        FieldKind::ObjectArray(fields) => json!({ "type": "ARRAY", "items": object_schema(fields) }),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> Option<String> {
        let parts = self.candidates.first()?.content.as_ref()?.parts.as_ref()?;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InlineImage, SamplingConfig};
    use std::time::Duration;

    fn invocation() -> LlmInvocation {
        LlmInvocation::new(
            "doc",
            "architecting",
            "gemini-2.5-pro",
            Duration::from_secs(30),
            SamplingConfig::structured(
                0.3,
                ResponseSchema::object(vec![
                    SchemaField::required("thought_process", FieldKind::String),
                    SchemaField::optional(
                        "components",
                        FieldKind::ObjectArray(vec![SchemaField::required(
                            "name",
                            FieldKind::String,
                        )]),
                    )
                    .describe("component specs"),
                ]),
            ),
        )
        .with_system_instruction("be an architect")
        .with_text("build a form")
        .with_image(InlineImage {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        })
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(build_request(&invocation())).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be an architect");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "build a form");
        assert_eq!(
            body["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_schema_mapping_marks_required_and_nests_arrays() {
        let body = serde_json::to_value(build_request(&invocation())).unwrap();
        let schema = &body["generationConfig"]["responseSchema"];

        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"], json!(["thought_process"]));
        assert_eq!(schema["properties"]["components"]["type"], "ARRAY");
        assert_eq!(
            schema["properties"]["components"]["items"]["properties"]["name"]["type"],
            "STRING"
        );
        assert_eq!(
            schema["properties"]["components"]["description"],
            "component specs"
        );
    }

    #[test]
    fn test_plain_text_request_has_no_schema() {
        let inv = LlmInvocation::new(
            "doc",
            "refining",
            "m",
            Duration::from_secs(1),
            SamplingConfig::text(0.2),
        )
        .with_text("x");
        let body = serde_json::to_value(build_request(&inv)).unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let raw = r#"{
            "candidates": [{"content": {"parts": [{"text": "<div>"}, {"text": "</div>"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("<div></div>"));
        assert_eq!(parsed.usage_metadata.unwrap().prompt_token_count, Some(12));
    }

    #[test]
    fn test_blocked_response_reports_reason() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.text().is_none());
        assert_eq!(parsed.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn test_sse_decoder_handles_split_events() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let out = decoder.push(b"1}\r\n\r\ndata: second\n\n: comment\n\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "second".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_sse_decoder_flushes_unterminated_tail() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_sse_decoder_keeps_split_utf8_intact() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: 你好\n\n".as_bytes();
        // split inside the first multi-byte character
        assert!(decoder.push(&bytes[..7]).is_empty());
        assert_eq!(decoder.push(&bytes[7..]), vec!["你好".to_string()]);
    }

    #[test]
    fn test_delta_from_payload() {
        let ok = delta_from_payload(r#"{"candidates":[{"content":{"parts":[{"text":"<p>"}]}}]}"#);
        assert_eq!(ok.unwrap().unwrap().text, "<p>");
        assert!(delta_from_payload("[DONE]").is_none());
        assert!(matches!(
            delta_from_payload("not json"),
            Some(Err(LlmError::MalformedResponse(_)))
        ));
    }

    mod against_local_server {
        use super::super::*;
        use crate::transport::HttpTransport;
        use crate::types::SamplingConfig;
        use axum::body::{Body, Bytes};
        use axum::extract::State;
        use axum::http::{HeaderMap, StatusCode, Uri, header};
        use axum::response::{IntoResponse, Response};
        use axum::routing::post;
        use axum::{Json, Router};
        use futures_util::stream;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        enum Reply {
            Json(StatusCode, Value),
            /// SSE events sent `gap` apart; `stall` keeps the connection open afterwards
            Events {
                texts: Vec<&'static str>,
                gap: Duration,
                stall: bool,
            },
        }

        #[derive(Clone, Default)]
        struct Stub {
            replies: Arc<Mutex<VecDeque<Reply>>>,
            hits: Arc<AtomicUsize>,
            seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
        }

        fn chunk(text: &str) -> String {
            json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
        }

        async fn handle(State(stub): State<Stub>, uri: Uri, headers: HeaderMap) -> Response {
            stub.hits.fetch_add(1, Ordering::SeqCst);
            let key = headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            stub.seen.lock().unwrap().push((uri.to_string(), key));

            let reply = stub.replies.lock().unwrap().pop_front();
            match reply {
                None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                Some(Reply::Json(status, body)) => (status, Json(body)).into_response(),
                Some(Reply::Events { texts, gap, stall }) => {
                    let events = stream::iter(texts).then(move |text| async move {
                        tokio::time::sleep(gap).await;
                        Ok::<_, std::io::Error>(Bytes::from(format!("data: {}\n\n", chunk(text))))
                    });
                    let body = if stall {
                        Body::from_stream(events.chain(stream::pending()))
                    } else {
                        Body::from_stream(events)
                    };
                    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
                }
            }
        }

        async fn serve(replies: Vec<Reply>, idle: Duration) -> (GeminiBackend, Stub) {
            let stub = Stub::default();
            stub.replies.lock().unwrap().extend(replies);
            let app = Router::new()
                .route("/v1beta/models/{call}", post(handle))
                .with_state(stub.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let transport = HttpTransport::new()
                .unwrap()
                .with_stream_idle_timeout(idle)
                .with_retry_backoff(Duration::from_millis(5));
            let backend = GeminiBackend::with_transport(
                "test-key".to_string(),
                format!("http://{addr}/v1beta/"),
                transport,
            );
            (backend, stub)
        }

        fn call(timeout: Duration) -> LlmInvocation {
            LlmInvocation::new(
                "doc",
                "assembling",
                "gemini-2.5-pro",
                timeout,
                SamplingConfig::text(0.2),
            )
            .with_text("assemble the page")
        }

        fn api_error(code: u16, status: &str, message: &str) -> Value {
            json!({ "error": { "code": code, "message": message, "status": status } })
        }

        async fn drain(mut deltas: TextStream) -> Vec<Result<TextDelta, LlmError>> {
            let mut out = Vec::new();
            while let Some(item) = deltas.next().await {
                out.push(item);
            }
            out
        }

        #[tokio::test]
        async fn test_generate_content_sends_key_header_and_reads_usage() {
            let reply = json!({
                "candidates": [{ "content": { "parts": [{ "text": "<main></main>" }] } }],
                "usageMetadata": { "promptTokenCount": 40, "candidatesTokenCount": 9 }
            });
            let (backend, stub) =
                serve(vec![Reply::Json(StatusCode::OK, reply)], Duration::from_secs(5)).await;

            let result = backend.invoke(call(Duration::from_secs(5))).await.unwrap();
            assert_eq!(result.raw_response, "<main></main>");
            assert_eq!(result.tokens_input, Some(40));
            assert_eq!(result.tokens_output, Some(9));

            let seen = stub.seen.lock().unwrap().clone();
            assert_eq!(
                seen,
                vec![(
                    "/v1beta/models/gemini-2.5-pro:generateContent".to_string(),
                    Some("test-key".to_string())
                )]
            );
        }

        #[tokio::test]
        async fn test_single_shot_retries_a_server_error() {
            let ok = json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] });
            let (backend, stub) = serve(
                vec![
                    Reply::Json(
                        StatusCode::SERVICE_UNAVAILABLE,
                        api_error(503, "UNAVAILABLE", "The model is overloaded."),
                    ),
                    Reply::Json(StatusCode::OK, ok),
                ],
                Duration::from_secs(5),
            )
            .await;

            let result = backend.invoke(call(Duration::from_secs(5))).await.unwrap();
            assert_eq!(result.raw_response, "ok");
            assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_rejected_key_and_quota_fail_without_retry() {
            let (backend, stub) = serve(
                vec![
                    Reply::Json(
                        StatusCode::BAD_REQUEST,
                        api_error(400, "INVALID_ARGUMENT", "API key not valid. Please pass a valid API key."),
                    ),
                    Reply::Json(
                        StatusCode::TOO_MANY_REQUESTS,
                        api_error(429, "RESOURCE_EXHAUSTED", "Resource has been exhausted"),
                    ),
                ],
                Duration::from_secs(5),
            )
            .await;

            let err = backend.invoke(call(Duration::from_secs(5))).await.unwrap_err();
            assert!(matches!(err, LlmError::ProviderAuth(_)), "{err:?}");
            assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

            let err = backend.invoke(call(Duration::from_secs(5))).await.unwrap_err();
            assert!(matches!(err, LlmError::ProviderQuota(_)), "{err:?}");
            assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_stream_may_run_longer_than_the_call_timeout() {
            let (backend, stub) = serve(
                vec![Reply::Events {
                    texts: vec!["<div>", "<p>hi</p>", "</div>", "\n"],
                    gap: Duration::from_millis(120),
                    stall: false,
                }],
                Duration::from_secs(5),
            )
            .await;

            // headers arrive well inside 200ms; the body takes about 480ms
            let deltas = backend
                .invoke_streaming(call(Duration::from_millis(200)))
                .await
                .unwrap();
            let text: String = drain(deltas)
                .await
                .into_iter()
                .map(|delta| delta.unwrap().text)
                .collect();
            assert_eq!(text, "<div><p>hi</p></div>\n");

            let (path, key) = stub.seen.lock().unwrap()[0].clone();
            assert_eq!(
                path,
                "/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
            );
            assert_eq!(key.as_deref(), Some("test-key"));
        }

        #[tokio::test]
        async fn test_silent_stream_ends_with_idle_timeout() {
            let idle = Duration::from_millis(250);
            let (backend, _stub) = serve(
                vec![Reply::Events {
                    texts: vec!["<section>"],
                    gap: Duration::ZERO,
                    stall: true,
                }],
                idle,
            )
            .await;

            let deltas = backend
                .invoke_streaming(call(Duration::from_secs(5)))
                .await
                .unwrap();
            let items = drain(deltas).await;

            assert_eq!(items.len(), 2);
            assert_eq!(items[0].as_ref().unwrap().text, "<section>");
            assert!(matches!(
                items[1],
                Err(LlmError::Timeout { duration }) if duration == idle
            ));
        }

        #[tokio::test]
        async fn test_stream_open_is_attempted_once() {
            let (backend, stub) = serve(
                vec![
                    Reply::Json(
                        StatusCode::SERVICE_UNAVAILABLE,
                        api_error(503, "UNAVAILABLE", "The model is overloaded."),
                    ),
                    Reply::Events {
                        texts: vec!["late"],
                        gap: Duration::ZERO,
                        stall: false,
                    },
                ],
                Duration::from_secs(5),
            )
            .await;

            let err = match backend.invoke_streaming(call(Duration::from_secs(5))).await {
                Ok(_) => panic!("stream should not open"),
                Err(e) => e,
            };
            assert!(matches!(err, LlmError::ProviderOutage(_)), "{err:?}");
            assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
        }
    }
}
