//! HTTP transport for the Gemini backend
//!
//! Single-shot calls and streams run under different deadlines. A single-shot
//! call is bounded as a whole by the invocation timeout and is retried on
//! server errors, since nothing has reached the caller yet. A stream is bounded
//! by the invocation timeout only until its response headers arrive; after that
//! each chunk must follow the previous one within the idle timeout, so a long
//! assembly keeps running as long as the model keeps producing. Streams are
//! opened exactly once: deltas already handed out cannot be taken back.

use futures_util::stream::{self, BoxStream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest silence tolerated between two chunks of an open stream.
pub(crate) const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Attempts for a single-shot call, the first one included.
const SINGLE_SHOT_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(750);

/// Longest provider error message carried into an `LlmError`.
const MAX_DETAIL_LEN: usize = 300;

/// Raw body chunks of an open stream, already mapped onto `LlmError`.
pub(crate) type ByteStream = BoxStream<'static, Result<Vec<u8>, LlmError>>;

#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    stream_idle_timeout: Duration,
    retry_backoff: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the TLS backend cannot be initialised
    pub fn new() -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            stream_idle_timeout: STREAM_IDLE_TIMEOUT,
            retry_backoff: RETRY_BACKOFF,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = idle;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn post(&self, url: &str, api_key: &str) -> RequestBuilder {
        self.client.post(url).header("x-goog-api-key", api_key)
    }

    /// Send a single-shot request bounded as a whole by `timeout`.
    ///
    /// 5xx responses and failed connects are retried with linear backoff.
    /// Timeouts are not: the deadline belongs to the whole call.
    pub async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, LlmError> {
        let mut attempt = 1;
        loop {
            let Some(this_attempt) = request.try_clone() else {
                return Err(LlmError::Transport(
                    "request body cannot be replayed".to_string(),
                ));
            };

            let (error, retryable) = match this_attempt.timeout(timeout).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let retryable = response.status().is_server_error();
                    (status_error(response).await, retryable)
                }
                Err(e) if e.is_timeout() => return Err(LlmError::Timeout { duration: timeout }),
                Err(e) => (transport_error(&e), e.is_connect()),
            };

            if !retryable || attempt >= SINGLE_SHOT_ATTEMPTS {
                return Err(error);
            }
            warn!(attempt, error = %error, "Transient Gemini failure, retrying");
            tokio::time::sleep(self.retry_backoff * attempt).await;
            attempt += 1;
        }
    }

    /// Open a stream, waiting at most `first_byte` for the response headers.
    ///
    /// The body has no overall deadline. A gap longer than the idle timeout
    /// between chunks ends the stream with `LlmError::Timeout`.
    pub async fn open_stream(
        &self,
        request: RequestBuilder,
        first_byte: Duration,
    ) -> Result<ByteStream, LlmError> {
        let response = match tokio::time::timeout(first_byte, request.send()).await {
            Err(_) => return Err(LlmError::Timeout { duration: first_byte }),
            Ok(Err(e)) if e.is_timeout() => {
                return Err(LlmError::Timeout { duration: first_byte });
            }
            Ok(Err(e)) => return Err(transport_error(&e)),
            Ok(Ok(response)) => response,
        };
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        debug!(idle_timeout = ?self.stream_idle_timeout, "Gemini stream open");

        let idle = self.stream_idle_timeout;
        let body = response.bytes_stream().boxed();
        let chunks = stream::unfold(Some(body), move |body| async move {
            let mut body = body?;
            match tokio::time::timeout(idle, body.next()).await {
                Err(_) => Some((Err(LlmError::Timeout { duration: idle }), None)),
                Ok(None) => None,
                Ok(Some(Ok(bytes))) => Some((Ok(bytes.to_vec()), Some(body))),
                Ok(Some(Err(e))) => Some((
                    Err(LlmError::Transport(format!(
                        "Gemini stream interrupted: {}",
                        redact(&e.to_string())
                    ))),
                    None,
                )),
            }
        });
        Ok(chunks.boxed())
    }
}

fn transport_error(e: &reqwest::Error) -> LlmError {
    LlmError::Transport(format!("Gemini request failed: {}", redact(&e.to_string())))
}

async fn status_error(response: Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Map a non-success response onto an `LlmError`.
///
/// Gemini reports an invalid API key as 400 `INVALID_ARGUMENT`, not 401, so the
/// error message is consulted as well as the status code.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (None, None),
    };
    let mut detail = redact(message.as_deref().unwrap_or_else(|| {
        status.canonical_reason().unwrap_or("no error message")
    }));
    if detail.len() > MAX_DETAIL_LEN {
        let cut = (0..=MAX_DETAIL_LEN)
            .rev()
            .find(|i| detail.is_char_boundary(*i))
            .unwrap_or(0);
        detail.truncate(cut);
        detail.push_str("...");
    }

    let bad_key = status == StatusCode::BAD_REQUEST
        && message.as_deref().is_some_and(|m| m.contains("API key"));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::ProviderAuth(detail),
        _ if bad_key => LlmError::ProviderAuth(detail),
        StatusCode::NOT_FOUND => {
            LlmError::Misconfiguration(format!("Gemini model or endpoint not found: {detail}"))
        }
        StatusCode::TOO_MANY_REQUESTS => LlmError::ProviderQuota(detail),
        s if s.is_server_error() => LlmError::ProviderOutage(format!("{s}: {detail}")),
        s => LlmError::Transport(match api_status {
            Some(api_status) => format!("Gemini rejected the request ({s} {api_status}): {detail}"),
            None => format!("Gemini rejected the request ({s}): {detail}"),
        }),
    }
}

static KEY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?&]key=)[^&\s]+").expect("static regex"));

static GOOGLE_API_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AIza[0-9A-Za-z_\-]{30,}").expect("static regex"));

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=\-]+").expect("static regex"));

/// Strip API keys from text that may end up in logs or error messages.
pub(crate) fn redact(message: &str) -> String {
    let out = KEY_PARAM.replace_all(message, "${1}[REDACTED]");
    let out = GOOGLE_API_KEY.replace_all(&out, "[REDACTED]");
    BEARER.replace_all(&out, "${1}[REDACTED]").into_owned()
}
