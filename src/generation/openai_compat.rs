//! Client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! DeepSeek and OpenAI share the wire format; only the base URL, key and
//! model id differ. Streaming responses are server-sent events whose `data:`
//! lines carry JSON chunks, terminated by `data: [DONE]`.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    FragmentStream, GenerationError, GenerationRequest, GenerationResult, ModelChoice,
    TextGenerator,
};

/// Default DeepSeek API base URL.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for one model.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `api_key` - Bearer token for the service
    /// * `base_url` - API root; `/chat/completions` is appended
    /// * `model` - Model id sent with every request
    ///
    /// # Errors
    /// Returns `GenerationError::ConfigError` if the key is empty
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> GenerationResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::ConfigError(
                "API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Create a client for one of the hosted review models.
    pub fn for_model(
        choice: ModelChoice,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> GenerationResult<Self> {
        let base_url = base_url.unwrap_or_else(|| {
            match choice {
                ModelChoice::DeepSeek => DEEPSEEK_BASE_URL,
                ModelChoice::OpenAi => OPENAI_BASE_URL,
            }
            .to_string()
        });
        Self::new(api_key, base_url, choice.model_id())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "stream": request.stream,
        })
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A non-empty content delta
    Content(String),
    /// An error object sent mid-stream
    Error(String),
    /// The `[DONE]` terminator
    Done,
}

/// Decode one SSE line. Comments, blank lines, non-data fields and chunks
/// without content yield `None`. A `data:` payload that is not JSON is an
/// [`SseEvent::Error`], so the response never silently loses a fragment.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Unparseable stream chunk");
            return Some(SseEvent::Error(format!("malformed stream chunk: {}", e)));
        }
    };

    if let Some(message) = value
        .get("error")
        .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
    {
        return Some(SseEvent::Error(message.to_string()));
    }

    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(|content| SseEvent::Content(content.to_string()))
}

/// Splits a byte stream into complete lines and decodes them.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever remains after the stream ends without a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_sse_line(&String::from_utf8_lossy(&rest))
    }
}

fn api_error(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    GenerationError::ApiError { status, message }
}

/// Content of a non-streaming completion.
fn completion_content(value: &Value) -> GenerationResult<String> {
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::StreamError("completion has no message content".to_string()))
}

#[async_trait]
impl TextGenerator for OpenAiCompatClient {
    async fn stream(&self, request: &GenerationRequest) -> GenerationResult<FragmentStream> {
        debug!(
            model = %self.model,
            temperature = request.temperature,
            stream = request.stream,
            prompt_chars = request.prompt.chars().count(),
            "Starting completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        if !request.stream {
            let value: Value = response
                .json()
                .await
                .map_err(|e| GenerationError::StreamError(e.to_string()))?;
            let content = completion_content(&value)?;
            return Ok(Box::pin(futures::stream::once(async move {
                Ok::<_, GenerationError>(content)
            })));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut decoder = SseDecoder::default();
            let mut done = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| GenerationError::StreamError(e.to_string()))?;
                for event in decoder.feed(&chunk) {
                    match event {
                        SseEvent::Content(content) => yield content,
                        SseEvent::Error(message) => {
                            Err::<(), _>(GenerationError::StreamError(message))?
                        }
                        SseEvent::Done => done = true,
                    }
                    if done {
                        break;
                    }
                }
                if done {
                    break;
                }
            }

            if !done {
                match decoder.finish() {
                    Some(SseEvent::Content(content)) => yield content,
                    Some(SseEvent::Error(message)) => {
                        Err::<(), _>(GenerationError::StreamError(message))?
                    }
                    _ => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
