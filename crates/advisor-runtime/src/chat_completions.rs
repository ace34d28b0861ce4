//! OpenAI-compatible chat-completions provider
//!
//! Implementation of `LlmProvider` for any endpoint speaking the
//! `/chat/completions` protocol with SSE streaming (DeepSeek by default).

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use advisor_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
        StreamChunk, DEFAULT_MODEL,
    },
};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::sse::{SseDecoder, SseEvent};

/// Base URL used when `DEEPSEEK_BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// Provider configuration
#[derive(Clone)]
pub struct ChatCompletionsConfig {
    /// Bearer credential
    pub api_key: String,

    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,

    /// Default model identifier
    pub model: String,

    /// Connection timeout in seconds. Reads are not bounded.
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for ChatCompletionsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ChatCompletionsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            connect_timeout_secs: 10,
        }
    }

    /// Read configuration through `lookup`, e.g. `|name| std::env::var(name).ok()`.
    ///
    /// A missing or blank `DEEPSEEK_API_KEY` is a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::Config(format!("{API_KEY_VAR} is not set")))?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup("DEEPSEEK_BASE_URL").filter(|v| !v.is_empty()) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup("DEEPSEEK_MODEL").filter(|v| !v.is_empty()) {
            config.model = model;
        }
        Ok(config)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Chat-completions provider
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsProvider {
    /// Create from configuration
    pub fn from_config(config: ChatCompletionsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Create from variables read through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_config(ChatCompletionsConfig::from_lookup(lookup)?)
    }

    /// Model used when a request does not name one
    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    fn build_request<'a>(
        messages: &'a [Message],
        options: &'a GenerationOptions,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(AgentError::Transport(format!("HTTP {status}: {excerpt}")))
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("chat-completions health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let body = Self::build_request(messages, options, false);
        let response: ChatResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Transport("response had no choices".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| options.model.clone()),
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = Self::build_request(messages, options, true);
        let response = self.post(&body).await?;

        tracing::debug!(model = %options.model, "chat-completions stream opened");
        Ok(decode_stream(Box::pin(response.bytes_stream())))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .http
            .get(self.config.endpoint("models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let list: ModelList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: m.owned_by,
            })
            .collect())
    }
}

// ============================================================================
// Stream decoding
// ============================================================================

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    queue: VecDeque<Result<StreamChunk>>,
    saw_finish: bool,
    ended: bool,
}

impl<S> DecodeState<S> {
    fn push_event(&mut self, event: SseEvent) {
        if self.ended {
            return;
        }
        match event {
            SseEvent::Done => {
                self.queue.push_back(Ok(StreamChunk::finished(None)));
                self.ended = true;
            }
            SseEvent::Data(json) => match serde_json::from_str::<StreamFrame>(&json) {
                Ok(frame) => {
                    let Some(choice) = frame.choices.into_iter().next() else {
                        return;
                    };
                    if choice.finish_reason.is_some() {
                        self.saw_finish = true;
                    }
                    self.queue.push_back(Ok(StreamChunk {
                        delta: choice.delta.content.unwrap_or_default(),
                        done: false,
                        finish_reason: choice.finish_reason,
                    }));
                }
                Err(e) => self.fail(format!("malformed stream chunk: {e}")),
            },
        }
    }

    fn fail(&mut self, reason: String) {
        self.queue.push_back(Err(AgentError::Transport(reason)));
        self.ended = true;
    }
}

/// Turn a raw SSE byte stream into chunks.
///
/// The stream ends after `[DONE]`. A body that stops before `[DONE]` and
/// before any finish reason is reported as a transport error.
fn decode_stream<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        saw_finish: false,
        ended: false,
    };

    let chunks = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.queue.pop_front() {
                return Some((item, st));
            }
            if st.ended {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.feed(bytes.as_ref()) {
                        st.push_event(event);
                    }
                }
                Some(Err(e)) => st.fail(e.to_string()),
                None => {
                    if let Some(event) = st.decoder.finish() {
                        st.push_event(event);
                    }
                    if !st.ended {
                        if st.saw_finish {
                            st.queue.push_back(Ok(StreamChunk::finished(None)));
                            st.ended = true;
                        } else {
                            st.fail("stream ended before completion".into());
                        }
                    }
                }
            }
        }
    });

    Box::pin(chunks)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
    owned_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes},
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    fn frame(content: &str) -> String {
        let json = serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        });
        format!("data: {json}\n\n")
    }

    fn chunks_of(parts: Vec<&'static str>) -> impl Stream<Item = std::result::Result<&'static [u8], String>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes())))
    }

    async fn drain(stream: CompletionStream) -> Vec<Result<StreamChunk>> {
        stream.collect().await
    }

    #[test]
    fn test_config_requires_key() {
        let err = ChatCompletionsConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));

        let err = ChatCompletionsConfig::from_lookup(|_| Some("  ".into())).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = ChatCompletionsConfig::from_lookup(|name| match name {
            "DEEPSEEK_API_KEY" => Some("sk-test".into()),
            "DEEPSEEK_MODEL" => Some("deepseek-reasoner".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.endpoint("chat/completions"), "https://api.deepseek.com/chat/completions");
        assert!(!format!("{config:?}").contains("sk-test"));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::system("S"), Message::user("U")];
        let options = GenerationOptions::default();
        let body = ChatCompletionsProvider::build_request(&messages, &options, true);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], true);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "U");
        assert!(json.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_decode_skips_role_frame_and_stops_at_done() {
        let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n";
        let body = format!("{role}{}{}data: [DONE]\n\n{}", frame("Hel"), frame("lo"), frame("ignored"));
        let leaked: &'static str = Box::leak(body.into_boxed_str());
        let items = drain(decode_stream(chunks_of(vec![leaked]))).await;

        let deltas: Vec<String> = items
            .iter()
            .map(|r| r.as_ref().unwrap().delta.clone())
            .collect();
        assert_eq!(deltas, vec!["", "Hel", "lo", ""]);
        assert!(items.last().unwrap().as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn test_decode_truncated_body_is_error() {
        let first: &'static str = Box::leak(frame("Hello ").into_boxed_str());
        let items = drain(decode_stream(chunks_of(vec![first]))).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().delta, "Hello ");
        assert!(matches!(items[1], Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    async fn test_decode_finish_reason_without_done_is_complete() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n";
        let items = drain(decode_stream(chunks_of(vec![body]))).await;
        assert!(items.iter().all(Result::is_ok));
        assert_eq!(items[0].as_ref().unwrap().finish_reason, Some(FinishReason::Stop));
        assert!(items.last().unwrap().as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn test_decode_transport_error_mid_stream() {
        let parts: Vec<std::result::Result<&'static [u8], String>> = vec![
            Ok(Box::leak(frame("Hello ").into_boxed_str()).as_bytes()),
            Err("connection reset".into()),
        ];
        let items = drain(decode_stream(stream::iter(parts))).await;
        assert_eq!(items.len(), 2);
        match &items[1] {
            Err(AgentError::Transport(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    // In-process endpoint for the HTTP path

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        auth: Arc<Mutex<Vec<String>>>,
    }

    async fn completions(
        State(rec): State<Recorded>,
        headers: axum::http::HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            rec.auth.lock().unwrap().push(auth.to_string());
        }
        let streaming = body["stream"].as_bool().unwrap_or(false);
        rec.bodies.lock().unwrap().push(body);

        if streaming {
            let parts: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from(frame("Yields "))),
                Ok(Bytes::from(frame("are low."))),
                Ok(Bytes::from_static(b"data: [DONE]\n\n")),
            ];
            axum::http::Response::builder()
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(stream::iter(parts)))
                .unwrap()
        } else {
            Json(serde_json::json!({
                "model": "deepseek-chat",
                "choices": [{"message": {"role": "assistant", "content": "whole"}, "finish_reason": "stop"}]
            }))
            .into_response()
        }
    }

    async fn unauthorized() -> impl IntoResponse {
        (StatusCode::UNAUTHORIZED, "invalid api key")
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider_for(base_url: String) -> ChatCompletionsProvider {
        let mut config = ChatCompletionsConfig::new("sk-test");
        config.base_url = base_url;
        ChatCompletionsProvider::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_stream_over_http() {
        let rec = Recorded::default();
        let router = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(rec.clone());
        let provider = provider_for(spawn(router).await);

        let messages = vec![Message::system("S"), Message::user("U")];
        let stream = provider
            .complete_stream(&messages, &GenerationOptions::default())
            .await
            .unwrap();
        let text: String = drain(stream)
            .await
            .into_iter()
            .map(|r| r.unwrap().delta)
            .collect();

        assert_eq!(text, "Yields are low.");
        assert_eq!(rec.auth.lock().unwrap()[0], "Bearer sk-test");
        assert_eq!(rec.bodies.lock().unwrap()[0]["stream"], true);
    }

    #[tokio::test]
    async fn test_complete_over_http() {
        let router = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(Recorded::default());
        let provider = provider_for(spawn(router).await);

        let completion = provider
            .complete(&[Message::user("U")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.content, "whole");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let router = Router::new()
            .route("/chat/completions", post(unauthorized))
            .route("/models", get(unauthorized));
        let provider = provider_for(spawn(router).await);

        let err = provider
            .complete_stream(&[Message::user("U")], &GenerationOptions::default())
            .await
            .err()
            .unwrap();
        match err {
            AgentError::Transport(msg) => assert!(msg.contains("401")),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert!(!provider.health_check().await.unwrap());
    }
}
