use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Future, Stream};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use pokechat_core::errors::GatewayError;
use pokechat_core::provider::{GenerationBackend, GenerationRequest, GenerationStream};
use pokechat_core::stream::GenerationEvent;

use crate::auth::ApiKey;
use crate::converter;
use crate::sse::{self, SseParser};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub idle_timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-7-sonnet-latest".to_string(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 1024,
            idle_timeout: SSE_IDLE_TIMEOUT,
        }
    }
}

/// Streaming adapter for the Anthropic Messages API.
pub struct AnthropicBackend {
    client: Client,
    api_key: ApiKey,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(api_key: ApiKey, config: AnthropicConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn post(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(body)
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn stream(&self, request: &GenerationRequest) -> Result<GenerationStream, GatewayError> {
        let body = converter::build_request_body(request, &self.config.model, self.config.max_tokens);

        let resp = self
            .post(&body)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, body));
        }

        debug!("backend stream opened");
        let stream = SseStream::with_idle_timeout(resp.bytes_stream(), self.config.idle_timeout);
        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": 1,
            "system": "healthcheck",
            "messages": [{"role": "user", "content": "ping"}],
        });
        let resp = self
            .post(&body)
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(GatewayError::from_status(status, body))
        }
    }
}

/// Wraps a byte stream and yields [`GenerationEvent`]s. If no data arrives
/// within the idle timeout, yields a `StreamInterrupted` error.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseParser,
    buffer: Vec<u8>,
    pending: VecDeque<GenerationEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    closed: bool,
}

impl SseStream {
    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            closed: false,
        }
    }

    fn drain_records(&mut self) {
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let chunk: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.parse_chunk(&chunk);
        }
    }

    fn parse_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        for (event_type, data) in sse::parse_sse_lines(&text) {
            let events = self.parser.parse_event(&event_type, &data);
            self.pending.extend(events);
        }
    }

    fn fail(&mut self, error: GatewayError) -> Poll<Option<GenerationEvent>> {
        self.closed = true;
        self.pending.clear();
        Poll::Ready(Some(GenerationEvent::Error { error }))
    }
}

impl Stream for SseStream {
    type Item = GenerationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending.pop_front() {
            return Poll::Ready(Some(event));
        }
        if self.closed {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    self.drain_records();

                    if let Some(event) = self.pending.pop_front() {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return self.fail(GatewayError::StreamInterrupted(e.to_string()));
                }
                Poll::Ready(None) => {
                    self.closed = true;
                    if !self.buffer.is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        self.parse_chunk(&remaining);
                    }
                    if !self.parser.is_finished() {
                        self.pending.push_back(GenerationEvent::Error {
                            error: GatewayError::StreamInterrupted("stream ended before message_stop".into()),
                        });
                    }
                    return Poll::Ready(self.pending.pop_front());
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        let secs = self.idle_duration.as_secs();
                        return self.fail(GatewayError::StreamInterrupted(format!("idle timeout after {secs}s")));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
