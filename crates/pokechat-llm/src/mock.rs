use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;

use pokechat_core::errors::GatewayError;
use pokechat_core::provider::{GenerationBackend, GenerationRequest, GenerationStream};
use pokechat_core::stream::{AssistantTurn, GenerationEvent, ToolInvocationRequest};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield a sequence of events, then end.
    Stream(Vec<GenerationEvent>),
    /// Return an error from the `stream()` call itself.
    Error(GatewayError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Sleep before each event.
    Paced(Duration, Vec<GenerationEvent>),
    /// Yield the events, then never complete.
    Hang(Vec<GenerationEvent>),
}

impl MockResponse {
    /// A text answer delivered as one delta per chunk.
    pub fn text_chunks(chunks: &[&str]) -> Self {
        let mut events: Vec<GenerationEvent> = chunks
            .iter()
            .map(|c| GenerationEvent::TextDelta { delta: c.to_string() })
            .collect();
        events.push(GenerationEvent::Message {
            message: AssistantTurn::text(chunks.concat()),
        });
        Self::Stream(events)
    }

    pub fn text(text: &str) -> Self {
        Self::text_chunks(&[text])
    }

    /// A turn whose terminal message requests the given tool calls.
    pub fn tool_calls(calls: Vec<ToolInvocationRequest>) -> Self {
        Self::Stream(vec![GenerationEvent::Message {
            message: AssistantTurn::with_tool_calls(calls),
        }])
    }

    /// Convenience for a single tool call.
    pub fn tool_call(name: &str, input: Value) -> Self {
        Self::tool_calls(vec![ToolInvocationRequest::new(name, input)])
    }

    /// Some text deltas followed by a mid-stream error.
    pub fn text_then_error(chunks: &[&str], error: GatewayError) -> Self {
        let mut events: Vec<GenerationEvent> = chunks
            .iter()
            .map(|c| GenerationEvent::TextDelta { delta: c.to_string() })
            .collect();
        events.push(GenerationEvent::Error { error });
        Self::Stream(events)
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

type Responder = Box<dyn Fn(&GenerationRequest) -> MockResponse + Send + Sync>;

/// Backend that returns pre-programmed responses in sequence and records
/// every request it receives.
pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
    ping_error: Mutex<Option<GatewayError>>,
    call_count: AtomicUsize,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            ping_error: Mutex::new(None),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Backend that computes each response from the request once the scripted
    /// queue is empty.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> MockResponse + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn set_ping_error(&self, error: Option<GatewayError>) {
        *self.ping_error.lock() = error;
    }

    fn next_response(&self, request: &GenerationRequest) -> Option<MockResponse> {
        if let Some(response) = self.responses.lock().pop_front() {
            return Some(response);
        }
        self.responder.as_ref().map(|f| f(request))
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<GenerationStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let response = self.next_response(request).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("MockBackend: no response configured for call {idx}"))
        })?;
        resolve_response(response).await
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        match self.ping_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Resolve a response, sleeping through any `Delay` wrappers first.
async fn resolve_response(response: MockResponse) -> Result<GenerationStream, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockResponse::Paced(interval, events) => {
                let paced = stream::iter(events).then(move |event| async move {
                    tokio::time::sleep(interval).await;
                    event
                });
                return Ok(Box::pin(paced));
            }
            MockResponse::Hang(events) => {
                return Ok(Box::pin(stream::iter(events).chain(stream::pending())));
            }
        }
    }
}
