use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pokechat_core::events::OutboundEvent;
use pokechat_core::ids::MessageId;
use pokechat_core::messages::Message;

use crate::decoder::{PlaceholderPolicy, StreamDecoder};
use crate::frames::FrameStream;
use crate::view::MessageView;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
    /// The server answered with a non-success status.
    #[error("Chat service unavailable. Check server logs and network.")]
    Unavailable { status: u16 },
    #[error("Network error talking to AI service.")]
    Network(#[source] reqwest::Error),
    /// The stream ended without its closing `done` event.
    #[error("Network error talking to AI service.")]
    Truncated,
}

/// How a turn ended from the client's point of view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// User-visible failure notice.
    Failed(String),
    /// The user stopped the turn. Not an error.
    Stopped,
}

#[derive(Clone, Debug)]
pub struct ChatResult {
    pub outcome: TurnOutcome,
    pub message: MessageView,
    /// `error` events received during the turn.
    pub errors: Vec<String>,
    pub orphaned_results: usize,
    pub skipped_records: usize,
}

enum StreamEnd {
    Done,
    Cancelled,
}

/// HTTP client for `POST /api/chat`.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    policy: PlaceholderPolicy,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let endpoint = reqwest::Url::parse(base_url)
            .and_then(|base| base.join("/api/chat"))
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            policy: PlaceholderPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: PlaceholderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn send(&self, messages: &[Message], cancel: CancellationToken) -> ChatResult {
        self.send_streaming(messages, cancel, |_, _| {}).await
    }

    /// Send the history and fold the response stream. `on_event` sees every
    /// decoded event together with the state it produced. Cancelling `cancel`
    /// drops the connection and ends the turn as `Stopped`.
    pub async fn send_streaming<F>(&self, messages: &[Message], cancel: CancellationToken, mut on_event: F) -> ChatResult
    where
        F: FnMut(&OutboundEvent, &StreamDecoder),
    {
        let mut decoder = StreamDecoder::with_policy(MessageId::new(), self.policy.clone());
        let mut skipped = 0;

        let outcome = match self.stream_turn(messages, &cancel, &mut decoder, &mut skipped, &mut on_event).await {
            Ok(StreamEnd::Cancelled) => {
                info!("turn stopped by user");
                TurnOutcome::Stopped
            }
            Ok(StreamEnd::Done) => match decoder.errors().last() {
                Some(message) => TurnOutcome::Failed(message.clone()),
                None => TurnOutcome::Completed,
            },
            Err(e) => {
                warn!(error = ?e, "chat turn failed");
                match (&e, decoder.errors().last()) {
                    // The server already said why; keep its message over the truncation.
                    (ClientError::Truncated, Some(message)) => TurnOutcome::Failed(message.clone()),
                    _ => TurnOutcome::Failed(e.to_string()),
                }
            }
        };

        ChatResult {
            outcome,
            errors: decoder.errors().to_vec(),
            orphaned_results: decoder.orphaned_results(),
            skipped_records: skipped,
            message: decoder.into_message(),
        }
    }

    async fn stream_turn<F>(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
        decoder: &mut StreamDecoder,
        skipped: &mut usize,
        on_event: &mut F,
    ) -> Result<StreamEnd, ClientError>
    where
        F: FnMut(&OutboundEvent, &StreamDecoder),
    {
        let request = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "messages": messages }))
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            response = request => response.map_err(ClientError::Network)?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Unavailable { status: status.as_u16() });
        }

        let mut frames = Box::pin(FrameStream::new(response.bytes_stream()));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = frames.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    decoder.apply(&event);
                    *skipped = frames.skipped();
                    on_event(&event, decoder);
                    if decoder.is_finished() {
                        debug!("turn complete");
                        return Ok(StreamEnd::Done);
                    }
                }
                Some(Err(e)) => return Err(ClientError::Network(e)),
                None => {
                    *skipped = frames.skipped();
                    return Err(ClientError::Truncated);
                }
            }
        }
    }
}
