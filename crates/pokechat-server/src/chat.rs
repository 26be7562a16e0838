use std::future::ready;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use pokechat_core::codec;
use pokechat_core::messages::Message;
use pokechat_engine::TurnRequest;

use crate::server::AppState;

const INVALID_BODY: &str = "Invalid body: messages[] required";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Option<Vec<Message>>,
}

/// JSON error body `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

/// `POST /api/chat`: runs one turn and streams its events as SSE records.
/// The response body owns the turn's cancellation guard, so a client that
/// disconnects cancels the turn.
pub async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let messages = match body {
        Ok(Json(ChatBody { messages: Some(messages) })) => messages,
        Ok(_) => return Err(ApiError::bad_request(INVALID_BODY)),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected chat body");
            return Err(ApiError::bad_request(INVALID_BODY));
        }
    };
    info!(messages = messages.len(), "chat request");

    let cancel = state.shutdown.child_token();
    let handle = state
        .orchestrator
        .spawn_turn(TurnRequest::new(messages), cancel.clone(), state.channel_capacity);
    let guard = cancel.drop_guard();

    let events = stream::unfold((handle.events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((event, (events, guard)))
    });
    let frames = events.filter_map(|event| {
        ready(match codec::encode(&event) {
            Ok(frame) => Some(Ok::<Bytes, std::convert::Infallible>(Bytes::from(frame))),
            Err(e) => {
                error!(event = event.event_type(), error = %e, "failed to encode event");
                None
            }
        })
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}
