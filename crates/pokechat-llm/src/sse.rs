use serde::Deserialize;
use serde_json::Value;

use pokechat_core::errors::GatewayError;
use pokechat_core::ids::ToolCallId;
use pokechat_core::stream::{AssistantTurn, GenerationEvent, StopReason, ToolInvocationRequest};

/// State machine for parsing Anthropic SSE stream events into
/// [`GenerationEvent`]s.
#[derive(Default)]
pub struct SseParser {
    text: String,
    tool_blocks: Vec<ToolBlock>,
    stop_reason: Option<StopReason>,
    finished: bool,
}

struct ToolBlock {
    id: String,
    name: String,
    arguments_json: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `message_stop` or an `error` record has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Parse a single SSE record and return zero or more events.
    pub fn parse_event(&mut self, event_type: &str, data: &str) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        match event_type {
            "content_block_start" => {
                if let Ok(block) = serde_json::from_str::<ContentBlockStartEvent>(data) {
                    if block.content_block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                        let field = |key: &str| {
                            block
                                .content_block
                                .get(key)
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string()
                        };
                        self.tool_blocks.push(ToolBlock {
                            id: field("id"),
                            name: field("name"),
                            arguments_json: String::new(),
                        });
                    }
                }
            }

            "content_block_delta" => {
                if let Ok(delta) = serde_json::from_str::<ContentBlockDeltaEvent>(data) {
                    match delta.delta.get("type").and_then(|t| t.as_str()) {
                        Some("text_delta") => {
                            let text = delta.delta.get("text").and_then(|t| t.as_str()).unwrap_or("");
                            if !text.is_empty() {
                                self.text.push_str(text);
                                events.push(GenerationEvent::TextDelta { delta: text.to_string() });
                            }
                        }
                        Some("input_json_delta") => {
                            let partial = delta.delta.get("partial_json").and_then(|t| t.as_str()).unwrap_or("");
                            if let Some(block) = self.tool_blocks.last_mut() {
                                block.arguments_json.push_str(partial);
                            }
                        }
                        _ => {}
                    }
                }
            }

            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<MessageDeltaEvent>(data) {
                    if let Some(reason) = delta.delta.and_then(|d| d.stop_reason) {
                        self.stop_reason = parse_stop_reason(&reason);
                    }
                }
            }

            "message_stop" => {
                self.finished = true;
                events.push(GenerationEvent::Message {
                    message: self.build_turn(),
                });
            }

            "error" => {
                self.finished = true;
                let error = match serde_json::from_str::<ErrorEvent>(data) {
                    Ok(err) => classify_error(&err),
                    Err(_) => GatewayError::StreamInterrupted(format!("unparseable error record: {data}")),
                };
                events.push(GenerationEvent::Error { error });
            }

            _ => {} // message_start, ping, etc.
        }

        events
    }

    fn build_turn(&self) -> AssistantTurn {
        let tool_calls: Vec<ToolInvocationRequest> = self
            .tool_blocks
            .iter()
            .map(|block| {
                let input: Value = if block.arguments_json.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&block.arguments_json).unwrap_or(Value::Object(serde_json::Map::new()))
                };
                ToolInvocationRequest {
                    id: if block.id.is_empty() {
                        ToolCallId::new()
                    } else {
                        ToolCallId::from_raw(&block.id)
                    },
                    name: block.name.clone(),
                    input,
                }
            })
            .collect();

        let stop_reason = self.stop_reason.clone().or(Some(if tool_calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        }));

        AssistantTurn {
            text: self.text.clone(),
            tool_calls,
            stop_reason,
        }
    }
}

fn parse_stop_reason(raw: &str) -> Option<StopReason> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}

fn classify_error(err: &ErrorEvent) -> GatewayError {
    match err.error.error_type.as_str() {
        "overloaded_error" => GatewayError::ProviderOverloaded,
        "rate_limit_error" => GatewayError::RateLimited,
        "authentication_error" | "permission_error" => {
            GatewayError::AuthenticationFailed(err.error.message.clone())
        }
        "invalid_request_error" => GatewayError::InvalidRequest(err.error.message.clone()),
        _ => GatewayError::ServerError {
            status: 500,
            body: err.error.message.clone(),
        },
    }
}

/// Parse raw SSE text into (event_type, data) pairs.
pub fn parse_sse_lines(raw: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data = String::new();

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(event) = line.strip_prefix("event:") {
            current_event = event.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            if !current_data.is_empty() {
                current_data.push('\n');
            }
            current_data.push_str(data.trim_start());
        } else if line.is_empty() && !current_event.is_empty() {
            events.push((std::mem::take(&mut current_event), std::mem::take(&mut current_data)));
        }
    }

    // Handle trailing event without blank line
    if !current_event.is_empty() {
        events.push((current_event, current_data));
    }

    events
}

// --- Deserialization types for Anthropic SSE events ---

#[derive(Deserialize)]
struct ContentBlockStartEvent {
    content_block: Value,
}

#[derive(Deserialize)]
struct ContentBlockDeltaEvent {
    delta: Value,
}

#[derive(Deserialize)]
struct MessageDeltaEvent {
    delta: Option<MessageDeltaPayload>,
}

#[derive(Deserialize)]
struct MessageDeltaPayload {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
