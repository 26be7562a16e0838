use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GatewayError;
use crate::ids::ToolCallId;

/// Events emitted by a backend adapter during one turn. Ordering contract:
///
/// TextDelta* → Message → (end of stream)
///
/// Error can appear at any point and is terminal.
#[derive(Clone, Debug)]
pub enum GenerationEvent {
    TextDelta { delta: String },
    Message { message: AssistantTurn },
    Error { error: GatewayError },
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Message { .. } | Self::Error { .. })
    }
}

/// The structured message that closes a backend turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_calls: Vec<ToolInvocationRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl AssistantTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            stop_reason: Some(StopReason::EndTurn),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
            stop_reason: Some(StopReason::ToolUse),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call requested by the model, with its input already parsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: ToolCallId,
    pub name: String,
    pub input: Value,
}

impl ToolInvocationRequest {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            id: ToolCallId::new(),
            name: name.into(),
            input,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_classification() {
        let done = GenerationEvent::Message {
            message: AssistantTurn::text("hi"),
        };
        assert!(done.is_terminal());
        assert!(!GenerationEvent::TextDelta { delta: "x".into() }.is_terminal());
        assert!(GenerationEvent::Error {
            error: GatewayError::RateLimited
        }
        .is_terminal());
    }

    #[test]
    fn tool_call_turn_reports_tool_use() {
        let turn = AssistantTurn::with_tool_calls(vec![ToolInvocationRequest::new(
            "pokeapi_get_pokemon",
            json!({"pokemon": "pikachu"}),
        )]);
        assert!(turn.has_tool_calls());
        assert_eq!(turn.stop_reason, Some(StopReason::ToolUse));
        assert!(!AssistantTurn::text("plain").has_tool_calls());
    }

    #[test]
    fn stop_reason_serialization() {
        assert_eq!(serde_json::to_string(&StopReason::EndTurn).unwrap(), r#""end_turn""#);
        assert_eq!(serde_json::to_string(&StopReason::ToolUse).unwrap(), r#""tool_use""#);
    }
}
