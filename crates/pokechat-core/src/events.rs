use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;
use crate::tools::ToolOutcome;

/// Every tag that may appear on the wire.
pub const EVENT_TYPES: [&str; 5] = ["text", "tool_call", "tool_result", "error", "done"];

/// Events pushed from the orchestrator to the client. This is the only
/// information that crosses the server/client boundary.
///
/// `call_id` is the backend-assigned invocation id. Older producers omit it,
/// in which case consumers pair results to calls by tool name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    Text {
        delta: String,
    },

    ToolCall {
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<ToolCallId>,
    },

    ToolResult {
        tool_name: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<ToolCallId>,
    },

    Error {
        message: String,
    },

    /// Always the last event of a turn.
    Done,
}

impl OutboundEvent {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::Text { delta: delta.into() }
    }

    pub fn tool_call(tool_name: impl Into<String>, input: Value, call_id: ToolCallId) -> Self {
        Self::ToolCall {
            tool_name: tool_name.into(),
            input,
            call_id: Some(call_id),
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, outcome: ToolOutcome, call_id: ToolCallId) -> Self {
        Self::ToolResult {
            tool_name: tool_name.into(),
            ok: outcome.ok,
            data: outcome.data,
            error: outcome.error,
            call_id: Some(call_id),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_payload_shape() {
        let json = serde_json::to_value(OutboundEvent::text("Hel")).unwrap();
        assert_eq!(json, json!({"type": "text", "delta": "Hel"}));
    }

    #[test]
    fn tool_call_uses_camel_case_fields() {
        let evt = OutboundEvent::tool_call(
            "pokeapi_get_pokemon",
            json!({"pokemon": "pikachu"}),
            ToolCallId::from_raw("toolu_1"),
        );
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "tool_call",
                "toolName": "pokeapi_get_pokemon",
                "input": {"pokemon": "pikachu"},
                "callId": "toolu_1"
            })
        );
    }

    #[test]
    fn failed_tool_result_omits_data() {
        let evt = OutboundEvent::tool_result(
            "lookup",
            ToolOutcome::failure("unknown tool"),
            ToolCallId::from_raw("toolu_2"),
        );
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "unknown tool");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn done_is_bare_tag() {
        assert_eq!(serde_json::to_string(&OutboundEvent::Done).unwrap(), r#"{"type":"done"}"#);
        assert!(OutboundEvent::Done.is_terminal());
        assert!(!OutboundEvent::text("x").is_terminal());
    }

    #[test]
    fn parses_results_without_call_id() {
        let evt: OutboundEvent =
            serde_json::from_str(r#"{"type":"tool_result","toolName":"lookup","ok":true,"data":{"id":25}}"#).unwrap();
        assert_eq!(
            evt,
            OutboundEvent::ToolResult {
                tool_name: "lookup".into(),
                ok: true,
                data: Some(json!({"id": 25})),
                error: None,
                call_id: None,
            }
        );
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let events = vec![
            OutboundEvent::text("a"),
            OutboundEvent::tool_call("t", json!({}), ToolCallId::new()),
            OutboundEvent::tool_result("t", ToolOutcome::success(json!(1)), ToolCallId::new()),
            OutboundEvent::error("boom"),
            OutboundEvent::Done,
        ];
        for evt in &events {
            let json = serde_json::to_value(evt).unwrap();
            assert_eq!(json["type"], evt.event_type());
            assert!(EVENT_TYPES.contains(&evt.event_type()));
        }
    }
}
