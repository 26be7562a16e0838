use serde::Serialize;
use serde_json::Value;

use pokechat_core::ids::{MessageId, ToolCallId};
use pokechat_core::messages::{Message, Role};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResultView {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallView {
    pub tool_name: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<ToolCallId>,
    pub result: Option<ToolResultView>,
}

impl ToolCallView {
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

/// Data returned by a successful tool, kept for rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDataView {
    pub tool_name: String,
    pub data: Value,
}

/// Display state of one assistant message, derived entirely from the events
/// received so far.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCallView>,
    pub tool_results: Vec<ToolDataView>,
}

impl MessageView {
    pub fn assistant(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn pending_calls(&self) -> usize {
        self.tool_calls.iter().filter(|c| !c.is_resolved()).count()
    }

    /// The history entry to send back on the next turn.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            role: self.role,
            content: self.content.clone(),
        }
    }
}
