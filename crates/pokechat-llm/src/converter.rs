use serde_json::{json, Value};

use pokechat_core::messages::{Message, Role};
use pokechat_core::provider::{GenerationRequest, ToolChoice};

/// Convert a generation request into the Anthropic Messages API body.
pub fn build_request_body(request: &GenerationRequest, model: &str, max_tokens: u32) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "stream": true,
    });

    if let Some(system) = build_system(request) {
        body["system"] = json!(system);
    }

    body["messages"] = json!(convert_messages(&request.messages));

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = json!(tools);

        // A forced tool that is not in the manifest would be rejected by the API.
        let choice = match &request.tool_choice {
            ToolChoice::Tool { name } if !request.tools.iter().any(|t| &t.name == name) => ToolChoice::Any,
            other => other.clone(),
        };
        body["tool_choice"] = json!(choice);
    }

    body
}

/// System instructions plus any `system`-role history entries, in order.
fn build_system(request: &GenerationRequest) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
        parts.push(system);
    }
    parts.extend(
        request
            .messages
            .iter()
            .filter(|m| m.role == Role::System && !m.content.is_empty())
            .map(|m| m.content.as_str()),
    );
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Map history onto strictly alternating user/assistant turns.
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => continue,
            Role::User | Role::Tool => "user",
            Role::Assistant => "assistant",
        };
        if msg.content.trim().is_empty() {
            continue;
        }
        let block = json!({"type": "text", "text": msg.content});

        match result.last_mut() {
            Some(prev) if prev["role"] == role => {
                if let Some(content) = prev["content"].as_array_mut() {
                    content.push(block);
                }
            }
            _ => result.push(json!({"role": role, "content": [block]})),
        }
    }

    result
}
