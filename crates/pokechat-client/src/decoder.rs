//! Incremental fold of outbound events into a [`MessageView`].

use std::collections::HashMap;

use tracing::debug;

use pokechat_core::events::OutboundEvent;
use pokechat_core::ids::{MessageId, ToolCallId};

use crate::view::{MessageView, ToolCallView, ToolDataView, ToolResultView};

/// Text shown when a turn produced tool results but no prose.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceholderPolicy {
    by_tool: HashMap<String, String>,
    fallback: String,
}

impl Default for PlaceholderPolicy {
    fn default() -> Self {
        Self::new("Here are the results:")
            .with_tool("pokeapi_get_pokemon", "Here's the Pokémon information you requested:")
            .with_tool("advice_move_recommender", "Here's the type effectiveness analysis:")
    }
}

impl PlaceholderPolicy {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            by_tool: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>, text: impl Into<String>) -> Self {
        self.by_tool.insert(tool_name.into(), text.into());
        self
    }

    pub fn placeholder_for(&self, tool_name: &str) -> &str {
        self.by_tool.get(tool_name).map(String::as_str).unwrap_or(&self.fallback)
    }
}

/// Folds one turn's events, in arrival order, into display state.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDecoder {
    message: MessageView,
    errors: Vec<String>,
    orphaned_results: usize,
    finished: bool,
    policy: PlaceholderPolicy,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(MessageId::new())
    }
}

impl StreamDecoder {
    pub fn new(message_id: MessageId) -> Self {
        Self::with_policy(message_id, PlaceholderPolicy::default())
    }

    pub fn with_policy(message_id: MessageId, policy: PlaceholderPolicy) -> Self {
        Self {
            message: MessageView::assistant(message_id),
            errors: Vec::new(),
            orphaned_results: 0,
            finished: false,
            policy,
        }
    }

    /// Apply every event in order.
    pub fn fold<'a>(mut self, events: impl IntoIterator<Item = &'a OutboundEvent>) -> Self {
        for event in events {
            self.apply(event);
        }
        self
    }

    pub fn apply(&mut self, event: &OutboundEvent) {
        if self.finished {
            debug!(event = event.event_type(), "ignoring event after done");
            return;
        }
        match event {
            OutboundEvent::Text { delta } => self.message.content.push_str(delta),
            OutboundEvent::ToolCall {
                tool_name,
                input,
                call_id,
            } => self.message.tool_calls.push(ToolCallView {
                tool_name: tool_name.clone(),
                input: input.clone(),
                call_id: call_id.clone(),
                result: None,
            }),
            OutboundEvent::ToolResult {
                tool_name,
                ok,
                data,
                error,
                call_id,
            } => {
                match self.pair(tool_name, call_id.as_ref()) {
                    Some(index) => {
                        self.message.tool_calls[index].result = Some(ToolResultView {
                            ok: *ok,
                            error: error.clone(),
                        });
                    }
                    None => {
                        debug!(tool = %tool_name, "tool result without a matching call");
                        self.orphaned_results += 1;
                    }
                }
                if let (true, Some(data)) = (*ok, data) {
                    self.message.tool_results.push(ToolDataView {
                        tool_name: tool_name.clone(),
                        data: data.clone(),
                    });
                }
            }
            OutboundEvent::Error { message } => self.errors.push(message.clone()),
            OutboundEvent::Done => {
                self.finished = true;
                if self.message.content.is_empty() {
                    if let Some(first) = self.message.tool_results.first() {
                        self.message.content = self.policy.placeholder_for(&first.tool_name).to_string();
                    }
                }
            }
        }
    }

    /// Index of the call a result belongs to: the matching call id when both
    /// sides carry one, otherwise the earliest unresolved call with that name.
    fn pair(&self, tool_name: &str, call_id: Option<&ToolCallId>) -> Option<usize> {
        let calls = &self.message.tool_calls;
        if let Some(id) = call_id {
            if calls.iter().any(|c| c.call_id.as_ref() == Some(id)) {
                return calls
                    .iter()
                    .position(|c| c.call_id.as_ref() == Some(id) && !c.is_resolved());
            }
        }
        calls
            .iter()
            .position(|c| c.tool_name == tool_name && !c.is_resolved())
    }

    pub fn message(&self) -> &MessageView {
        &self.message
    }

    pub fn into_message(self) -> MessageView {
        self.message
    }

    /// Turn-level failure notices, in arrival order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn orphaned_results(&self) -> usize {
        self.orphaned_results
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
