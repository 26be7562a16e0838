use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::messages::Message;
use crate::stream::GenerationEvent;
use crate::tools::ToolDefinition;

pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// Hint nudging the backend toward calling a tool instead of answering from memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call a tool.
    Auto,
    /// Model must call some tool.
    #[default]
    Any,
    /// Model must call this tool.
    Tool { name: String },
}

impl ToolChoice {
    pub fn tool(name: impl Into<String>) -> Self {
        Self::Tool { name: name.into() }
    }
}

/// Everything a backend needs to start one turn.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub system: Option<String>,
    pub tool_choice: ToolChoice,
}

/// Boundary to the model-generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Start one turn. Errors returned here mean the turn never started;
    /// failures after that arrive as `GenerationEvent::Error`.
    async fn stream(&self, request: &GenerationRequest) -> Result<GenerationStream, GatewayError>;

    /// Minimal reachability check used by the health probe.
    async fn ping(&self) -> Result<(), GatewayError>;
}
