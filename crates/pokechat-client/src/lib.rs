//! Client side of the chat stream: decodes SSE frames and folds events into
//! the assistant message being displayed.

pub mod client;
pub mod decoder;
pub mod frames;
pub mod view;

pub use client::{ChatClient, ChatResult, ClientError, TurnOutcome};
pub use decoder::{PlaceholderPolicy, StreamDecoder};
pub use frames::FrameStream;
pub use view::{MessageView, ToolCallView, ToolDataView, ToolResultView};
