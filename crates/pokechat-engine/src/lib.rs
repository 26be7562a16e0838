pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod routing;
pub mod tools;

pub use error::{RegistryError, RoutingError};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, ToolInvocation, TurnHandle, TurnRequest, TurnState, TurnSummary,
};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use routing::{AutoRouter, KeywordRouter, ToolRouter};
