#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("failed to set up tool {tool}: {reason}")]
    ToolSetup { tool: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("invalid routing pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
