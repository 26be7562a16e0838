use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settled result of one tool invocation, as reported to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<Value, ToolError>> for ToolOutcome {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Manifest entry sent to the model backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait implemented by each tool. Implementations validate their own input
/// and report every failure through `ToolError`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value) -> Result<Value, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    ExecutionFailed(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, input: Value) -> Result<Value, ToolError> {
            Ok(input)
        }
    }

    #[test]
    fn definition_carries_schema() {
        let def = Echo.to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.input_schema["type"], "object");
    }

    #[tokio::test]
    async fn outcome_from_ok_result() {
        let outcome = ToolOutcome::from(Echo.execute(json!({"a": 1})).await);
        assert!(outcome.ok);
        assert_eq!(outcome.data, Some(json!({"a": 1})));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn outcome_from_error_uses_display() {
        let outcome = ToolOutcome::from(Err(ToolError::InvalidInput("pokemon is required".into())));
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("invalid input: pokemon is required"));

        let outcome = ToolOutcome::from(Err(ToolError::ExecutionFailed("HTTP 404 fetching x".into())));
        assert_eq!(outcome.error.as_deref(), Some("HTTP 404 fetching x"));
    }

    #[test]
    fn serde_error_maps_to_invalid_input() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert!(matches!(ToolError::from(err), ToolError::InvalidInput(_)));
    }
}
