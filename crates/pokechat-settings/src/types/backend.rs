//! Model backend and tool-routing settings.

use pokechat_core::provider::ToolChoice;
use serde::{Deserialize, Serialize};

/// Anthropic Messages API settings. The API key itself is never stored here;
/// it is read from `ANTHROPIC_API_KEY` at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    pub max_tokens: u32,
    /// Seconds without any bytes before the stream is considered dead.
    pub idle_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-7-sonnet-latest".to_string(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 1024,
            idle_timeout_secs: 90,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    /// Regex keyword families pick a forced tool.
    #[default]
    Keyword,
    /// Always let the model decide.
    Auto,
}

/// One keyword family and the tool it forces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    /// Case-insensitive regular expression matched against the latest user message.
    pub pattern: String,
    pub tool: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingSettings {
    pub strategy: RoutingStrategy,
    /// Checked in order; the first matching rule wins.
    pub rules: Vec<RouteRule>,
    /// Choice used when no rule matches.
    pub fallback: ToolChoice,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::Keyword,
            rules: vec![
                RouteRule {
                    pattern: r"\b(vs\.?|versus|against|matchups?|counters?|super[- ]?effective|weak(ness|nesses)?|resists?|beats?)\b".to_string(),
                    tool: "advice_move_recommender".to_string(),
                },
                RouteRule {
                    pattern: r"\b(show|stats?|abilit(y|ies)|evol\w*|sprites?|types?|info|tell me about|who is|what is|look ?up)\b".to_string(),
                    tool: "pokeapi_get_pokemon".to_string(),
                },
            ],
            fallback: ToolChoice::Any,
        }
    }
}
