//! Server, logging, and chat settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence over all of these.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level for every target.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"pokechat_llm": "debug"}`.
    pub modules: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: HashMap::new(),
        }
    }
}

/// Per-turn chat behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// System instruction lines, joined with `" \n"` before sending.
    pub system_prompt_lines: Vec<String>,
    /// Capacity of the outbound event channel per turn.
    pub channel_capacity: usize,
    /// Per-dependency timeout for the health probe.
    pub health_timeout_ms: u64,
}

impl ChatSettings {
    pub fn system_prompt(&self) -> String {
        self.system_prompt_lines.join(" \n")
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            system_prompt_lines: vec![
                "You are PokéChat, a helpful Pokédex assistant.".to_string(),
                "CRITICAL: For any Pokémon facts (types, stats, abilities, evolutions, sprites), ALWAYS call the 'pokeapi_get_pokemon' tool and ground the answer in its returned data. Do not rely on memory.".to_string(),
                "For matchup advice, prefer calling 'advice_move_recommender' with the opponent types and summarize the top results.".to_string(),
                "Be concise and format lists clearly.".to_string(),
            ],
            channel_capacity: 64,
            health_timeout_ms: 4000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_joins_lines() {
        let chat = ChatSettings {
            system_prompt_lines: vec!["a".into(), "b".into()],
            ..ChatSettings::default()
        };
        assert_eq!(chat.system_prompt(), "a \nb");
    }

    #[test]
    fn partial_logging_json_keeps_defaults() {
        let logging: LoggingSettings = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert!(logging.json);
        assert_eq!(logging.level, "info");
    }
}
