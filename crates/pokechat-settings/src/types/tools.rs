//! Tool settings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Upper bound on a single tool execution. `None` leaves tools unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub pokeapi: PokeApiSettings,
}

/// Settings for the `pokeapi_get_pokemon` tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PokeApiSettings {
    pub base_url: String,
    pub user_agent: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for PokeApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://pokeapi.co/api/v2".to_string(),
            user_agent: "pokechat/0.1".to_string(),
            cache_capacity: 200,
            cache_ttl_secs: 300,
        }
    }
}
