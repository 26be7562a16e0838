//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs to name the values it changes.

mod backend;
mod server;
mod tools;

pub use backend::*;
pub use server::*;
pub use tools::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "routing": { "fallback": { "type": "auto" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PokechatSettings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub routing: RoutingSettings,
    pub tools: ToolSettings,
    pub logging: LoggingSettings,
    pub chat: ChatSettings,
}
