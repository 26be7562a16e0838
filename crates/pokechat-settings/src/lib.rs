//! # pokechat-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PokechatSettings::default()`]
//! 2. **User file**: `~/.pokechat/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `POKECHAT_*`, `ANTHROPIC_*` and `POKEAPI_*` overrides
//!
//! ```no_run
//! use pokechat_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
