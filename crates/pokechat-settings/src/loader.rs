//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::PokechatSettings;

/// Resolve the path to the settings file (`~/.pokechat/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pokechat").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PokechatSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides, then validate.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PokechatSettings> {
    let defaults = serde_json::to_value(PokechatSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PokechatSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Reject values that deserialize but cannot run.
pub fn validate(settings: &PokechatSettings) -> Result<()> {
    if settings.chat.channel_capacity == 0 {
        return Err(SettingsError::invalid("chat.channelCapacity", "must be at least 1"));
    }
    if settings.tools.pokeapi.cache_capacity == 0 {
        return Err(SettingsError::invalid("tools.pokeapi.cacheCapacity", "must be at least 1"));
    }
    if settings.tools.timeout_secs == Some(0) {
        return Err(SettingsError::invalid("tools.timeoutSecs", "must be positive; omit it to disable"));
    }
    if settings.backend.max_tokens == 0 {
        return Err(SettingsError::invalid("backend.maxTokens", "must be at least 1"));
    }
    if let Some(rule) = settings
        .routing
        .rules
        .iter()
        .find(|r| r.pattern.trim().is_empty() || r.tool.trim().is_empty())
    {
        return Err(SettingsError::invalid(
            "routing.rules",
            format!("rule {:?} -> {:?} needs both a pattern and a tool", rule.pattern, rule.tool),
        ));
    }
    Ok(())
}

pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Invalid values are ignored with a
/// warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut PokechatSettings) {
    if let Some(v) = read_env_string("POKECHAT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("POKECHAT_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("POKECHAT_LOG_LEVEL") {
        settings.logging.level = v;
    }

    if let Some(v) = read_env_string("ANTHROPIC_MODEL") {
        settings.backend.model = v;
    }
    if let Some(v) = read_env_string("ANTHROPIC_VERSION") {
        settings.backend.api_version = v;
    }
    if let Some(v) = read_env_string("ANTHROPIC_BASE_URL") {
        settings.backend.base_url = v;
    }

    if let Some(v) = read_env_string("POKEAPI_BASE_URL") {
        settings.tools.pokeapi.base_url = v;
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RouteRule, RoutingStrategy};
    use pokechat_core::provider::ToolChoice;
    use serde_json::json;

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"port": 3000, "host": "localhost"}});
        let source = json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.tools.pokeapi.cache_capacity, 200);
        assert_eq!(settings.chat.channel_capacity, 64);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"tools": {"timeoutSecs": 10, "pokeapi": {"cacheTtlSecs": 60}}, "routing": {"strategy": "auto", "fallback": {"type": "auto"}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.tools.timeout_secs, Some(10));
        assert_eq!(settings.tools.pokeapi.cache_ttl_secs, 60);
        assert_eq!(settings.tools.pokeapi.cache_capacity, 200);
        assert_eq!(settings.routing.strategy, RoutingStrategy::Auto);
        assert_eq!(settings.routing.fallback, ToolChoice::Auto);
        assert_eq!(settings.routing.rules.len(), 2);
    }

    #[test]
    fn load_rules_array_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"routing": {"rules": [{"pattern": "stats", "tool": "pokeapi_get_pokemon"}]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.routing.rules.len(), 1);
        assert_eq!(settings.routing.rules[0].pattern, "stats");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"chat": {"channelCapacity": 0}}"#).unwrap();

        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "chat.channelCapacity", .. }));
    }

    #[test]
    fn validate_defaults_pass() {
        assert!(validate(&PokechatSettings::default()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut settings = PokechatSettings::default();
        settings.tools.timeout_secs = Some(0);
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::Invalid { field: "tools.timeoutSecs", .. })
        ));

        let mut settings = PokechatSettings::default();
        settings.routing.rules.push(RouteRule {
            pattern: " ".into(),
            tool: "pokeapi_get_pokemon".into(),
        });
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::Invalid { field: "routing.rules", .. })
        ));
    }

    #[test]
    fn unreadable_path_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = load_settings_from_path(dir.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("port", 1, 65535), None);
    }
}
