use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level {value:?} for {target}")]
    InvalidLevel { target: String, value: String },
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "pokechat_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from textual levels, as found in settings files.
    pub fn from_levels<'a, I>(level: &str, modules: I, json: bool) -> Result<Self, TelemetryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let log_level = parse_level("default", level)?;
        let mut module_levels = modules
            .into_iter()
            .map(|(module, lvl)| Ok((module.to_string(), parse_level(module, lvl)?)))
            .collect::<Result<Vec<_>, TelemetryError>>()?;
        module_levels.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self {
            log_level,
            module_levels,
            json,
        })
    }

    /// The `EnvFilter` directive string this config describes.
    pub fn filter_directive(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

fn parse_level(target: &str, value: &str) -> Result<Level, TelemetryError> {
    Level::from_str(value.trim()).map_err(|_| TelemetryError::InvalidLevel {
        target: target.to_string(),
        value: value.to_string(),
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_includes_module_overrides() {
        let config =
            TelemetryConfig::from_levels("warn", [("pokechat_llm", "debug"), ("pokechat_engine", "TRACE")], true)
                .unwrap();
        assert_eq!(config.filter_directive(), "warn,pokechat_engine=trace,pokechat_llm=debug");
        assert!(config.json);
    }

    #[test]
    fn default_directive_is_info() {
        assert_eq!(TelemetryConfig::default().filter_directive(), "info");
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = TelemetryConfig::from_levels("loud", std::iter::empty(), false).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidLevel { ref value, .. } if value == "loud"));

        let err = TelemetryConfig::from_levels("info", [("pokechat_server", "chatty")], false).unwrap_err();
        assert!(err.to_string().contains("pokechat_server"));
    }
}
