use secrecy::{ExposeSecret, SecretString};

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiKeyError {
    #[error("ANTHROPIC_API_KEY not set")]
    Missing,
    #[error("ANTHROPIC_API_KEY contains line breaks - check your environment file")]
    LineBreak,
}

/// Anthropic API key. Never printed; `Debug` is redacted by `secrecy`.
#[derive(Debug)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, ApiKeyError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ApiKeyError::Missing);
        }
        if raw.contains('\n') || raw.contains('\r') {
            return Err(ApiKeyError::LineBreak);
        }
        Ok(Self(SecretString::from(raw)))
    }

    pub fn from_env() -> Result<Self, ApiKeyError> {
        let raw = std::env::var(API_KEY_ENV).map_err(|_| ApiKeyError::Missing)?;
        Self::new(raw)
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}
