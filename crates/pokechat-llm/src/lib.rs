pub mod auth;
pub mod converter;
pub mod mock;
pub mod provider;
pub mod sse;

pub use auth::{ApiKey, ApiKeyError};
pub use mock::{MockBackend, MockResponse};
pub use provider::{AnthropicBackend, AnthropicConfig};
