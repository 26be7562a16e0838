pub mod chat;
pub mod health;
pub mod server;

pub use health::{DependencyStatus, HealthProbe, HealthReport};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
