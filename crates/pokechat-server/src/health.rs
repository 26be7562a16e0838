use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use pokechat_core::provider::GenerationBackend;

use crate::server::AppState;

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DependencyStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyStatus {
    fn healthy() -> Self {
        Self { ok: true, error: None }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub backend: DependencyStatus,
    pub pokeapi: DependencyStatus,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.backend.ok && self.pokeapi.ok
    }
}

/// Probes the model backend and PokéAPI concurrently, each under its own timeout.
pub struct HealthProbe {
    backend: Arc<dyn GenerationBackend>,
    client: reqwest::Client,
    pokeapi_url: String,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(backend: Arc<dyn GenerationBackend>, pokeapi_base_url: &str, timeout: Duration) -> Self {
        Self {
            backend,
            client: reqwest::Client::new(),
            pokeapi_url: format!("{}/pokemon/1", pokeapi_base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let backend = async { self.backend.ping().await.map_err(|e| e.to_string()) };
        let (backend, pokeapi) = tokio::join!(
            bounded(self.timeout, backend),
            bounded(self.timeout, self.ping_pokeapi())
        );
        HealthReport {
            backend,
            pokeapi,
            checked_at: Utc::now(),
        }
    }

    async fn ping_pokeapi(&self) -> Result<(), String> {
        let resp = self
            .client
            .get(&self.pokeapi_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", resp.status().as_u16()))
        }
    }
}

async fn bounded<F>(limit: Duration, check: F) -> DependencyStatus
where
    F: Future<Output = Result<(), String>>,
{
    match tokio::time::timeout(limit, check).await {
        Ok(Ok(())) => DependencyStatus::healthy(),
        Ok(Err(e)) => DependencyStatus::unhealthy(e),
        Err(_) => DependencyStatus::unhealthy(format!("timed out after {}ms", limit.as_millis())),
    }
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        warn!(backend = ?report.backend.error, pokeapi = ?report.pokeapi.error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
