use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pokechat_engine::Orchestrator;

use crate::chat::chat_handler;
use crate::health::{health_handler, HealthProbe};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Capacity of each turn's event channel.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
            channel_capacity: 64,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub health: Arc<HealthProbe>,
    pub channel_capacity: usize,
    /// Parent of every turn's cancellation token.
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}

/// Bind and start serving. Port 0 picks a free port.
pub async fn start(
    config: ServerConfig,
    orchestrator: Arc<Orchestrator>,
    health: HealthProbe,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = CancellationToken::new();
    let state = AppState {
        orchestrator,
        health: Arc::new(health),
        channel_capacity: config.channel_capacity,
        shutdown: shutdown.clone(),
    };
    let router = build_router(state, &config.cors_origins);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "PokéChat server started");

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            warn!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        host: config.host,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    host: String,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Cancel in-flight turns, stop accepting connections and wait for the
    /// server task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pokechat_core::codec::FrameDecoder;
    use pokechat_core::events::OutboundEvent;
    use pokechat_engine::tools::MoveRecommenderTool;
    use pokechat_engine::{AutoRouter, OrchestratorConfig, ToolRegistry};
    use pokechat_llm::{MockBackend, MockResponse};
    use serde_json::json;

    async fn start_with(responses: Vec<MockResponse>) -> ServerHandle {
        let backend = Arc::new(MockBackend::new(responses));
        let mut builder = ToolRegistry::builder();
        builder.register(Arc::new(MoveRecommenderTool)).unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            backend.clone(),
            Arc::new(builder.build()),
            Arc::new(AutoRouter),
            OrchestratorConfig::default(),
        ));
        // Nothing listens on port 9; PokéAPI is reported unhealthy.
        let health = HealthProbe::new(backend, "http://127.0.0.1:9", Duration::from_millis(500));
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        start(config, orchestrator, health).await.unwrap()
    }

    fn decode(body: &[u8]) -> Vec<OutboundEvent> {
        let mut decoder = FrameDecoder::new();
        decoder.push(body).into_iter().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn chat_streams_sse_events() {
        let handle = start_with(vec![MockResponse::tool_call(
            "advice_move_recommender",
            json!({"opponentTypes": ["water", "flying"], "topK": 2}),
        )])
        .await;

        let resp = reqwest::Client::new()
            .post(format!("{}/api/chat", handle.base_url()))
            .json(&json!({"messages": [{"role": "user", "content": "what beats gyarados?"}]}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let headers = resp.headers();
        assert_eq!(headers["content-type"], "text/event-stream; charset=utf-8");
        assert_eq!(headers["cache-control"], "no-cache, no-transform");
        assert_eq!(headers["x-accel-buffering"], "no");

        let events = decode(&resp.bytes().await.unwrap());
        let tags: Vec<_> = events.iter().map(OutboundEvent::event_type).collect();
        assert_eq!(tags, vec!["tool_call", "tool_result", "done"]);
        let OutboundEvent::ToolResult { ok, data, .. } = &events[1] else {
            panic!("expected tool_result");
        };
        assert!(*ok);
        assert_eq!(data.as_ref().unwrap()[0]["type"], "electric");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn chat_rejects_invalid_bodies() {
        let handle = start_with(vec![]).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/chat", handle.base_url());

        for body in [json!({}), json!({"messages": "hi"}), json!({"messages": [{"role": "robot", "content": "x"}]})] {
            let resp = client.post(&url).json(&body).send().await.unwrap();
            assert_eq!(resp.status(), 400, "body {body}");
            let json: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(json, json!({"error": "Invalid body: messages[] required"}));
        }

        let resp = client
            .post(&url)
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn backend_failure_still_ends_with_done() {
        let handle = start_with(vec![MockResponse::Error(
            pokechat_core::errors::GatewayError::RateLimited,
        )])
        .await;

        let resp = reqwest::Client::new()
            .post(format!("{}/api/chat", handle.base_url()))
            .json(&json!({"messages": []}))
            .send()
            .await
            .unwrap();
        let events = decode(&resp.bytes().await.unwrap());
        assert_eq!(events, vec![OutboundEvent::error("rate limited"), OutboundEvent::Done]);
    }

    #[tokio::test]
    async fn health_reports_unhealthy_dependency() {
        let handle = start_with(vec![]).await;

        let resp = reqwest::get(format!("{}/api/health", handle.base_url())).await.unwrap();
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["backend"]["ok"], true);
        assert_eq!(body["pokeapi"]["ok"], false);
        assert!(body["pokeapi"]["error"].is_string());
    }

    #[tokio::test]
    async fn shutdown_cancels_open_streams() {
        let handle = start_with(vec![MockResponse::Hang(vec![])]).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/api/chat", handle.base_url()))
            .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let shutdown = tokio::spawn(handle.shutdown());
        let events = decode(&resp.bytes().await.unwrap());
        assert_eq!(events, vec![OutboundEvent::Done]);
        shutdown.await.unwrap();
    }

    #[test]
    fn invalid_cors_origins_are_skipped() {
        let _layer = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
    }
}
