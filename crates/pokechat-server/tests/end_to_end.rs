//! Full stack: scripted backend → orchestrator → HTTP server → client decoder.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pokechat_client::{ChatClient, TurnOutcome};
use pokechat_core::errors::GatewayError;
use pokechat_core::messages::{Message, Role};
use pokechat_core::provider::ToolChoice;
use pokechat_core::stream::GenerationEvent;
use pokechat_engine::cache::SystemClock;
use pokechat_engine::tools::{create_default_registry, PokeApiConfig};
use pokechat_engine::{KeywordRouter, Orchestrator, OrchestratorConfig};
use pokechat_llm::{MockBackend, MockResponse};
use pokechat_server::{HealthProbe, ServerConfig, ServerHandle};
use pokechat_settings::RoutingSettings;

async fn pokeapi() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pokemon/pikachu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 25,
            "name": "pikachu",
            "types": [{"type": {"name": "electric"}}],
            "abilities": [{"ability": {"name": "static"}}],
            "stats": [{"base_stat": 90, "stat": {"name": "speed"}}],
            "sprites": {"front_default": "https://img/pika.png"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pokemon/1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn start(backend: Arc<MockBackend>, pokeapi_url: &str) -> ServerHandle {
    let registry = create_default_registry(
        PokeApiConfig {
            base_url: pokeapi_url.to_string(),
            ..PokeApiConfig::default()
        },
        Arc::new(SystemClock),
    )
    .unwrap();
    let routing = RoutingSettings::default();
    let router = KeywordRouter::new(
        routing.rules.iter().map(|r| (r.pattern.as_str(), r.tool.as_str())),
        routing.fallback,
    )
    .unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        backend.clone(),
        Arc::new(registry),
        Arc::new(router),
        OrchestratorConfig {
            system_prompt: Some("You are PokéChat.".into()),
            tool_timeout: Some(Duration::from_secs(10)),
        },
    ));
    let health = HealthProbe::new(backend, pokeapi_url, Duration::from_secs(2));
    pokechat_server::start(
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        },
        orchestrator,
        health,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn lookup_turn_reaches_client_with_placeholder() {
    let pokeapi = pokeapi().await;
    let backend = Arc::new(MockBackend::new(vec![MockResponse::tool_call(
        "pokeapi_get_pokemon",
        json!({"pokemon": "pikachu"}),
    )]));
    let server = start(backend.clone(), &pokeapi.uri()).await;

    let client = ChatClient::new(&server.base_url()).unwrap();
    let result = client
        .send(&[Message::user("show me pikachu")], CancellationToken::new())
        .await;

    assert_eq!(result.outcome, TurnOutcome::Completed);
    assert_eq!(result.message.content, "Here's the Pokémon information you requested:");
    let call = &result.message.tool_calls[0];
    assert_eq!(call.tool_name, "pokeapi_get_pokemon");
    assert_eq!(call.result.as_ref().map(|r| r.ok), Some(true));
    let data = &result.message.tool_results[0].data;
    assert_eq!(data["id"], 25);
    assert_eq!(data["baseStats"]["spe"], 90);
    assert_eq!(data["sprite"], "https://img/pika.png");
    assert_eq!(result.orphaned_results, 0);

    let request = &backend.requests()[0];
    assert_eq!(request.tool_choice, ToolChoice::tool("pokeapi_get_pokemon"));
    assert_eq!(request.system.as_deref(), Some("You are PokéChat."));
    assert_eq!(request.tools.len(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn follow_up_turn_carries_previous_answer() {
    let pokeapi = pokeapi().await;
    let backend = Arc::new(MockBackend::new(vec![
        MockResponse::text_chunks(&["Pikachu is ", "an Electric type."]),
        MockResponse::text("Raichu."),
    ]));
    let server = start(backend.clone(), &pokeapi.uri()).await;
    let client = ChatClient::new(&server.base_url()).unwrap();

    let mut history = vec![Message::user("hello")];
    let first = client.send(&history, CancellationToken::new()).await;
    assert_eq!(first.outcome, TurnOutcome::Completed);
    history.push(first.message.to_message());
    history.push(Message::user("and its evolution?"));

    let second = client.send(&history, CancellationToken::new()).await;
    assert_eq!(second.message.content, "Raichu.");

    assert_eq!(backend.call_count(), 2);
    let sent = &backend.requests()[1].messages;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].role, Role::Assistant);
    assert_eq!(sent[1].content, "Pikachu is an Electric type.");
    assert_eq!(sent[1].id, first.message.id);

    server.shutdown().await;
}

#[tokio::test]
async fn backend_failure_surfaces_as_failed_turn() {
    let pokeapi = pokeapi().await;
    let backend = Arc::new(MockBackend::new(vec![MockResponse::text_then_error(
        &["Pika", "chu is"],
        GatewayError::StreamInterrupted("connection reset".into()),
    )]));
    let server = start(backend, &pokeapi.uri()).await;

    let result = ChatClient::new(&server.base_url())
        .unwrap()
        .send(&[Message::user("hello")], CancellationToken::new())
        .await;

    assert_eq!(
        result.outcome,
        TurnOutcome::Failed("stream interrupted: connection reset".into())
    );
    assert_eq!(result.message.content, "Pikachu is");

    server.shutdown().await;
}

#[tokio::test]
async fn client_stop_ends_turn_gracefully() {
    let pokeapi = pokeapi().await;
    let backend = Arc::new(MockBackend::new(vec![MockResponse::Hang(vec![GenerationEvent::TextDelta {
        delta: "Thinking".into(),
    }])]));
    let server = start(backend, &pokeapi.uri()).await;

    let cancel = CancellationToken::new();
    let client = ChatClient::new(&server.base_url()).unwrap();
    let stop = cancel.clone();
    let result = client
        .send_streaming(&[Message::user("hello")], cancel, move |_, decoder| {
            if decoder.message().content == "Thinking" {
                stop.cancel();
            }
        })
        .await;

    assert_eq!(result.outcome, TurnOutcome::Stopped);
    assert_eq!(result.message.content, "Thinking");
    assert!(result.errors.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn health_endpoint_reports_dependencies() {
    let pokeapi = pokeapi().await;
    let server = start(Arc::new(MockBackend::new(vec![])), &pokeapi.uri()).await;

    let resp = reqwest::get(format!("{}/api/health", server.base_url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["backend"]["ok"], true);
    assert_eq!(body["pokeapi"]["ok"], true);

    server.shutdown().await;
}
