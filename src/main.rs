use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pokechat_client::{ChatClient, TurnOutcome};
use pokechat_core::events::OutboundEvent;
use pokechat_core::messages::{latest_user_content, Message};
use pokechat_core::provider::{GenerationBackend, GenerationRequest, ToolChoice};
use pokechat_engine::cache::SystemClock;
use pokechat_engine::tools::{create_default_registry, moves, PokeApiConfig};
use pokechat_engine::{AutoRouter, KeywordRouter, Orchestrator, OrchestratorConfig, ToolRouter};
use pokechat_llm::{AnthropicBackend, AnthropicConfig, ApiKey, MockBackend, MockResponse};
use pokechat_server::{HealthProbe, ServerConfig};
use pokechat_settings::{load_settings, load_settings_from_path, PokechatSettings, RoutingStrategy};
use pokechat_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "pokechat", version, about = "Streaming Pokédex chat with tool calling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat server.
    Serve {
        /// Settings file (defaults to ~/.pokechat/settings.json).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen port, overriding settings.
        #[arg(long)]
        port: Option<u16>,
        /// Use a scripted backend instead of the Anthropic API.
        #[arg(long)]
        mock: bool,
    },
    /// Send one prompt to a running server and stream the answer.
    Ask {
        prompt: String,
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve { config, port, mock } => serve(config, port, mock).await,
        Command::Ask { prompt, url } => ask(&prompt, &url).await,
    }
}

async fn serve(config: Option<PathBuf>, port: Option<u16>, mock: bool) -> Result<()> {
    let mut settings = match &config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(port) = port {
        settings.server.port = port;
    }

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings.logging.modules.iter().map(|(m, l)| (m.as_str(), l.as_str())),
        settings.logging.json,
    )?;
    init_telemetry(&telemetry)?;

    let backend: Arc<dyn GenerationBackend> = if mock {
        info!("using scripted mock backend");
        Arc::new(mock_backend())
    } else {
        let api_key = ApiKey::from_env()?;
        Arc::new(AnthropicBackend::new(
            api_key,
            AnthropicConfig {
                base_url: settings.backend.base_url.clone(),
                model: settings.backend.model.clone(),
                api_version: settings.backend.api_version.clone(),
                max_tokens: settings.backend.max_tokens,
                idle_timeout: Duration::from_secs(settings.backend.idle_timeout_secs),
            },
        )?)
    };

    let orchestrator = Arc::new(build_orchestrator(&settings, backend.clone())?);
    let health = HealthProbe::new(
        backend,
        &settings.tools.pokeapi.base_url,
        Duration::from_millis(settings.chat.health_timeout_ms),
    );
    let server_config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        cors_origins: settings.server.cors_origins.clone(),
        channel_capacity: settings.chat.channel_capacity,
    };

    let handle = pokechat_server::start(server_config, orchestrator, health)
        .await
        .context("failed to start server")?;
    info!(url = %handle.base_url(), "PokéChat ready");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn build_orchestrator(settings: &PokechatSettings, backend: Arc<dyn GenerationBackend>) -> Result<Orchestrator> {
    let pokeapi = &settings.tools.pokeapi;
    let registry = create_default_registry(
        PokeApiConfig {
            base_url: pokeapi.base_url.clone(),
            user_agent: pokeapi.user_agent.clone(),
            cache_capacity: pokeapi.cache_capacity,
            cache_ttl: Duration::from_secs(pokeapi.cache_ttl_secs),
        },
        Arc::new(SystemClock),
    )?;

    let router: Arc<dyn ToolRouter> = match settings.routing.strategy {
        RoutingStrategy::Keyword => Arc::new(KeywordRouter::new(
            settings.routing.rules.iter().map(|r| (r.pattern.as_str(), r.tool.as_str())),
            settings.routing.fallback.clone(),
        )?),
        RoutingStrategy::Auto => Arc::new(AutoRouter),
    };

    let system_prompt = settings.chat.system_prompt();
    let config = OrchestratorConfig {
        system_prompt: (!system_prompt.is_empty()).then_some(system_prompt),
        tool_timeout: settings.tools.timeout_secs.map(Duration::from_secs),
    };
    Ok(Orchestrator::new(backend, Arc::new(registry), router, config))
}

/// Offline backend for `serve --mock`: calls whichever tool the router forced,
/// with input guessed from the prompt, and otherwise answers with canned text.
fn mock_backend() -> MockBackend {
    MockBackend::with_responder(|request: &GenerationRequest| {
        let prompt = latest_user_content(&request.messages).unwrap_or_default().to_lowercase();
        let words: Vec<&str> = prompt
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .collect();

        match &request.tool_choice {
            ToolChoice::Tool { name } if name == "pokeapi_get_pokemon" => {
                let pokemon = words.last().copied().unwrap_or("pikachu");
                MockResponse::tool_call(name, json!({ "pokemon": pokemon }))
            }
            ToolChoice::Tool { name } if name == "advice_move_recommender" => {
                let mut types: Vec<&str> = words.iter().copied().filter(|w| moves::is_known_type(w)).collect();
                if types.is_empty() {
                    types.push("normal");
                }
                MockResponse::tool_call(name, json!({ "opponentTypes": types }))
            }
            _ => MockResponse::text_chunks(&["(mock) ", "Ask me to show a Pokémon ", "or what beats a type."]),
        }
    })
}

async fn ask(prompt: &str, url: &str) -> Result<()> {
    let client = ChatClient::new(url)?;
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let mut streamed_text = false;
    let result = client
        .send_streaming(&[Message::user(prompt)], cancel, |event, _| match event {
            OutboundEvent::Text { delta } => {
                streamed_text = true;
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            OutboundEvent::ToolCall { tool_name, input, .. } => eprintln!("[tool] {tool_name} {input}"),
            OutboundEvent::ToolResult {
                tool_name, ok: false, error, ..
            } => eprintln!("[tool] {tool_name} failed: {}", error.as_deref().unwrap_or("unknown error")),
            _ => {}
        })
        .await;

    if !streamed_text && !result.message.content.is_empty() {
        print!("{}", result.message.content);
    }
    println!();
    for item in &result.message.tool_results {
        println!("{}", serde_json::to_string_pretty(&item.data)?);
    }

    match result.outcome {
        TurnOutcome::Completed => Ok(()),
        TurnOutcome::Stopped => {
            eprintln!("stopped");
            Ok(())
        }
        TurnOutcome::Failed(message) => bail!(message),
    }
}
