use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use pokechat_core::tools::{Tool, ToolError};

use crate::cache::{Clock, TtlLruCache};
use crate::error::RegistryError;

const TOOL_NAME: &str = "pokeapi_get_pokemon";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct PokeApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for PokeApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pokeapi.co/api/v2".to_string(),
            user_agent: "pokechat/0.1".to_string(),
            cache_capacity: 200,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Normalized Pokémon record returned to the model and the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pokemon {
    pub id: u64,
    pub name: String,
    pub types: Vec<String>,
    pub abilities: Vec<String>,
    pub base_stats: BaseStats,
    pub sprite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evolution_chain: Option<Vec<EvolutionStep>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BaseStats {
    pub hp: u32,
    pub atk: u32,
    pub def: u32,
    pub spa: u32,
    pub spd: u32,
    pub spe: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionStep {
    pub name: String,
    pub evolves_to: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PokemonInput {
    pokemon: PokemonRef,
    #[serde(default)]
    include_evolution: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PokemonRef {
    Id(u64),
    Name(String),
}

impl fmt::Display for PokemonRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// `pokeapi_get_pokemon`: fetches and normalizes PokéAPI data, with an
/// optional flattened evolution chain.
pub struct PokeApiTool {
    client: reqwest::Client,
    base_url: String,
    cache: TtlLruCache<String, Pokemon>,
}

impl PokeApiTool {
    /// Fails when the HTTP client cannot be built, e.g. for a user agent
    /// that is not a valid header value.
    pub fn new(config: PokeApiConfig, clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RegistryError::ToolSetup {
                tool: TOOL_NAME,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: TtlLruCache::new(config.cache_capacity, config.cache_ttl, clock),
        })
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ToolError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!("HTTP {} fetching {url}", status.as_u16())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("invalid response from {url}: {e}")))
    }

    fn pokemon_url(&self, id_or_name: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ToolError::ExecutionFailed(format!("bad PokéAPI base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::ExecutionFailed("bad PokéAPI base URL".into()))?
            .pop_if_empty()
            .push("pokemon")
            .push(id_or_name);
        Ok(url)
    }

    async fn evolution_chain(&self, species_url: &str) -> Result<Vec<EvolutionStep>, ToolError> {
        let species: RawSpecies = self.fetch_json(species_url).await?;
        let Some(chain_url) = species.evolution_chain.map(|c| c.url) else {
            return Ok(Vec::new());
        };
        let chain: RawChain = self.fetch_json(&chain_url).await?;
        let mut steps = Vec::new();
        flatten_chain(&chain.chain, &mut steps);
        Ok(steps)
    }
}

fn flatten_chain(node: &RawEvoNode, out: &mut Vec<EvolutionStep>) {
    out.push(EvolutionStep {
        name: node.species.name.clone(),
        evolves_to: node.evolves_to.iter().map(|n| n.species.name.clone()).collect(),
    });
    for next in &node.evolves_to {
        flatten_chain(next, out);
    }
}

fn normalize(raw: RawPokemon) -> Pokemon {
    let stat = |name: &str| {
        raw.stats
            .iter()
            .find(|s| s.stat.as_ref().map(|n| n.name.as_str()) == Some(name))
            .map(|s| s.base_stat)
            .unwrap_or(0)
    };
    let base_stats = BaseStats {
        hp: stat("hp"),
        atk: stat("attack"),
        def: stat("defense"),
        spa: stat("special-attack"),
        spd: stat("special-defense"),
        spe: stat("speed"),
    };
    let sprite = raw
        .sprites
        .as_ref()
        .and_then(|s| {
            s.pointer("/other/official-artwork/front_default")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .or_else(|| s.get("front_default").and_then(Value::as_str).filter(|u| !u.is_empty()))
        })
        .map(str::to_string);

    Pokemon {
        id: raw.id,
        name: raw.name,
        types: raw.types.into_iter().filter_map(|t| t.kind.map(|n| n.name)).collect(),
        abilities: raw.abilities.into_iter().filter_map(|a| a.ability.map(|n| n.name)).collect(),
        base_stats,
        sprite,
        evolution_chain: None,
    }
}

#[async_trait]
impl Tool for PokeApiTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Fetch normalized Pokémon data by name or id with optional evolution chain"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pokemon": {
                    "anyOf": [
                        {"type": "string", "minLength": 1},
                        {"type": "integer", "minimum": 0}
                    ],
                    "description": "Name (string) or id (integer) of the Pokémon"
                },
                "includeEvolution": {
                    "type": "boolean",
                    "description": "Include evolution chain data"
                }
            },
            "required": ["pokemon"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: PokemonInput = serde_json::from_value(input)?;
        if let PokemonRef::Name(name) = &input.pokemon {
            if name.trim().is_empty() {
                return Err(ToolError::InvalidInput("pokemon must not be empty".into()));
            }
        }

        let key = format!("{}|{}", input.pokemon, u8::from(input.include_evolution));
        if let Some(hit) = self.cache.get(&key) {
            debug!(%key, "pokeapi cache hit");
            return Ok(serde_json::to_value(hit)?);
        }

        let id_or_name = input.pokemon.to_string().trim().to_lowercase();
        let url = self.pokemon_url(&id_or_name)?;
        let raw: RawPokemon = self.fetch_json(url.as_str()).await?;
        let species_url = raw.species.as_ref().map(|s| s.url.clone());
        let mut pokemon = normalize(raw);

        if input.include_evolution {
            if let Some(species_url) = species_url {
                match self.evolution_chain(&species_url).await {
                    Ok(chain) if !chain.is_empty() => pokemon.evolution_chain = Some(chain),
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "evolution chain unavailable"),
                }
            }
        }

        self.cache.insert(key, pokemon.clone());
        Ok(serde_json::to_value(pokemon)?)
    }
}

// --- PokéAPI response shapes (only the fields we read) ---

#[derive(Deserialize)]
struct RawPokemon {
    id: u64,
    name: String,
    #[serde(default)]
    types: Vec<RawTypeSlot>,
    #[serde(default)]
    abilities: Vec<RawAbilitySlot>,
    #[serde(default)]
    stats: Vec<RawStat>,
    sprites: Option<Value>,
    species: Option<NamedUrl>,
}

#[derive(Deserialize)]
struct RawTypeSlot {
    #[serde(rename = "type")]
    kind: Option<Named>,
}

#[derive(Deserialize)]
struct RawAbilitySlot {
    ability: Option<Named>,
}

#[derive(Deserialize)]
struct RawStat {
    base_stat: u32,
    stat: Option<Named>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct NamedUrl {
    url: String,
}

#[derive(Deserialize)]
struct RawSpecies {
    evolution_chain: Option<NamedUrl>,
}

#[derive(Deserialize)]
struct RawChain {
    chain: RawEvoNode,
}

#[derive(Deserialize)]
struct RawEvoNode {
    species: Named,
    #[serde(default)]
    evolves_to: Vec<RawEvoNode>,
}
