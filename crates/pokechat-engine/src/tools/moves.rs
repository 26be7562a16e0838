use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pokechat_core::tools::{Tool, ToolError};

const MAX_TOP_K: usize = 10;

fn default_top_k() -> usize {
    5
}

/// Attacking types in chart order. Ties in the ranking keep this order.
pub const TYPES: [&str; 18] = [
    "normal", "fire", "water", "electric", "grass", "ice", "fighting", "poison", "ground", "flying", "psychic", "bug",
    "rock", "ghost", "dragon", "dark", "steel", "fairy",
];

/// Non-neutral matchups per attacking type. Anything absent is 1×.
const CHART: [(&str, &[(&str, f64)]); 18] = [
    ("normal", &[("rock", 0.5), ("ghost", 0.0), ("steel", 0.5)]),
    (
        "fire",
        &[
            ("fire", 0.5),
            ("water", 0.5),
            ("grass", 2.0),
            ("ice", 2.0),
            ("bug", 2.0),
            ("rock", 0.5),
            ("dragon", 0.5),
            ("steel", 2.0),
        ],
    ),
    (
        "water",
        &[("fire", 2.0), ("water", 0.5), ("grass", 0.5), ("ground", 2.0), ("rock", 2.0), ("dragon", 0.5)],
    ),
    (
        "electric",
        &[("water", 2.0), ("electric", 0.5), ("grass", 0.5), ("ground", 0.0), ("flying", 2.0), ("dragon", 0.5)],
    ),
    (
        "grass",
        &[
            ("fire", 0.5),
            ("water", 2.0),
            ("grass", 0.5),
            ("poison", 0.5),
            ("ground", 2.0),
            ("flying", 0.5),
            ("bug", 0.5),
            ("rock", 2.0),
            ("dragon", 0.5),
            ("steel", 0.5),
        ],
    ),
    (
        "ice",
        &[
            ("fire", 0.5),
            ("water", 0.5),
            ("grass", 2.0),
            ("ice", 0.5),
            ("ground", 2.0),
            ("flying", 2.0),
            ("dragon", 2.0),
            ("steel", 0.5),
        ],
    ),
    (
        "fighting",
        &[
            ("normal", 2.0),
            ("ice", 2.0),
            ("poison", 0.5),
            ("flying", 0.5),
            ("psychic", 0.5),
            ("bug", 0.5),
            ("rock", 2.0),
            ("ghost", 0.0),
            ("dark", 2.0),
            ("steel", 2.0),
            ("fairy", 0.5),
        ],
    ),
    (
        "poison",
        &[
            ("grass", 2.0),
            ("poison", 0.5),
            ("ground", 0.5),
            ("rock", 0.5),
            ("ghost", 0.5),
            ("steel", 0.0),
            ("fairy", 2.0),
        ],
    ),
    (
        "ground",
        &[
            ("fire", 2.0),
            ("electric", 2.0),
            ("grass", 0.5),
            ("poison", 2.0),
            ("flying", 0.0),
            ("bug", 0.5),
            ("rock", 2.0),
            ("steel", 2.0),
        ],
    ),
    (
        "flying",
        &[("electric", 0.5), ("grass", 2.0), ("fighting", 2.0), ("bug", 2.0), ("rock", 0.5), ("steel", 0.5)],
    ),
    ("psychic", &[("fighting", 2.0), ("poison", 2.0), ("psychic", 0.5), ("dark", 0.0), ("steel", 0.5)]),
    (
        "bug",
        &[
            ("fire", 0.5),
            ("grass", 2.0),
            ("fighting", 0.5),
            ("poison", 0.5),
            ("flying", 0.5),
            ("psychic", 2.0),
            ("ghost", 0.5),
            ("dark", 2.0),
            ("steel", 0.5),
            ("fairy", 0.5),
        ],
    ),
    (
        "rock",
        &[
            ("fire", 2.0),
            ("ice", 2.0),
            ("fighting", 0.5),
            ("ground", 0.5),
            ("flying", 2.0),
            ("bug", 2.0),
            ("steel", 0.5),
        ],
    ),
    ("ghost", &[("normal", 0.0), ("psychic", 2.0), ("ghost", 2.0), ("dark", 0.5)]),
    ("dragon", &[("dragon", 2.0), ("steel", 0.5), ("fairy", 0.0)]),
    ("dark", &[("fighting", 0.5), ("psychic", 2.0), ("ghost", 2.0), ("dark", 0.5), ("fairy", 0.5)]),
    (
        "steel",
        &[
            ("fire", 0.5),
            ("water", 0.5),
            ("electric", 0.5),
            ("ice", 2.0),
            ("rock", 2.0),
            ("steel", 0.5),
            ("fairy", 2.0),
        ],
    ),
    (
        "fairy",
        &[("fire", 0.5), ("fighting", 2.0), ("poison", 0.5), ("dragon", 2.0), ("dark", 2.0), ("steel", 0.5)],
    ),
];

pub fn is_known_type(name: &str) -> bool {
    TYPES.contains(&name)
}

/// Damage multiplier of one attacking type against one defending type.
pub fn effectiveness(attacker: &str, defender: &str) -> f64 {
    CHART
        .iter()
        .find(|(a, _)| *a == attacker)
        .and_then(|(_, row)| row.iter().find(|(d, _)| *d == defender))
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub attack_type: String,
    pub multiplier: f64,
    pub rationale: String,
}

/// Attacking types ranked by combined multiplier against `opponent`.
/// Unknown opponent types are ignored and immune matchups are dropped.
pub fn recommend(opponent: &[String], top_k: usize) -> Vec<Recommendation> {
    let defenders: Vec<&str> = opponent.iter().map(String::as_str).filter(|t| is_known_type(t)).collect();
    let label = if defenders.is_empty() {
        "unknown types".to_string()
    } else {
        defenders.join("/")
    };

    let mut ranked: Vec<Recommendation> = TYPES
        .iter()
        .filter_map(|attacker| {
            let multiplier: f64 = defenders.iter().map(|d| effectiveness(attacker, d)).product();
            if multiplier == 0.0 {
                return None;
            }
            let verdict = if multiplier > 1.0 {
                "super-effective"
            } else if multiplier < 1.0 {
                "not very effective"
            } else {
                "neutral"
            };
            Some(Recommendation {
                attack_type: attacker.to_string(),
                multiplier,
                rationale: format!("{attacker} is {verdict} ({multiplier}×) against {label}"),
            })
        })
        .collect();

    // Stable sort keeps chart order for equal multipliers.
    ranked.sort_by(|a, b| b.multiplier.total_cmp(&a.multiplier));
    ranked.truncate(top_k);
    ranked
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecommendInput {
    opponent_types: Vec<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

/// `advice_move_recommender`: ranks attacking types against a defender.
#[derive(Clone, Copy, Debug, Default)]
pub struct MoveRecommenderTool;

#[async_trait]
impl Tool for MoveRecommenderTool {
    fn name(&self) -> &str {
        "advice_move_recommender"
    }

    fn description(&self) -> &str {
        "Recommend attacking types vs opponent types"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "opponentTypes": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "minItems": 1,
                    "description": "Defending Pokémon's types, e.g. [\"water\", \"flying\"]"
                },
                "topK": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TOP_K,
                    "description": "How many attacking types to return (default 5)"
                }
            },
            "required": ["opponentTypes"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: RecommendInput = serde_json::from_value(input)?;
        if input.opponent_types.is_empty() {
            return Err(ToolError::InvalidInput("opponentTypes must contain at least one type".into()));
        }
        if !(1..=MAX_TOP_K).contains(&input.top_k) {
            return Err(ToolError::InvalidInput(format!("topK must be between 1 and {MAX_TOP_K}")));
        }
        let opponent = input
            .opponent_types
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect::<Vec<_>>();
        if opponent.iter().any(String::is_empty) {
            return Err(ToolError::InvalidInput("opponentTypes entries must not be empty".into()));
        }
        Ok(serde_json::to_value(recommend(&opponent, input.top_k))?)
    }
}
