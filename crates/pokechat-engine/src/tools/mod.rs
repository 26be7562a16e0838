pub mod moves;
pub mod pokemon;

use std::sync::Arc;

use crate::cache::Clock;
use crate::error::RegistryError;
use crate::registry::ToolRegistry;

pub use moves::MoveRecommenderTool;
pub use pokemon::{PokeApiConfig, PokeApiTool};

/// Registry with both built-in tools.
pub fn create_default_registry(pokeapi: PokeApiConfig, clock: Arc<dyn Clock>) -> Result<ToolRegistry, RegistryError> {
    let mut builder = ToolRegistry::builder();
    builder
        .register(Arc::new(PokeApiTool::new(pokeapi, clock)?))?
        .register(Arc::new(MoveRecommenderTool))?;
    Ok(builder.build())
}
