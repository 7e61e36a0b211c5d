use std::fmt;

use thiserror::Error;

use super::archetype::Archetype;
use super::entity::Entity;
use super::world::World;

/// Any handle an operation can be handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Entity(Entity),
    Archetype(Archetype),
    World(World),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Entity(entity) => entity.fmt(f),
            Handle::Archetype(archetype) => archetype.fmt(f),
            Handle::World(world) => world.fmt(f),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EcsError {
    #[error("{handle} is stale or was never created")]
    StaleHandle { handle: Handle },

    #[error("{entity} has no {component} component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("entity id {index} is already in use")]
    DuplicateExplicitId { index: u32 },

    #[error("{world} has no {data} data")]
    MissingWorldData { world: World, data: &'static str },
}

pub type Result<T> = std::result::Result<T, EcsError>;
