//! Universe sizing configuration.

use serde::{Deserialize, Serialize};

/// Initial table sizes for a [`Universe`](crate::Universe).
///
/// All values are capacity hints; every table grows on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// World slots reserved up front.
    pub world_capacity: usize,
    /// Archetype slots reserved per world.
    pub archetype_capacity: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            world_capacity: 4,
            archetype_capacity: 32,
        }
    }
}
