//! Strata Core
//!
//! Archetype-based entity component storage:
//! - Type registry and type signatures
//! - Generational entity, archetype and world handles
//! - Columnar archetype storage with swap-remove rows
//! - Deferred structural mutation with FIFO replay
//! - Incrementally cached queries

pub mod config;
pub mod ecs;

pub use config::UniverseConfig;
pub use ecs::{
    component_id, component_meta, Archetype, Component, ComponentId, EcsError, Entity, HookId,
    Query, Result, StructuralScope, TypeSignature, Universe, World,
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
