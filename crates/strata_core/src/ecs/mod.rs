//! Entity Component System core types.
//!
//! Storage is archetype based: every unique set of component types gets its
//! own dense, column-per-type table. Entities, archetypes and worlds are all
//! plain generational handles into a [`Universe`], which owns the tables.
//! Structural changes made while a world is being iterated are recorded and
//! replayed once the outermost iteration scope ends.

mod archetype;
mod commands;
mod component;
mod entity;
mod error;
mod hooks;
mod query;
mod signature;
pub mod storage;
mod universe;
mod world;

pub use archetype::Archetype;
pub use commands::StructuralScope;
pub use component::{
    component_id, component_meta, component_name, registered_count, Component, ComponentId,
    ComponentMeta, INVALID_COMPONENT,
};
pub use entity::Entity;
pub use error::{EcsError, Handle, Result};
pub use hooks::HookId;
pub use query::Query;
pub use signature::TypeSignature;
pub use universe::Universe;
pub use world::World;

/// Build a [`TypeSignature`] from a list of component types.
///
/// ```ignore
/// let signature = signature![Position, Velocity];
/// ```
#[macro_export]
macro_rules! signature {
    ($($component:ty),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut signature = $crate::ecs::TypeSignature::new();
        $(
            signature.add::<$component>();
        )*
        signature
    }};
}

/// Spawn an entity into a world and set each component in order.
///
/// Evaluates to `Option<Entity>`; `None` when the world handle is stale.
#[macro_export]
macro_rules! spawn {
    ($universe:expr, $world:expr $(, $component:expr)* $(,)?) => {{
        let universe: &mut $crate::ecs::Universe = $universe;
        $world.create_entity(universe).map(|entity| {
            $(
                entity.set(universe, $component);
            )*
            entity
        })
    }};
}
