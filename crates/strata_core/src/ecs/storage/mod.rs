// mod.rs - Storage module exports

mod archetype_storage;
mod column;

pub use archetype_storage::{ArchetypeStorage, MIN_CAPACITY};
pub(crate) use archetype_storage::Migration;
pub(crate) use column::{Column, TypedColumn};
