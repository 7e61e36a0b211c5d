// component.rs - Runtime component registration
//
// Components are identified by dense u32 IDs handed out the first time a
// Rust type is used as a component. ID 0 is reserved as "no component".

use once_cell::sync::Lazy;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::entity::Entity;
use super::storage::{Column, TypedColumn};
use super::universe::Universe;

pub type ComponentId = u32;

/// Never assigned to a type.
pub const INVALID_COMPONENT: ComponentId = 0;

/// Anything stored in an archetype column.
///
/// Rows created without an explicit value (for example by
/// [`Archetype::create_entity`](super::Archetype::create_entity)) start out
/// as `T::default()`.
pub trait Component: Any + Default {}

impl<T: Any + Default> Component for T {}

/// Metadata and type-erased helpers for one registered component type.
#[derive(Clone, Copy)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub(crate) new_column: fn(ComponentId) -> Box<dyn Column>,
    pub(crate) replay_set: fn(&mut Universe, Entity, Box<dyn Any>),
}

impl std::fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl ComponentMeta {
    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        short_name(self.name)
    }
}

struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    // index = id - 1
    metas: Vec<ComponentMeta>,
}

static REGISTRY: Lazy<RwLock<ComponentRegistry>> = Lazy::new(|| {
    RwLock::new(ComponentRegistry {
        by_type: HashMap::new(),
        metas: Vec::new(),
    })
});

/// ID for `T`, registering it on first use.
pub fn component_id<T: Component>() -> ComponentId {
    let key = TypeId::of::<T>();
    if let Some(&id) = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_type
        .get(&key)
    {
        return id;
    }

    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    // Another caller may have registered between the two locks.
    if let Some(&id) = registry.by_type.get(&key) {
        return id;
    }
    let id = ComponentId::try_from(registry.metas.len() + 1)
        .expect("component id space exhausted");
    registry.metas.push(ComponentMeta {
        id,
        name: type_name::<T>(),
        new_column: new_column::<T>,
        replay_set: replay_set::<T>,
    });
    registry.by_type.insert(key, id);
    tracing::trace!(id, name = type_name::<T>(), "registered component");
    id
}

/// Look up component metadata by ID.
pub fn component_meta(id: ComponentId) -> Option<ComponentMeta> {
    let index = (id as usize).checked_sub(1)?;
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .metas
        .get(index)
        .copied()
}

/// Short type name for `id`, or `"<unregistered>"`.
pub fn component_name(id: ComponentId) -> &'static str {
    component_meta(id).map_or("<unregistered>", |meta| meta.short_name())
}

/// Number of registered component types.
pub fn registered_count() -> usize {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .metas
        .len()
}

fn new_column<T: Component>(id: ComponentId) -> Box<dyn Column> {
    Box::new(TypedColumn::<T>::new(id))
}

fn replay_set<T: Component>(universe: &mut Universe, entity: Entity, value: Box<dyn Any>) {
    if let Ok(value) = value.downcast::<T>() {
        universe.set_component(entity, *value);
    }
}

fn short_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        // keep generic arguments intact, only strip the leading path
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
