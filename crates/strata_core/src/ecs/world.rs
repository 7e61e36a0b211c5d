// world.rs - World handle and per-world state
//
// A world owns its archetypes (memoized by signature), world data, component
// hooks and the command log used while structural changes are deferred.
// Entities live in the universe-wide entity table and point back into a
// world's archetype rows.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use strata_metrics::Counter;

use super::archetype::Archetype;
use super::commands::CommandLog;
use super::component::{component_meta, Component};
use super::entity::Entity;
use super::error::{EcsError, Handle, Result};
use super::hooks::{HookId, HookTable};
use super::query::Query;
use super::signature::TypeSignature;
use super::storage::{ArchetypeStorage, Migration};
use super::universe::Universe;

/// Counter names recorded per world.
pub(crate) mod counters {
    pub const ENTITIES_CREATED: &str = "entities_created";
    pub const ENTITIES_DESTROYED: &str = "entities_destroyed";
    pub const ROWS_MIGRATED: &str = "rows_migrated";
    pub const COMMANDS_DEFERRED: &str = "commands_deferred";
    pub const COMMANDS_REPLAYED: &str = "commands_replayed";
    pub const ARCHETYPES_CREATED: &str = "archetypes_created";
    pub const ARCHETYPES_DESTROYED: &str = "archetypes_destroyed";
}

/// World handle (generation-indexed)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct World {
    index: u32,
    generation: u32,
}

impl World {
    /// Never valid.
    pub const NULL: World = World::new(0, 0);

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_valid(self, universe: &Universe) -> bool {
        universe.worlds.get(self).is_some()
    }

    pub fn name(self, universe: &Universe) -> Option<&str> {
        universe.worlds.get(self).map(|state| state.name.as_str())
    }

    pub fn set_name(self, universe: &mut Universe, name: impl Into<String>) -> Self {
        if let Some(state) = universe.worlds.get_mut(self) {
            state.name = name.into();
        }
        self
    }

    /// Entity with no components.
    pub fn create_entity(self, universe: &mut Universe) -> Option<Entity> {
        let archetype = self.try_get_archetype(universe, &TypeSignature::new())?;
        universe.create_entity(archetype)
    }

    pub fn create_entity_with_id(self, universe: &mut Universe, index: u32) -> Result<Entity> {
        let archetype = self
            .try_get_archetype(universe, &TypeSignature::new())
            .ok_or(EcsError::StaleHandle {
                handle: Handle::World(self),
            })?;
        universe.create_entity_with_id(archetype, index)
    }

    pub fn create_query(self) -> Query {
        Query::new(self)
    }

    /// Archetype for `signature`, created on first request.
    ///
    /// `None` when the world is stale or a signature id was never registered.
    pub fn try_get_archetype(
        self,
        universe: &mut Universe,
        signature: &TypeSignature,
    ) -> Option<Archetype> {
        if signature.iter().any(|id| component_meta(id).is_none()) {
            return None;
        }
        let state = universe.worlds.get_mut(self)?;
        let index = state.archetype_index_for(signature);
        state.storage_at(index).map(ArchetypeStorage::handle)
    }

    pub fn entity_count(self, universe: &Universe) -> usize {
        universe.worlds.get(self).map_or(0, |state| state.entity_count)
    }

    pub fn archetype_count(self, universe: &Universe) -> usize {
        universe
            .worlds
            .get(self)
            .map_or(0, |state| state.live_storages().count())
    }

    pub fn archetypes(self, universe: &Universe) -> Vec<Archetype> {
        universe
            .worlds
            .get(self)
            .map(|state| state.live_storages().map(ArchetypeStorage::handle).collect())
            .unwrap_or_default()
    }

    pub fn entities(self, universe: &Universe) -> Vec<Entity> {
        universe
            .worlds
            .get(self)
            .map(|state| {
                state
                    .live_storages()
                    .flat_map(|storage| storage.entities().iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Store one value of `T` as world data, replacing any previous value.
    pub fn set_data<T: Any>(self, universe: &mut Universe, data: T) -> Self {
        if let Some(state) = universe.worlds.get_mut(self) {
            state.data.insert(
                TypeId::of::<T>(),
                WorldDatum {
                    name: type_name::<T>(),
                    value: Box::new(data),
                },
            );
        }
        self
    }

    pub fn get_data<T: Any>(self, universe: &Universe) -> Result<&T> {
        let state = universe.worlds.get(self).ok_or(EcsError::StaleHandle {
            handle: Handle::World(self),
        })?;
        state
            .data
            .get(&TypeId::of::<T>())
            .and_then(|datum| datum.value.downcast_ref::<T>())
            .ok_or(EcsError::MissingWorldData {
                world: self,
                data: type_name::<T>(),
            })
    }

    pub fn get_data_mut<T: Any>(self, universe: &mut Universe) -> Result<&mut T> {
        let state = universe.worlds.get_mut(self).ok_or(EcsError::StaleHandle {
            handle: Handle::World(self),
        })?;
        state
            .data
            .get_mut(&TypeId::of::<T>())
            .and_then(|datum| datum.value.downcast_mut::<T>())
            .ok_or(EcsError::MissingWorldData {
                world: self,
                data: type_name::<T>(),
            })
    }

    /// World data of type `T`, inserting `T::default()` when absent.
    pub fn data_or_default<T: Any + Default>(self, universe: &mut Universe) -> Result<&mut T> {
        let state = universe.worlds.get_mut(self).ok_or(EcsError::StaleHandle {
            handle: Handle::World(self),
        })?;
        let datum = state
            .data
            .entry(TypeId::of::<T>())
            .or_insert_with(|| WorldDatum {
                name: type_name::<T>(),
                value: Box::new(T::default()),
            });
        datum
            .value
            .downcast_mut::<T>()
            .ok_or(EcsError::MissingWorldData {
                world: self,
                data: type_name::<T>(),
            })
    }

    pub fn has_data<T: Any>(self, universe: &Universe) -> bool {
        universe
            .worlds
            .get(self)
            .is_some_and(|state| state.data.contains_key(&TypeId::of::<T>()))
    }

    pub fn remove_data<T: Any>(self, universe: &mut Universe) -> Option<T> {
        let datum = universe.worlds.get_mut(self)?.data.remove(&TypeId::of::<T>())?;
        datum.value.downcast::<T>().ok().map(|value| *value)
    }

    /// Type names of every world data value, sorted.
    pub fn data_type_names(self, universe: &Universe) -> Vec<&'static str> {
        let mut names: Vec<_> = universe
            .worlds
            .get(self)
            .map(|state| state.data.values().map(|datum| datum.name).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Called after `T` is written: with the previous value when the write
    /// happened in place, with `None` when the component was added.
    pub fn on_set<T, F>(self, universe: &mut Universe, hook: F) -> Option<HookId>
    where
        T: Component,
        F: FnMut(Entity, Option<&T>, &mut T) + 'static,
    {
        let state = universe.worlds.get_mut(self)?;
        Some(state.hooks.on_set::<T>(Box::new(hook)))
    }

    pub fn on_set_entity<T, F>(self, universe: &mut Universe, mut hook: F) -> Option<HookId>
    where
        T: Component,
        F: FnMut(Entity, &mut T) + 'static,
    {
        self.on_set::<T, _>(universe, move |entity, _old: Option<&T>, value: &mut T| {
            hook(entity, value)
        })
    }

    pub fn on_set_value<T, F>(self, universe: &mut Universe, mut hook: F) -> Option<HookId>
    where
        T: Component,
        F: FnMut(&mut T) + 'static,
    {
        self.on_set::<T, _>(universe, move |_entity, _old: Option<&T>, value: &mut T| hook(value))
    }

    /// Called with the value being removed, after the entity's storage changed.
    pub fn on_remove<T, F>(self, universe: &mut Universe, hook: F) -> Option<HookId>
    where
        T: Component,
        F: FnMut(Entity, &T) + 'static,
    {
        let state = universe.worlds.get_mut(self)?;
        Some(state.hooks.on_remove::<T>(Box::new(hook)))
    }

    pub fn on_remove_value<T, F>(self, universe: &mut Universe, mut hook: F) -> Option<HookId>
    where
        T: Component,
        F: FnMut(&T) + 'static,
    {
        self.on_remove::<T, _>(universe, move |_entity, value: &T| hook(value))
    }

    pub fn remove_hook(self, universe: &mut Universe, id: HookId) -> bool {
        universe
            .worlds
            .get_mut(self)
            .is_some_and(|state| state.hooks.unsubscribe(id))
    }

    /// Toggle long-lived deferral of structural changes.
    ///
    /// Enabling holds one level of the deferral depth; disabling releases it
    /// and replays if nothing else is deferring. Repeating the current
    /// setting does nothing.
    pub fn cache_structural_events(self, universe: &mut Universe, enabled: bool) {
        let Some(state) = universe.worlds.get_mut(self) else {
            return;
        };
        if state.caching == enabled {
            return;
        }
        state.caching = enabled;
        if enabled {
            universe.enter_deferral(self);
        } else {
            universe.exit_deferral(self, true);
        }
    }

    pub fn is_caching_structural_events(self, universe: &Universe) -> bool {
        universe.worlds.get(self).is_some_and(|state| state.caching)
    }

    /// True while any scope or cache toggle defers this world's changes.
    pub fn is_deferring(self, universe: &Universe) -> bool {
        universe
            .worlds
            .get(self)
            .is_some_and(|state| state.log.is_deferring())
    }

    pub fn pending_commands(self, universe: &Universe) -> usize {
        universe.worlds.get(self).map_or(0, |state| state.log.len())
    }

    pub fn resize_backing_arrays(self, universe: &mut Universe) {
        for archetype in self.archetypes(universe) {
            universe.resize_archetype(archetype);
        }
    }

    pub fn destroy_empty_archetypes(self, universe: &mut Universe) {
        for archetype in self.archetypes(universe) {
            if archetype.entity_count(universe) == 0 {
                universe.destroy_archetype(archetype);
            }
        }
    }

    /// Destroy the world, its archetypes and every entity in it.
    pub fn destroy(self, universe: &mut Universe) {
        universe.destroy_world(self);
    }

    pub fn metrics(self, universe: &Universe) -> Option<&Counter> {
        universe.worlds.get(self).map(|state| &state.metrics)
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "World({}v{})", self.index, self.generation)
    }
}

pub(crate) struct WorldDatum {
    name: &'static str,
    value: Box<dyn Any>,
}

pub(crate) struct ArchetypeSlot {
    pub generation: u32,
    pub storage: Option<ArchetypeStorage>,
}

pub(crate) struct WorldState {
    pub handle: World,
    pub name: String,
    pub archetypes: Vec<ArchetypeSlot>,
    pub free_archetypes: Vec<u32>,
    pub signature_index: HashMap<TypeSignature, u32>,
    pub entity_count: usize,
    /// Bumped whenever an archetype slot is freed or reused.
    pub structure_version: u64,
    pub data: HashMap<TypeId, WorldDatum>,
    pub hooks: HookTable,
    pub log: CommandLog,
    pub caching: bool,
    pub metrics: Counter,
}

impl WorldState {
    pub fn new(handle: World, name: String, archetype_capacity: usize) -> Self {
        Self {
            handle,
            name,
            archetypes: Vec::with_capacity(archetype_capacity),
            free_archetypes: Vec::new(),
            signature_index: HashMap::with_capacity(archetype_capacity),
            entity_count: 0,
            structure_version: 0,
            data: HashMap::new(),
            hooks: HookTable::default(),
            log: CommandLog::default(),
            caching: false,
            metrics: Counter::new(),
        }
    }

    pub fn storage_at(&self, index: u32) -> Option<&ArchetypeStorage> {
        self.archetypes.get(index as usize)?.storage.as_ref()
    }

    pub fn storage_at_mut(&mut self, index: u32) -> Option<&mut ArchetypeStorage> {
        self.archetypes.get_mut(index as usize)?.storage.as_mut()
    }

    pub fn storage(&self, archetype: Archetype) -> Option<&ArchetypeStorage> {
        let slot = self.archetypes.get(archetype.index() as usize)?;
        if slot.generation != archetype.generation() {
            return None;
        }
        slot.storage.as_ref()
    }

    pub fn storage_mut(&mut self, archetype: Archetype) -> Option<&mut ArchetypeStorage> {
        let slot = self.archetypes.get_mut(archetype.index() as usize)?;
        if slot.generation != archetype.generation() {
            return None;
        }
        slot.storage.as_mut()
    }

    pub fn live_storages(&self) -> impl Iterator<Item = &ArchetypeStorage> + '_ {
        self.archetypes.iter().filter_map(|slot| slot.storage.as_ref())
    }

    /// Slot index of the archetype for `signature`, creating it if needed.
    ///
    /// Reusing a freed slot bumps the structure version; appending does not.
    pub fn archetype_index_for(&mut self, signature: &TypeSignature) -> u32 {
        if let Some(&index) = self.signature_index.get(signature) {
            return index;
        }

        let index = match self.free_archetypes.pop() {
            Some(index) => {
                self.structure_version += 1;
                index
            }
            None => {
                let index = u32::try_from(self.archetypes.len()).expect("archetype table exhausted");
                self.archetypes.push(ArchetypeSlot {
                    generation: 1,
                    storage: None,
                });
                index
            }
        };

        let slot = &mut self.archetypes[index as usize];
        let handle = Archetype::new(self.handle, index, slot.generation);
        slot.storage = Some(ArchetypeStorage::new(handle, signature.clone()));
        self.signature_index.insert(signature.clone(), index);
        self.metrics.increment(counters::ARCHETYPES_CREATED, 1);
        tracing::debug!(world = %self.handle, %handle, %signature, "created archetype");
        index
    }

    /// Detach an archetype's storage and retire its slot.
    pub fn take_archetype(&mut self, archetype: Archetype) -> Option<ArchetypeStorage> {
        let slot = self.archetypes.get_mut(archetype.index() as usize)?;
        if slot.generation != archetype.generation() {
            return None;
        }
        let storage = slot.storage.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.signature_index.remove(storage.signature());
        self.free_archetypes.push(archetype.index());
        self.structure_version += 1;
        self.entity_count -= storage.len();
        self.metrics.increment(counters::ARCHETYPES_DESTROYED, 1);
        tracing::debug!(world = %self.handle, %archetype, "destroyed archetype");
        Some(storage)
    }

    /// Move `row` of slot `from` into slot `to` within this world.
    pub fn migrate_row(
        &mut self,
        from: u32,
        row: usize,
        to: u32,
        keep: impl FnMut(super::component::ComponentId) -> bool,
    ) -> Migration {
        let (src, dst) = pair_mut(&mut self.archetypes, from as usize, to as usize);
        let (Some(src), Some(dst)) = (src.storage.as_mut(), dst.storage.as_mut()) else {
            panic!("migration between vacant archetype slots {from} -> {to}");
        };
        self.metrics.increment(counters::ROWS_MIGRATED, 1);
        src.migrate_row(row, dst, keep)
    }
}

/// Two distinct mutable elements of one slice.
pub(crate) fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut needs two distinct indices");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
