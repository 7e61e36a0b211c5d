// universe.rs - Owner of every world and the shared entity table
//
// All structural mutation funnels through here. Each operation first finds
// the world whose command log owns it; if that world is deferring, the
// operation is queued, otherwise it is applied immediately. Replay runs the
// same entry points once the world's deferral depth returns to zero.

use tracing::{debug, trace, warn};

use super::archetype::Archetype;
use super::commands::{Command, StructuralScope};
use super::component::{component_id, component_meta, Component, ComponentId};
use super::entity::{Entity, EntityLocation, EntityTable};
use super::error::Result;
use super::storage::ArchetypeStorage;
use super::world::{counters, pair_mut, World, WorldState};
use crate::config::UniverseConfig;

pub(crate) struct WorldSlot {
    generation: u32,
    state: Option<WorldState>,
}

/// World slots addressed by [`World`] handles.
pub(crate) struct WorldTable {
    slots: Vec<WorldSlot>,
}

impl WorldTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, world: World) -> Option<&WorldState> {
        let slot = self.slots.get(world.index() as usize)?;
        if slot.generation != world.generation() {
            return None;
        }
        slot.state.as_ref()
    }

    pub fn get_mut(&mut self, world: World) -> Option<&mut WorldState> {
        let slot = self.slots.get_mut(world.index() as usize)?;
        if slot.generation != world.generation() {
            return None;
        }
        slot.state.as_mut()
    }

    /// Two different live worlds at once.
    pub fn pair_mut(&mut self, a: World, b: World) -> Option<(&mut WorldState, &mut WorldState)> {
        if a.index() == b.index() || self.get(a).is_none() || self.get(b).is_none() {
            return None;
        }
        let (first, second) = pair_mut(&mut self.slots, a.index() as usize, b.index() as usize);
        Some((first.state.as_mut()?, second.state.as_mut()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldState> + '_ {
        self.slots.iter().filter_map(|slot| slot.state.as_ref())
    }

    /// First vacant slot, or a new one at the end.
    fn insert(&mut self, make: impl FnOnce(World) -> WorldState) -> World {
        let index = match self.slots.iter().position(|slot| slot.state.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(WorldSlot {
                    generation: 1,
                    state: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        let index = u32::try_from(index).expect("world table exhausted");
        let world = World::new(index, slot.generation);
        slot.state = Some(make(world));
        world
    }

    fn remove(&mut self, world: World) -> Option<WorldState> {
        self.get(world)?;
        let slot = &mut self.slots[world.index() as usize];
        slot.generation = slot.generation.wrapping_add(1).max(1);
        slot.state.take()
    }
}

/// Owns the entity table and every world.
///
/// Handles ([`Entity`], [`Archetype`], [`World`]) are plain values; every
/// operation on them takes the universe they came from.
pub struct Universe {
    config: UniverseConfig,
    pub(crate) entities: EntityTable,
    pub(crate) worlds: WorldTable,
}

impl Universe {
    pub fn new() -> Self {
        Self::with_config(UniverseConfig::default())
    }

    pub fn with_config(config: UniverseConfig) -> Self {
        Self {
            config,
            entities: EntityTable::with_capacity(config.entity_capacity),
            worlds: WorldTable::with_capacity(config.world_capacity),
        }
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// New world in the first free slot.
    pub fn create_world(&mut self, name: impl Into<String>) -> World {
        let name = name.into();
        let archetype_capacity = self.config.archetype_capacity;
        debug!(%name, "creating world");
        let world = self
            .worlds
            .insert(|handle| WorldState::new(handle, name, archetype_capacity));
        debug!(%world, "created world");
        world
    }

    pub fn get_or_create_world(&mut self, name: &str) -> World {
        match self.try_get_world(name) {
            Some(world) => world,
            None => self.create_world(name),
        }
    }

    pub fn try_get_world(&self, name: &str) -> Option<World> {
        self.worlds
            .iter()
            .find(|state| state.name == name)
            .map(|state| state.handle)
    }

    pub fn worlds(&self) -> Vec<World> {
        self.worlds.iter().map(|state| state.handle).collect()
    }

    /// Live entity currently stored at slot `index`.
    pub fn try_get_entity(&self, index: u32) -> Option<Entity> {
        self.entities.live_at(index)
    }

    /// Live entities across every world.
    pub fn entity_count(&self) -> usize {
        self.worlds.iter().map(|state| state.entity_count).sum()
    }

    /// Defer structural changes to `world` until the returned guard drops.
    pub fn structural_scope(&mut self, world: World) -> StructuralScope<'_> {
        StructuralScope::new(self, world)
    }

    // ------------------------------------------------------------------
    // Lookups shared by the handle types
    // ------------------------------------------------------------------

    pub(crate) fn archetype_storage(&self, archetype: Archetype) -> Option<&ArchetypeStorage> {
        self.worlds.get(archetype.world())?.storage(archetype)
    }

    pub(crate) fn archetype_storage_mut(
        &mut self,
        archetype: Archetype,
    ) -> Option<&mut ArchetypeStorage> {
        self.worlds.get_mut(archetype.world())?.storage_mut(archetype)
    }

    pub(crate) fn entity_storage(&self, entity: Entity) -> Option<(&ArchetypeStorage, usize)> {
        let location = self.entities.location(entity)?;
        let storage = self.worlds.get(location.world)?.storage_at(location.archetype)?;
        Some((storage, location.row))
    }

    pub(crate) fn entity_storage_mut(
        &mut self,
        entity: Entity,
    ) -> Option<(&mut ArchetypeStorage, usize)> {
        let location = self.entities.location(entity)?;
        let storage = self
            .worlds
            .get_mut(location.world)?
            .storage_at_mut(location.archetype)?;
        Some((storage, location.row))
    }

    // ------------------------------------------------------------------
    // Deferral
    // ------------------------------------------------------------------

    pub(crate) fn enter_deferral(&mut self, world: World) {
        if let Some(state) = self.worlds.get_mut(world) {
            state.log.enter();
        }
    }

    /// Leave one deferral level; replay when it was the last one and `replay` is set.
    pub(crate) fn exit_deferral(&mut self, world: World, replay: bool) {
        let Some(state) = self.worlds.get_mut(world) else {
            return;
        };
        if !state.log.exit() {
            return;
        }
        if replay {
            self.replay(world);
        } else if state.log.len() > 0 {
            warn!(%world, pending = state.log.len(), "deferral unwound with pending commands");
        }
    }

    fn is_deferring(&self, world: World) -> bool {
        self.worlds
            .get(world)
            .is_some_and(|state| state.log.is_deferring())
    }

    fn record(&mut self, world: World, command: Command) {
        if let Some(state) = self.worlds.get_mut(world) {
            trace!(%world, kind = command.kind(), "deferred");
            state.metrics.increment(counters::COMMANDS_DEFERRED, 1);
            state.log.push(command);
        }
    }

    fn replay(&mut self, world: World) {
        loop {
            let Some(state) = self.worlds.get_mut(world) else {
                return;
            };
            if state.log.is_deferring() {
                return;
            }
            let Some(command) = state.log.pop() else {
                return;
            };
            state.metrics.increment(counters::COMMANDS_REPLAYED, 1);
            trace!(%world, kind = command.kind(), "replaying");
            self.apply(world, command);
        }
    }

    fn apply(&mut self, world: World, command: Command) {
        match command {
            Command::CreateEntity { entity, archetype } => self.finish_create(entity, archetype),
            Command::DestroyEntity { entity } => self.destroy_entity(entity),
            Command::SetComponent {
                entity,
                component,
                value,
            } => {
                if let Some(meta) = component_meta(component) {
                    (meta.replay_set)(self, entity, value);
                }
            }
            Command::RemoveComponent { entity, component } => {
                self.remove_component(entity, component)
            }
            Command::TransferEntity { entity, target } => self.transfer_entity(entity, target),
            Command::DestroyArchetype { archetype } => self.destroy_archetype(archetype),
            Command::ResizeArchetype { archetype } => self.resize_archetype(archetype),
            Command::DestroyWorld => self.destroy_world(world),
        }
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    pub(crate) fn create_entity(&mut self, archetype: Archetype) -> Option<Entity> {
        self.archetype_storage(archetype)?;
        let index = self.entities.allocate();
        Some(self.begin_create(index, archetype))
    }

    pub(crate) fn create_entity_with_id(
        &mut self,
        archetype: Archetype,
        index: u32,
    ) -> Result<Entity> {
        self.entities.claim(index)?;
        Ok(self.begin_create(index, archetype))
    }

    fn begin_create(&mut self, index: u32, archetype: Archetype) -> Entity {
        let entity = Entity::new(index, self.entities.generation(index));
        let world = archetype.world();
        if self.is_deferring(world) {
            self.entities.reserve(index, world);
            self.record(world, Command::CreateEntity { entity, archetype });
        } else {
            self.finish_create(entity, archetype);
        }
        entity
    }

    /// Give a reserved or freshly allocated slot its row, or release it when
    /// the archetype died first.
    fn finish_create(&mut self, entity: Entity, archetype: Archetype) {
        let world = archetype.world();
        let Some(state) = self.worlds.get_mut(world) else {
            self.entities.release(entity.index());
            return;
        };
        let Some(storage) = state.storage_mut(archetype) else {
            trace!(%entity, %archetype, "archetype gone before create replayed");
            self.entities.release(entity.index());
            return;
        };
        let row = storage.push_default_row(entity);
        state.entity_count += 1;
        state.metrics.increment(counters::ENTITIES_CREATED, 1);
        self.entities.place(
            entity,
            EntityLocation {
                world,
                archetype: archetype.index(),
                row,
            },
        );
        trace!(%entity, %archetype, row, "created entity");
    }

    pub(crate) fn set_component<T: Component>(&mut self, entity: Entity, value: T) {
        let Some(world) = self.entities.owning_world(entity.index()) else {
            trace!(%entity, "set on free slot ignored");
            return;
        };
        if self.is_deferring(world) {
            let component = component_id::<T>();
            let value = Box::new(value);
            self.record(world, Command::SetComponent { entity, component, value });
            return;
        }
        self.set_component_now(entity, value);
    }

    fn set_component_now<T: Component>(&mut self, entity: Entity, value: T) {
        let Some(location) = self.entities.location(entity) else {
            trace!(%entity, "set on stale entity ignored");
            return;
        };
        let Some(state) = self.worlds.get_mut(location.world) else {
            return;
        };
        let from = location.archetype;

        {
            let WorldState {
                archetypes, hooks, ..
            } = &mut *state;
            let Some(storage) = archetypes[from as usize].storage.as_mut() else {
                panic!("{entity} points at vacant archetype slot {from}");
            };
            if let Some(slot) = storage.get_mut::<T>(location.row) {
                let old = std::mem::replace(slot, value);
                hooks.fire_set(entity, Some(&old), slot);
                return;
            }
        }

        let mut signature = match state.storage_at(from) {
            Some(storage) => storage.signature().clone(),
            None => return,
        };
        signature.add::<T>();
        let to = state.archetype_index_for(&signature);
        let migration = state.migrate_row(from, location.row, to, |_| false);
        if let Some(moved) = migration.moved {
            self.entities.set_row(moved, location.row);
        }
        self.entities.place(
            entity,
            EntityLocation {
                world: location.world,
                archetype: to,
                row: migration.row,
            },
        );

        let WorldState {
            archetypes, hooks, ..
        } = state;
        let Some(target) = archetypes[to as usize].storage.as_mut() else {
            panic!("archetype slot {to} vanished during migration");
        };
        let slot = target.push_value(value);
        hooks.fire_set(entity, None, slot);
    }

    pub(crate) fn remove_component(&mut self, entity: Entity, component: ComponentId) {
        let Some(world) = self.entities.owning_world(entity.index()) else {
            return;
        };
        if self.is_deferring(world) {
            self.record(world, Command::RemoveComponent { entity, component });
            return;
        }

        let Some(location) = self.entities.location(entity) else {
            trace!(%entity, "remove on stale entity ignored");
            return;
        };
        let Some(state) = self.worlds.get_mut(location.world) else {
            return;
        };
        let mut signature = match state.storage_at(location.archetype) {
            Some(storage) if storage.has(component) => storage.signature().clone(),
            _ => return,
        };
        signature.remove_id(component);
        let to = state.archetype_index_for(&signature);
        let keep = state.hooks.has_remove(component);
        let migration = state.migrate_row(location.archetype, location.row, to, |id| {
            keep && id == component
        });
        if let Some(moved) = migration.moved {
            self.entities.set_row(moved, location.row);
        }
        self.entities.place(
            entity,
            EntityLocation {
                world: location.world,
                archetype: to,
                row: migration.row,
            },
        );
        for (id, value) in migration.removed {
            state.hooks.fire_remove(id, entity, value.as_ref());
        }
    }

    pub(crate) fn destroy_entity(&mut self, entity: Entity) {
        let Some(world) = self.entities.owning_world(entity.index()) else {
            return;
        };
        if self.is_deferring(world) {
            self.record(world, Command::DestroyEntity { entity });
            return;
        }

        let Some(location) = self.entities.location(entity) else {
            trace!(%entity, "destroy on stale entity ignored");
            return;
        };
        let Some(state) = self.worlds.get_mut(location.world) else {
            return;
        };
        let WorldState {
            archetypes,
            hooks,
            entity_count,
            metrics,
            ..
        } = state;
        let Some(storage) = archetypes[location.archetype as usize].storage.as_mut() else {
            panic!("{entity} points at vacant archetype slot {}", location.archetype);
        };

        self.entities.release(entity.index());
        let removed = storage.swap_remove_row(location.row, |id| hooks.has_remove(id));
        if let Some(moved) = removed.moved {
            self.entities.set_row(moved, location.row);
        }
        *entity_count -= 1;
        metrics.increment(counters::ENTITIES_DESTROYED, 1);
        trace!(%entity, "destroyed entity");

        for (id, value) in removed.values {
            hooks.fire_remove(id, entity, value.as_ref());
        }
    }

    pub(crate) fn transfer_entity(&mut self, entity: Entity, target: World) {
        let Some(world) = self.entities.owning_world(entity.index()) else {
            return;
        };
        if self.is_deferring(world) {
            self.record(world, Command::TransferEntity { entity, target });
            return;
        }

        let Some(location) = self.entities.location(entity) else {
            trace!(%entity, "transfer of stale entity ignored");
            return;
        };
        if location.world == target {
            return;
        }
        let Some((src, dst)) = self.worlds.pair_mut(location.world, target) else {
            trace!(%entity, %target, "transfer target invalid");
            return;
        };
        let Some(signature) = src
            .storage_at(location.archetype)
            .map(|storage| storage.signature().clone())
        else {
            return;
        };
        let to = dst.archetype_index_for(&signature);
        let (Some(src_storage), Some(dst_storage)) =
            (src.storage_at_mut(location.archetype), dst.storage_at_mut(to))
        else {
            return;
        };
        let migration = src_storage.migrate_row(location.row, dst_storage, |_| false);
        src.entity_count -= 1;
        dst.entity_count += 1;
        src.metrics.increment(counters::ROWS_MIGRATED, 1);

        if let Some(moved) = migration.moved {
            self.entities.set_row(moved, location.row);
        }
        self.entities.place(
            entity,
            EntityLocation {
                world: target,
                archetype: to,
                row: migration.row,
            },
        );
        trace!(%entity, from = %location.world, to = %target, "transferred entity");
    }

    pub(crate) fn destroy_archetype(&mut self, archetype: Archetype) {
        if self.is_deferring(archetype.world()) {
            self.record(archetype.world(), Command::DestroyArchetype { archetype });
            return;
        }

        let Some(state) = self.worlds.get_mut(archetype.world()) else {
            return;
        };
        let Some(storage) = state.take_archetype(archetype) else {
            return;
        };
        for entity in storage.entities() {
            self.entities.release(entity.index());
        }
        state
            .metrics
            .increment(counters::ENTITIES_DESTROYED, storage.len());
        for column in storage.columns() {
            state.hooks.fire_remove_column(storage.entities(), column);
        }
    }

    pub(crate) fn resize_archetype(&mut self, archetype: Archetype) {
        if self.is_deferring(archetype.world()) {
            self.record(archetype.world(), Command::ResizeArchetype { archetype });
            return;
        }
        if let Some(storage) = self.archetype_storage_mut(archetype) {
            storage.shrink_to_fit();
        }
    }

    pub(crate) fn destroy_world(&mut self, world: World) {
        if self.is_deferring(world) {
            self.record(world, Command::DestroyWorld);
            return;
        }

        let Some(mut state) = self.worlds.remove(world) else {
            return;
        };

        // Pending creations never get a row; give their slots back.
        for command in state.log.drain() {
            if let Command::CreateEntity { entity, .. } = command {
                if self.entities.is_reserved(entity) {
                    self.entities.release(entity.index());
                }
            }
        }

        let storages: Vec<ArchetypeStorage> = state
            .archetypes
            .iter_mut()
            .filter_map(|slot| slot.storage.take())
            .collect();
        for storage in &storages {
            for entity in storage.entities() {
                self.entities.release(entity.index());
            }
        }
        for storage in &storages {
            for column in storage.columns() {
                state.hooks.fire_remove_column(storage.entities(), column);
            }
        }
        debug!(%world, name = %state.name, "destroyed world");
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}
