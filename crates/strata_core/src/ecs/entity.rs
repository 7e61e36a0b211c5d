//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that reference a row in some
//! archetype of some world. The generation counter prevents use-after-free:
//! every destroy bumps the slot's generation so old handles stop resolving.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use super::archetype::Archetype;
use super::component::{component_id, component_name, Component, ComponentId};
use super::error::{EcsError, Handle, Result};
use super::universe::Universe;
use super::world::World;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: Position in the universe's entity table
/// - Generation: Incremented on entity destruction (prevents use-after-free)
///
/// Example:
/// ```ignore
/// let entity = world.create_entity(&mut universe).unwrap();
/// entity.destroy(&mut universe);
/// assert!(!entity.is_valid(&universe)); // generation mismatch
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Never valid: live slots start at generation 1.
    pub const NULL: Entity = Entity::new(0, 0);

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer (for networking/save files)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }

    pub fn is_valid(self, universe: &Universe) -> bool {
        universe.entities.location(self).is_some()
    }

    /// World the entity lives in.
    pub fn world(self, universe: &Universe) -> Option<World> {
        universe.entities.location(self).map(|location| location.world)
    }

    /// Archetype the entity lives in.
    pub fn archetype(self, universe: &Universe) -> Option<Archetype> {
        let location = universe.entities.location(self)?;
        universe
            .worlds
            .get(location.world)?
            .storage_at(location.archetype)
            .map(|storage| storage.handle())
    }

    pub fn has<T: Component>(self, universe: &Universe) -> bool {
        self.has_id(universe, component_id::<T>())
    }

    pub fn has_id(self, universe: &Universe, id: ComponentId) -> bool {
        universe
            .entity_storage(self)
            .is_some_and(|(storage, _)| storage.has(id))
    }

    pub fn try_get<T: Component>(self, universe: &Universe) -> Option<&T> {
        let (storage, row) = universe.entity_storage(self)?;
        storage.get::<T>(row)
    }

    /// Component value, or an error naming what was missing.
    pub fn get<T: Component>(self, universe: &Universe) -> Result<&T> {
        let (storage, row) = universe
            .entity_storage(self)
            .ok_or(EcsError::StaleHandle {
                handle: Handle::Entity(self),
            })?;
        storage.get::<T>(row).ok_or(EcsError::MissingComponent {
            entity: self,
            component: component_name(component_id::<T>()),
        })
    }

    /// Mutable access in place. Not a structural change, never deferred and
    /// never fires set hooks.
    pub fn get_mut<T: Component>(self, universe: &mut Universe) -> Result<&mut T> {
        let (storage, row) = universe
            .entity_storage_mut(self)
            .ok_or(EcsError::StaleHandle {
                handle: Handle::Entity(self),
            })?;
        storage.get_mut::<T>(row).ok_or(EcsError::MissingComponent {
            entity: self,
            component: component_name(component_id::<T>()),
        })
    }

    /// Write `value`, adding the component first when the entity lacks it.
    pub fn set<T: Component>(self, universe: &mut Universe, value: T) -> Self {
        universe.set_component(self, value);
        self
    }

    pub fn remove<T: Component>(self, universe: &mut Universe) -> Self {
        universe.remove_component(self, component_id::<T>());
        self
    }

    pub fn remove_id(self, universe: &mut Universe, id: ComponentId) -> Self {
        universe.remove_component(self, id);
        self
    }

    pub fn destroy(self, universe: &mut Universe) {
        universe.destroy_entity(self);
    }

    /// Move the entity and all its components into `target`.
    pub fn transfer(self, universe: &mut Universe, target: World) {
        universe.transfer_entity(self, target);
    }

    pub fn component_count(self, universe: &Universe) -> usize {
        universe
            .entity_storage(self)
            .map_or(0, |(storage, _)| storage.signature().len())
    }

    pub fn component_ids(self, universe: &Universe) -> Vec<ComponentId> {
        universe
            .entity_storage(self)
            .map(|(storage, _)| storage.signature().ids().to_vec())
            .unwrap_or_default()
    }

    /// Debug visitor over every component value of the entity.
    pub fn visit_components(self, universe: &Universe, visitor: impl FnMut(ComponentId, &dyn Any)) {
        if let Some((storage, row)) = universe.entity_storage(self) {
            storage.visit_row(row, visitor);
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Where a live entity's row sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntityLocation {
    pub world: World,
    /// Archetype slot index inside the world.
    pub archetype: u32,
    pub row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Free,
    /// Handed out by a deferred create that has not replayed yet.
    Reserved(World),
    Live(EntityLocation),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct EntitySlot {
    pub generation: u32,
    pub state: SlotState,
}

impl Default for EntitySlot {
    fn default() -> Self {
        Self {
            generation: 1,
            state: SlotState::Free,
        }
    }
}

fn next_generation(generation: u32) -> u32 {
    generation.wrapping_add(1).max(1)
}

/// Universe-wide entity slots with a FIFO free list.
pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    free: VecDeque<u32>,
}

impl EntityTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn generation(&self, index: u32) -> u32 {
        self.slots[index as usize].generation
    }

    /// Take the oldest free slot, or grow the table.
    pub fn allocate(&mut self) -> u32 {
        if let Some(index) = self.free.pop_front() {
            return index;
        }
        let index = u32::try_from(self.slots.len()).expect("entity table exhausted");
        self.slots.push(EntitySlot::default());
        index
    }

    /// Claim a specific slot. Slots skipped while growing join the free list.
    pub fn claim(&mut self, index: u32) -> Result<()> {
        let wanted = index as usize;
        if wanted >= self.slots.len() {
            let start = self.slots.len();
            self.slots.resize_with(wanted + 1, EntitySlot::default);
            self.free.extend((start..wanted).map(|i| i as u32));
            return Ok(());
        }
        match self.slots[wanted].state {
            SlotState::Free => {
                self.free.retain(|&free| free != index);
                Ok(())
            }
            SlotState::Reserved(_) | SlotState::Live(_) => {
                Err(EcsError::DuplicateExplicitId { index })
            }
        }
    }

    /// Mark a slot as pending creation. The generation is bumped so the
    /// handed-out handle stays invalid until [`place`](Self::place).
    pub fn reserve(&mut self, index: u32, world: World) {
        let slot = &mut self.slots[index as usize];
        slot.generation = next_generation(slot.generation);
        slot.state = SlotState::Reserved(world);
    }

    pub fn place(&mut self, entity: Entity, location: EntityLocation) {
        let slot = &mut self.slots[entity.index as usize];
        slot.generation = entity.generation;
        slot.state = SlotState::Live(location);
    }

    /// Free a slot and bump its generation.
    pub fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.generation = next_generation(slot.generation);
        slot.state = SlotState::Free;
        self.free.push_back(index);
    }

    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let slot = self.slots.get(entity.index as usize)?;
        match slot.state {
            SlotState::Live(location) if slot.generation == entity.generation => Some(location),
            _ => None,
        }
    }

    /// World whose command log owns operations on this slot, regardless of generation.
    pub fn owning_world(&self, index: u32) -> Option<World> {
        match self.slots.get(index as usize)?.state {
            SlotState::Live(location) => Some(location.world),
            SlotState::Reserved(world) => Some(world),
            SlotState::Free => None,
        }
    }

    pub fn is_reserved(&self, entity: Entity) -> bool {
        matches!(
            self.slots.get(entity.index as usize).map(|slot| slot.state),
            Some(SlotState::Reserved(_))
        )
    }

    /// Repoint a live entity that a swap-remove moved into `row`.
    pub fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(EntitySlot {
            state: SlotState::Live(location),
            ..
        }) = self.slots.get_mut(entity.index as usize)
        {
            location.row = row;
        }
    }

    /// Live handle stored at `index`.
    pub fn live_at(&self, index: u32) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        matches!(slot.state, SlotState::Live(_)).then(|| Entity::new(index, slot.generation))
    }

    #[cfg(test)]
    pub fn free_list(&self) -> Vec<u32> {
        self.free.iter().copied().collect()
    }
}
