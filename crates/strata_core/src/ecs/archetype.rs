// archetype.rs - Archetype handle
//
// An archetype is the storage for every entity with one exact component set
// inside one world. The handle is (world, slot index, slot generation); a
// destroyed archetype's slot is reused with a bumped generation.

use std::fmt;

use super::component::Component;
use super::entity::Entity;
use super::error::{EcsError, Handle, Result};
use super::signature::TypeSignature;
use super::universe::Universe;
use super::world::World;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Archetype {
    world: World,
    index: u32,
    generation: u32,
}

impl Archetype {
    /// Never valid.
    pub const NULL: Archetype = Archetype::new(World::NULL, 0, 0);

    pub(crate) const fn new(world: World, index: u32, generation: u32) -> Self {
        Self {
            world,
            index,
            generation,
        }
    }

    pub fn world(&self) -> World {
        self.world
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_valid(self, universe: &Universe) -> bool {
        universe.archetype_storage(self).is_some()
    }

    pub fn signature(self, universe: &Universe) -> Option<&TypeSignature> {
        universe.archetype_storage(self).map(|storage| storage.signature())
    }

    pub fn entity_count(self, universe: &Universe) -> usize {
        universe.archetype_storage(self).map_or(0, |storage| storage.len())
    }

    /// Resident entities in row order; empty when stale.
    pub fn entities(self, universe: &Universe) -> &[Entity] {
        universe
            .archetype_storage(self)
            .map(|storage| storage.entities())
            .unwrap_or_default()
    }

    pub fn capacity(self, universe: &Universe) -> usize {
        universe.archetype_storage(self).map_or(0, |storage| storage.capacity())
    }

    /// Column for `T`, valid for rows `[0, entity_count)`.
    pub fn components<T: Component>(self, universe: &Universe) -> Option<&[T]> {
        universe.archetype_storage(self)?.column::<T>()
    }

    pub fn components_mut<T: Component>(self, universe: &mut Universe) -> Option<&mut [T]> {
        universe.archetype_storage_mut(self)?.column_mut::<T>()
    }

    /// New entity with every component at its default value.
    ///
    /// While the world defers structural changes the returned handle only
    /// becomes valid once the creation replays.
    pub fn create_entity(self, universe: &mut Universe) -> Option<Entity> {
        universe.create_entity(self)
    }

    /// Like [`create_entity`](Self::create_entity) but at a caller-chosen slot index.
    pub fn create_entity_with_id(self, universe: &mut Universe, index: u32) -> Result<Entity> {
        if !self.is_valid(universe) {
            return Err(EcsError::StaleHandle {
                handle: Handle::Archetype(self),
            });
        }
        universe.create_entity_with_id(self, index)
    }

    /// Destroy the archetype and every entity in it.
    pub fn destroy(self, universe: &mut Universe) {
        universe.destroy_archetype(self);
    }

    /// Shrink backing storage to fit the current entity count.
    pub fn resize_backing_arrays(self, universe: &mut Universe) {
        universe.resize_archetype(self);
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype({}v{} in {})", self.index, self.generation, self.world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Health(u32);
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Armor(u32);

    #[test]
    fn raw_columns_alias_entity_values() {
        let mut universe = Universe::new();
        let world = universe.create_world("columns");
        let archetype = world
            .try_get_archetype(&mut universe, &TypeSignature::new().with::<Health>().with::<Armor>())
            .unwrap();
        let entities: Vec<_> = (0..3)
            .map(|_| archetype.create_entity(&mut universe).unwrap())
            .collect();

        assert_eq!(archetype.components::<Health>(&universe), Some(&[Health(0); 3][..]));
        let health = archetype.components_mut::<Health>(&mut universe).unwrap();
        assert_eq!(health.len(), 3);
        for (row, value) in health.iter_mut().enumerate() {
            *value = Health(row as u32 * 10);
        }

        for (row, entity) in entities.iter().enumerate() {
            assert_eq!(entity.get::<Health>(&universe), Ok(&Health(row as u32 * 10)));
            assert_eq!(entity.get::<Armor>(&universe), Ok(&Armor(0)));
        }
    }

    #[test]
    fn raw_columns_follow_swap_remove() {
        let mut universe = Universe::new();
        let world = universe.create_world("columns_after_destroy");
        let archetype = world
            .try_get_archetype(&mut universe, &TypeSignature::new().with::<Health>())
            .unwrap();
        let entities: Vec<_> = (0..3)
            .map(|i| archetype.create_entity(&mut universe).unwrap().set(&mut universe, Health(i)))
            .collect();

        entities[0].destroy(&mut universe);
        assert_eq!(archetype.components::<Health>(&universe), Some(&[Health(2), Health(1)][..]));
        assert_eq!(archetype.entities(&universe), &[entities[2], entities[1]]);
    }

    #[test]
    fn missing_column_and_stale_handle_yield_none() {
        let mut universe = Universe::new();
        let world = universe.create_world("no_column");
        let archetype = world
            .try_get_archetype(&mut universe, &TypeSignature::new().with::<Health>())
            .unwrap();

        assert!(archetype.components::<Armor>(&universe).is_none());
        archetype.destroy(&mut universe);
        assert!(archetype.components::<Health>(&universe).is_none());
        assert!(archetype.components_mut::<Health>(&mut universe).is_none());
        assert!(Archetype::NULL.components::<Health>(&universe).is_none());
    }
}
