//! Incrementally cached archetype queries.
//!
//! A query matches every archetype whose signature contains all `include`
//! ids and none of the `exclude` ids. Matches are cached per query: when the
//! world's structure version is unchanged only archetype slots appended since
//! the last refresh are scanned; otherwise the cache is rebuilt from scratch.

use std::fmt;

use super::archetype::Archetype;
use super::component::{component_id, Component, ComponentId};
use super::entity::Entity;
use super::signature::TypeSignature;
use super::universe::Universe;
use super::world::World;

#[derive(Debug, Clone)]
pub struct Query {
    world: World,
    include: TypeSignature,
    exclude: TypeSignature,
    matches: Vec<Archetype>,
    seen_version: Option<u64>,
    cursor: usize,
}

impl Query {
    pub(crate) fn new(world: World) -> Self {
        Self {
            world,
            include: TypeSignature::new(),
            exclude: TypeSignature::new(),
            matches: Vec::new(),
            seen_version: None,
            cursor: 0,
        }
    }

    pub fn world(&self) -> World {
        self.world
    }

    pub fn include(&self) -> &TypeSignature {
        &self.include
    }

    pub fn exclude(&self) -> &TypeSignature {
        &self.exclude
    }

    /// Require `T`.
    pub fn with<T: Component>(self) -> Self {
        self.with_id(component_id::<T>())
    }

    /// Reject archetypes holding `T`.
    pub fn without<T: Component>(self) -> Self {
        self.without_id(component_id::<T>())
    }

    pub fn with_id(mut self, id: ComponentId) -> Self {
        self.include.add_id(id);
        self.invalidate();
        self
    }

    pub fn without_id(mut self, id: ComponentId) -> Self {
        self.exclude.add_id(id);
        self.invalidate();
        self
    }

    /// Drop every filter.
    pub fn clear(&mut self) {
        self.include.clear();
        self.exclude.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.matches.clear();
        self.seen_version = None;
        self.cursor = 0;
    }

    fn matches_signature(&self, signature: &TypeSignature) -> bool {
        signature.has_all(&self.include) && !signature.has_any(&self.exclude)
    }

    /// Bring the cached match list up to date. False when the world is gone.
    fn refresh(&mut self, universe: &Universe) -> bool {
        let Some(state) = universe.worlds.get(self.world) else {
            self.invalidate();
            return false;
        };
        if self.seen_version != Some(state.structure_version) {
            self.matches.clear();
            self.cursor = 0;
            self.seen_version = Some(state.structure_version);
        }
        while self.cursor < state.archetypes.len() {
            if let Some(storage) = state.archetypes[self.cursor].storage.as_ref() {
                if self.matches_signature(storage.signature()) {
                    self.matches.push(storage.handle());
                }
            }
            self.cursor += 1;
        }
        true
    }

    /// Matching archetypes, in slot order.
    pub fn archetypes(&mut self, universe: &Universe) -> Vec<Archetype> {
        self.refresh(universe);
        self.matches.clone()
    }

    pub fn entity_count(&mut self, universe: &Universe) -> usize {
        self.refresh(universe);
        self.matches
            .iter()
            .map(|archetype| archetype.entity_count(universe))
            .sum()
    }

    pub fn entities(&mut self, universe: &Universe) -> Vec<Entity> {
        self.iter(universe).collect()
    }

    /// Matching entities, archetype by archetype, in row order.
    pub fn iter<'a>(&'a mut self, universe: &'a Universe) -> impl Iterator<Item = Entity> + 'a {
        self.refresh(universe);
        self.matches
            .iter()
            .flat_map(move |archetype| archetype.entities(universe).iter().copied())
    }

    /// Run `action` on every matching entity.
    ///
    /// Structural changes to this query's world are deferred for the whole
    /// loop and replayed afterwards, so rows never shift underneath it. Each
    /// archetype's entity count is read once before its rows are visited.
    pub fn for_each<F>(&mut self, universe: &mut Universe, mut action: F)
    where
        F: FnMut(&mut Universe, Entity),
    {
        if !self.refresh(universe) {
            return;
        }
        let mut scope = universe.structural_scope(self.world);
        for archetype in &self.matches {
            let count = archetype.entity_count(&scope);
            for row in 0..count {
                let Some(entity) = scope.archetype_storage(*archetype).and_then(|s| s.entity_at(row))
                else {
                    break;
                };
                action(&mut *scope, entity);
            }
        }
    }

    /// Destroy every matching archetype and the entities in it.
    pub fn destroy_matching(&mut self, universe: &mut Universe) {
        self.refresh(universe);
        let snapshot = self.matches.clone();
        for archetype in snapshot {
            archetype.destroy(universe);
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query(with {} without {} in {})",
            self.include, self.exclude, self.world
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Position(f32);
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Velocity(f32);
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Frozen;

    fn spawn(universe: &mut Universe, world: World, velocity: bool, frozen: bool) -> Entity {
        let entity = world.create_entity(universe).unwrap();
        entity.set(universe, Position(1.0));
        if velocity {
            entity.set(universe, Velocity(2.0));
        }
        if frozen {
            entity.set(universe, Frozen);
        }
        entity
    }

    #[test]
    fn with_and_without_filter_archetypes() {
        let mut universe = Universe::new();
        let world = universe.create_world("filters");
        let moving = spawn(&mut universe, world, true, false);
        let frozen = spawn(&mut universe, world, true, true);
        let still = spawn(&mut universe, world, false, false);

        let mut movers = world.create_query().with::<Position>().with::<Velocity>().without::<Frozen>();
        assert_eq!(movers.entities(&universe), vec![moving]);

        let mut positioned = world.create_query().with::<Position>();
        let mut all = positioned.entities(&universe);
        all.sort_by_key(|e| e.index());
        assert_eq!(all, vec![moving, frozen, still]);
        assert_eq!(positioned.entity_count(&universe), 3);
    }

    #[test]
    fn appended_archetypes_are_picked_up_incrementally() {
        let mut universe = Universe::new();
        let world = universe.create_world("incremental");
        let mut query = world.create_query().with::<Position>();
        spawn(&mut universe, world, false, false);
        assert_eq!(query.archetypes(&universe).len(), 1);
        let version = query.seen_version;

        spawn(&mut universe, world, true, false);
        assert_eq!(query.archetypes(&universe).len(), 2);
        assert_eq!(query.seen_version, version);
    }

    #[test]
    fn structural_version_change_forces_rescan() {
        let mut universe = Universe::new();
        let world = universe.create_world("rescan");
        let mut query = world.create_query().with::<Position>();
        let entity = spawn(&mut universe, world, true, false);
        assert_eq!(query.archetypes(&universe).len(), 1);

        entity.archetype(&universe).unwrap().destroy(&mut universe);
        assert!(query.archetypes(&universe).is_empty());
    }

    #[test]
    fn for_each_defers_destruction_until_the_loop_ends() {
        let mut universe = Universe::new();
        let world = universe.create_world("for_each");
        for _ in 0..5 {
            spawn(&mut universe, world, false, false);
        }

        let mut query = world.create_query().with::<Position>();
        let mut visited = 0;
        query.for_each(&mut universe, |universe, entity| {
            visited += 1;
            entity.destroy(universe);
            assert!(entity.is_valid(universe));
        });
        assert_eq!(visited, 5);
        assert_eq!(query.entity_count(&universe), 0);
        assert!(!world.is_deferring(&universe));
    }

    #[test]
    fn for_each_can_mutate_components_in_place() {
        let mut universe = Universe::new();
        let world = universe.create_world("mutate");
        let entity = spawn(&mut universe, world, true, false);

        let mut query = world.create_query().with::<Position>().with::<Velocity>();
        query.for_each(&mut universe, |universe, entity| {
            let velocity = *entity.get::<Velocity>(universe).unwrap();
            entity.get_mut::<Position>(universe).unwrap().0 += velocity.0;
        });
        assert_eq!(entity.get::<Position>(&universe), Ok(&Position(3.0)));
    }

    #[test]
    fn destroy_matching_clears_every_match() {
        let mut universe = Universe::new();
        let world = universe.create_world("destroy_matching");
        let keep = world.create_entity(&mut universe).unwrap();
        spawn(&mut universe, world, false, false);
        spawn(&mut universe, world, true, false);

        let mut query = world.create_query().with::<Position>();
        query.destroy_matching(&mut universe);
        assert_eq!(query.entity_count(&universe), 0);
        assert_eq!(world.entity_count(&universe), 1);
        assert!(keep.is_valid(&universe));
    }

    #[test]
    fn clear_resets_filters() {
        let mut universe = Universe::new();
        let world = universe.create_world("clear");
        spawn(&mut universe, world, false, false);
        world.create_entity(&mut universe).unwrap();

        let mut query = world.create_query().with::<Position>();
        assert_eq!(query.entity_count(&universe), 1);
        query.clear();
        assert_eq!(query.entity_count(&universe), 2);
    }

    #[test]
    fn stale_world_yields_nothing() {
        let mut universe = Universe::new();
        let world = universe.create_world("stale");
        spawn(&mut universe, world, false, false);
        let mut query = world.create_query();
        world.destroy(&mut universe);

        assert!(query.entities(&universe).is_empty());
        let mut called = false;
        query.for_each(&mut universe, |_, _| called = true);
        assert!(!called);
    }

    #[test]
    fn display_names_filters() {
        let query = World::NULL.create_query().with::<Velocity>().without::<Frozen>();
        assert_eq!(query.to_string(), "Query(with [Velocity] without [Frozen] in World(0v0))");
    }
}
