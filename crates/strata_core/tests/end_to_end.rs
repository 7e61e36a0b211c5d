// end_to_end.rs - Cross-module scenarios through the public API only

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use strata_core::ecs::{Entity, TypeSignature, Universe, World};
use strata_core::{signature, spawn, UniverseConfig};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct A(u32);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct B(u32);

#[derive(Debug, Default, Clone, PartialEq)]
struct Label(String);

fn world_snapshot(universe: &Universe, world: World) -> Vec<(Option<A>, Option<B>)> {
    let mut rows: Vec<_> = world
        .entities(universe)
        .into_iter()
        .map(|entity| {
            (
                entity.try_get::<A>(universe).copied(),
                entity.try_get::<B>(universe).copied(),
            )
        })
        .collect();
    rows.sort_by_key(|(a, b)| (a.map(|a| a.0), b.map(|b| b.0)));
    rows
}

fn run_script(universe: &mut Universe, world: World) {
    let mut spawned = Vec::new();
    for i in 0..6 {
        let entity = world.create_entity(universe).unwrap();
        entity.set(universe, A(i));
        if i % 2 == 0 {
            entity.set(universe, B(i * 10));
        }
        spawned.push(entity);
    }
    spawned[1].destroy(universe);
    spawned[2].remove::<A>(universe);
    spawned[4].set(universe, A(40));
}

#[test]
fn position_velocity_round_trip() {
    let mut universe = Universe::new();
    let world = universe.create_world("W");

    let e1 = spawn!(&mut universe, world, Position { x: 0.0, y: 0.0 }).unwrap();
    let position_only = e1.archetype(&universe).unwrap();
    assert_eq!(position_only.signature(&universe), Some(&signature![Position]));

    e1.set(&mut universe, Velocity { x: 1.0, y: 1.0 });
    let moving = e1.archetype(&universe).unwrap();
    assert_eq!(moving.signature(&universe), Some(&signature![Position, Velocity]));

    let mut query = world.create_query().with::<Position>().with::<Velocity>();
    assert_eq!(query.entities(&universe), vec![e1]);

    e1.remove::<Velocity>(&mut universe);
    assert_eq!(e1.archetype(&universe), Some(position_only));
    assert!(query.entities(&universe).is_empty());
    assert_eq!(e1.get::<Position>(&universe), Ok(&Position { x: 0.0, y: 0.0 }));
}

#[test]
fn values_survive_interleaved_sets() {
    let mut universe = Universe::new();
    let world = universe.create_world("interleaved");
    let entity = world.create_entity(&mut universe).unwrap();

    entity.set(&mut universe, A(1));
    entity.set(&mut universe, B(2));
    entity.set(&mut universe, A(3));
    entity.set(&mut universe, Label("kept".into()));

    assert_eq!(entity.get::<A>(&universe), Ok(&A(3)));
    assert_eq!(entity.get::<B>(&universe), Ok(&B(2)));
    assert_eq!(entity.get::<Label>(&universe).map(|l| l.0.as_str()), Ok("kept"));
    assert_eq!(entity.component_count(&universe), 3);
}

#[test]
fn query_with_and_without() {
    let mut universe = Universe::new();
    let world = universe.create_world("filters");
    let e1 = spawn!(&mut universe, world, A(1)).unwrap();
    let _e2 = spawn!(&mut universe, world, A(2), B(2)).unwrap();
    let _e3 = spawn!(&mut universe, world, B(3)).unwrap();

    let mut query = world.create_query().with::<A>().without::<B>();
    assert_eq!(query.entities(&universe), vec![e1]);
}

#[test]
fn deferred_replay_matches_immediate_execution() {
    let mut universe = Universe::new();
    let immediate = universe.create_world("immediate");
    let deferred = universe.create_world("deferred");

    run_script(&mut universe, immediate);

    deferred.cache_structural_events(&mut universe, true);
    run_script(&mut universe, deferred);
    assert_eq!(deferred.entity_count(&universe), 0);
    deferred.cache_structural_events(&mut universe, false);

    assert_eq!(
        world_snapshot(&universe, immediate),
        world_snapshot(&universe, deferred)
    );
    assert_eq!(deferred.entity_count(&universe), immediate.entity_count(&universe));
}

#[test]
fn row_back_pointers_hold_after_mixed_operations() {
    let mut universe = Universe::new();
    let world = universe.create_world("rows");
    let mut live: Vec<Entity> = Vec::new();

    for i in 0..64u32 {
        let entity = world.create_entity(&mut universe).unwrap();
        if i % 3 != 0 {
            entity.set(&mut universe, A(i));
        }
        if i % 4 == 0 {
            entity.set(&mut universe, B(i));
        }
        live.push(entity);
        if i % 5 == 0 {
            let victim = live.remove(live.len() / 2);
            victim.destroy(&mut universe);
        }
        if i % 7 == 0 {
            if let Some(target) = live.first() {
                target.remove::<A>(&mut universe);
            }
        }
    }

    let mut values = 0u32;
    for archetype in world.archetypes(&universe) {
        let a_column = archetype.components::<A>(&universe);
        let b_column = archetype.components::<B>(&universe);
        for (row, entity) in archetype.entities(&universe).iter().enumerate() {
            assert!(entity.is_valid(&universe));
            assert_eq!(entity.archetype(&universe), Some(archetype));
            // get() resolves through the entity's stored row, the columns by position
            if let Some(column) = a_column {
                assert_eq!(entity.get::<A>(&universe), Ok(&column[row]));
                values += 1;
            }
            if let Some(column) = b_column {
                assert_eq!(entity.get::<B>(&universe), Ok(&column[row]));
                values += 1;
            }
        }
    }
    assert!(values > 0);
    for entity in &live {
        assert!(entity.is_valid(&universe));
        let archetype = entity.archetype(&universe).unwrap();
        assert!(archetype.entities(&universe).contains(entity));
    }
    assert_eq!(world.entity_count(&universe), live.len());
}

#[test]
fn bulk_archetype_destroy_counts_and_callbacks() {
    let mut universe = Universe::new();
    let world = universe.create_world("bulk");
    let removed: Rc<RefCell<HashMap<&'static str, Vec<Entity>>>> = Rc::default();

    let sink = Rc::clone(&removed);
    world.on_remove::<A, _>(&mut universe, move |entity, _| {
        sink.borrow_mut().entry("A").or_default().push(entity);
    });
    let sink = Rc::clone(&removed);
    world.on_remove::<B, _>(&mut universe, move |entity, _| {
        sink.borrow_mut().entry("B").or_default().push(entity);
    });

    let archetype = world
        .try_get_archetype(&mut universe, &TypeSignature::new().with::<A>().with::<B>())
        .unwrap();
    let residents: Vec<_> = (0..5)
        .map(|_| archetype.create_entity(&mut universe).unwrap())
        .collect();
    let bystander = spawn!(&mut universe, world, A(9)).unwrap();
    let before = world.entity_count(&universe);

    archetype.destroy(&mut universe);

    assert_eq!(world.entity_count(&universe), before - residents.len());
    assert!(residents.iter().all(|e| !e.is_valid(&universe)));
    assert!(bystander.is_valid(&universe));
    let removed = removed.borrow();
    assert_eq!(removed["A"], residents);
    assert_eq!(removed["B"], residents);
}

#[test]
fn query_for_each_with_structural_changes() {
    let mut universe = Universe::new();
    let world = universe.create_world("systems");
    for i in 0..4 {
        spawn!(
            &mut universe,
            world,
            Position { x: i as f32, y: 0.0 },
            Velocity { x: 1.0, y: 0.0 }
        );
    }

    let mut movers = world.create_query().with::<Position>().with::<Velocity>();
    movers.for_each(&mut universe, |universe, entity| {
        let velocity = *entity.get::<Velocity>(universe).unwrap();
        let position = entity.get_mut::<Position>(universe).unwrap();
        position.x += velocity.x;
        if position.x >= 3.0 {
            entity.remove::<Velocity>(universe);
        }
    });

    assert_eq!(movers.entity_count(&universe), 2);
    let mut resting = world.create_query().with::<Position>().without::<Velocity>();
    let mut xs: Vec<_> = resting
        .iter(&universe)
        .map(|e| e.get::<Position>(&universe).unwrap().x)
        .collect();
    xs.sort_by(f32::total_cmp);
    assert_eq!(xs, vec![3.0, 4.0]);
}

#[test]
fn set_hook_shapes_share_one_ordered_list() {
    let mut universe = Universe::new();
    let world = universe.create_world("hooks");
    let calls = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&calls);
    world.on_set::<A, _>(&mut universe, move |_, old, _| {
        sink.borrow_mut().push(format!("full old={:?}", old.map(|a| a.0)));
    });
    let sink = Rc::clone(&calls);
    let middle = world
        .on_set_entity::<A, _>(&mut universe, move |_, value| {
            sink.borrow_mut().push(format!("entity {}", value.0));
        })
        .unwrap();
    let sink = Rc::clone(&calls);
    world.on_set_value::<A, _>(&mut universe, move |value| {
        value.0 *= 2;
        sink.borrow_mut().push(format!("value {}", value.0));
    });

    let entity = spawn!(&mut universe, world, A(1)).unwrap();
    assert!(world.remove_hook(&mut universe, middle));
    entity.set(&mut universe, A(5));

    assert_eq!(
        *calls.borrow(),
        vec![
            "full old=None".to_string(),
            "entity 1".to_string(),
            "value 2".to_string(),
            "full old=Some(2)".to_string(),
            "value 10".to_string(),
        ]
    );
    assert_eq!(entity.get::<A>(&universe), Ok(&A(10)));
}

#[test]
fn config_sizes_the_universe() {
    let config: UniverseConfig =
        serde_json::from_str(r#"{ "entity_capacity": 8, "world_capacity": 1 }"#).unwrap();
    let mut universe = Universe::with_config(config);
    assert_eq!(universe.config().entity_capacity, 8);

    let world = universe.create_world("small");
    for _ in 0..20 {
        world.create_entity(&mut universe).unwrap();
    }
    assert_eq!(world.entity_count(&universe), 20);
}

#[test]
fn entity_debug_visitor_and_lookup() {
    let mut universe = Universe::new();
    let world = universe.create_world("debug");
    let entity = spawn!(&mut universe, world, A(7), B(8)).unwrap();

    let mut total = 0;
    entity.visit_components(&universe, |_, value| {
        if let Some(a) = value.downcast_ref::<A>() {
            total += a.0;
        }
        if let Some(b) = value.downcast_ref::<B>() {
            total += b.0;
        }
    });
    assert_eq!(total, 15);
    assert_eq!(universe.try_get_entity(entity.index()), Some(entity));
    assert_eq!(Entity::from_bits(entity.to_bits()), entity);

    entity.destroy(&mut universe);
    assert_eq!(universe.try_get_entity(entity.index()), None);
}
