//! Strata Runtime
//!
//! Small driver binary: boots a universe, spawns a handful of movers and runs
//! a fixed number of simulation ticks through cached queries.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use strata_core::ecs::{Universe, World};
use strata_core::{spawn, UniverseConfig};

const TICKS: u32 = 8;

#[derive(Debug, Default, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

/// Ticks left before the entity is destroyed.
#[derive(Debug, Default, Clone, Copy)]
struct Lifetime(u32);

/// One-tick marker entities, cleared at the end of every tick.
#[derive(Debug, Default, Clone)]
struct Event(String);

#[derive(Debug, Default)]
struct TimeData {
    tick: u32,
    delta: f32,
}

fn load_config() -> Result<UniverseConfig> {
    let Ok(path) = std::env::var("STRATA_CONFIG") else {
        return Ok(UniverseConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {path}"))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    tracing::info!("Loaded config from {}", path);
    Ok(config)
}

fn populate(universe: &mut Universe, world: World) -> Result<()> {
    for i in 0..6u32 {
        spawn!(
            universe,
            world,
            Position { x: i as f32, y: 0.0 },
            Velocity { x: 1.0, y: 0.5 },
            Lifetime(3 + i)
        )
        .context("world vanished while spawning movers")?;
    }
    // Stationary markers never match the movement query.
    for i in 0..3u32 {
        spawn!(universe, world, Position { x: -(i as f32), y: 1.0 })
            .context("world vanished while spawning markers")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Strata ECS v{}", strata_core::VERSION);
    let config = load_config()?;
    let mut universe = Universe::with_config(config);
    let world = universe.create_world("main");
    world.set_data(&mut universe, TimeData { tick: 0, delta: 1.0 / 60.0 });

    let expired = Rc::new(Cell::new(0usize));
    let sink = Rc::clone(&expired);
    world.on_remove::<Lifetime, _>(&mut universe, move |entity, _| {
        sink.set(sink.get() + 1);
        tracing::debug!("{} expired", entity);
    });

    populate(&mut universe, world)?;
    tracing::info!("{} entities in {} archetypes", world.entity_count(&universe), world.archetype_count(&universe));

    let mut movers = world.create_query().with::<Position>().with::<Velocity>();
    let mut lifetimes = world.create_query().with::<Lifetime>();
    let mut events = world.create_query().with::<Event>();

    for _ in 0..TICKS {
        let (tick, delta) = {
            let time = world.get_data_mut::<TimeData>(&mut universe)?;
            time.tick += 1;
            (time.tick, time.delta)
        };

        movers.for_each(&mut universe, |universe, entity| {
            let Ok(velocity) = entity.get::<Velocity>(universe).copied() else {
                return;
            };
            if let Ok(position) = entity.get_mut::<Position>(universe) {
                position.x += velocity.x * delta;
                position.y += velocity.y * delta;
            }
        });

        lifetimes.for_each(&mut universe, |universe, entity| {
            let remaining = match entity.get_mut::<Lifetime>(universe) {
                Ok(lifetime) => {
                    lifetime.0 = lifetime.0.saturating_sub(1);
                    lifetime.0
                }
                Err(_) => return,
            };
            if remaining == 0 {
                if let Some(world) = entity.world(universe) {
                    spawn!(universe, world, Event(format!("{entity} expired on tick {tick}")));
                }
                entity.destroy(universe);
            }
        });

        for event in events.iter(&universe) {
            if let Ok(Event(message)) = event.get::<Event>(&universe) {
                tracing::info!("{}", message);
            }
        }
        events.destroy_matching(&mut universe);

        tracing::info!(
            "tick {}: {} entities, {} movers",
            tick,
            world.entity_count(&universe),
            movers.entity_count(&universe)
        );
    }

    world.destroy_empty_archetypes(&mut universe);
    tracing::info!("{} lifetimes expired", expired.get());
    if let Some(metrics) = world.metrics(&universe) {
        for (name, value) in metrics.iter() {
            tracing::info!("{}: {}", name, value);
        }
    }

    world.destroy(&mut universe);
    tracing::info!("Shutdown complete");
    Ok(())
}
