// commands.rs - Deferred structural changes
//
// While a world's deferral depth is above zero every structural operation
// aimed at it is recorded here instead of touching storage. The log replays
// in FIFO order when the depth returns to zero.

use std::any::Any;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use super::archetype::Archetype;
use super::component::ComponentId;
use super::entity::Entity;
use super::universe::Universe;
use super::world::World;

pub(crate) enum Command {
    CreateEntity {
        entity: Entity,
        archetype: Archetype,
    },
    DestroyEntity {
        entity: Entity,
    },
    SetComponent {
        entity: Entity,
        component: ComponentId,
        value: Box<dyn Any>,
    },
    RemoveComponent {
        entity: Entity,
        component: ComponentId,
    },
    TransferEntity {
        entity: Entity,
        target: World,
    },
    DestroyArchetype {
        archetype: Archetype,
    },
    ResizeArchetype {
        archetype: Archetype,
    },
    DestroyWorld,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateEntity { .. } => "create_entity",
            Command::DestroyEntity { .. } => "destroy_entity",
            Command::SetComponent { .. } => "set_component",
            Command::RemoveComponent { .. } => "remove_component",
            Command::TransferEntity { .. } => "transfer_entity",
            Command::DestroyArchetype { .. } => "destroy_archetype",
            Command::ResizeArchetype { .. } => "resize_archetype",
            Command::DestroyWorld => "destroy_world",
        }
    }
}

/// Per-world deferral depth and pending commands.
#[derive(Default)]
pub(crate) struct CommandLog {
    depth: u32,
    queue: VecDeque<Command>,
}

impl CommandLog {
    #[inline]
    pub fn is_deferring(&self) -> bool {
        self.depth > 0
    }

    #[cfg(test)]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leave one level. Returns true when this was the outermost level.
    pub fn exit(&mut self) -> bool {
        match self.depth.checked_sub(1) {
            Some(depth) => {
                self.depth = depth;
                depth == 0
            }
            None => {
                tracing::warn!("structural scope exited more often than entered");
                false
            }
        }
    }

    pub fn push(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.queue.drain(..)
    }
}

/// Defers structural changes to one world for as long as it lives.
///
/// Scopes nest; the outermost one replays pending commands on drop. If the
/// scope is dropped while unwinding the depth is still restored but replay
/// waits for the next balanced exit.
///
/// ```ignore
/// let mut scope = universe.structural_scope(world);
/// entity.destroy(&mut scope); // recorded, not applied
/// drop(scope);                // applied here
/// ```
pub struct StructuralScope<'u> {
    universe: &'u mut Universe,
    world: World,
}

impl<'u> StructuralScope<'u> {
    pub(crate) fn new(universe: &'u mut Universe, world: World) -> Self {
        universe.enter_deferral(world);
        Self { universe, world }
    }

    pub fn world(&self) -> World {
        self.world
    }
}

impl Deref for StructuralScope<'_> {
    type Target = Universe;

    fn deref(&self) -> &Universe {
        self.universe
    }
}

impl DerefMut for StructuralScope<'_> {
    fn deref_mut(&mut self) -> &mut Universe {
        self.universe
    }
}

impl Drop for StructuralScope<'_> {
    fn drop(&mut self) {
        let replay = !std::thread::panicking();
        self.universe.exit_deferral(self.world, replay);
    }
}
