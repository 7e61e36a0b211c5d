//! Per-world component callbacks.
//!
//! Every set or remove subscriber is normalised to one canonical closure
//! shape per component type, so a type has exactly one ordered list of each.
//! Hooks run in registration order.

use std::any::Any;

use super::component::{component_id, Component, ComponentId};
use super::entity::Entity;
use super::storage::{Column, TypedColumn};

/// Canonical set callback: entity, previous value when written in place, new value.
pub type SetHook<T> = Box<dyn FnMut(Entity, Option<&T>, &mut T)>;

/// Canonical remove callback: entity and the value being removed.
pub type RemoveHook<T> = Box<dyn FnMut(Entity, &T)>;

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId {
    component: ComponentId,
    serial: u64,
}

impl HookId {
    pub fn component(&self) -> ComponentId {
        self.component
    }
}

struct ComponentHooks<T> {
    on_set: Vec<(u64, SetHook<T>)>,
    on_remove: Vec<(u64, RemoveHook<T>)>,
}

impl<T> Default for ComponentHooks<T> {
    fn default() -> Self {
        Self {
            on_set: Vec::new(),
            on_remove: Vec::new(),
        }
    }
}

trait ErasedHooks {
    fn has_remove(&self) -> bool;
    fn unsubscribe(&mut self, serial: u64) -> bool;
    fn fire_remove(&mut self, entity: Entity, value: &dyn Any);
    fn fire_remove_column(&mut self, entities: &[Entity], column: &dyn Column);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedHooks for ComponentHooks<T> {
    fn has_remove(&self) -> bool {
        !self.on_remove.is_empty()
    }

    fn unsubscribe(&mut self, serial: u64) -> bool {
        let before = self.on_set.len() + self.on_remove.len();
        self.on_set.retain(|(id, _)| *id != serial);
        self.on_remove.retain(|(id, _)| *id != serial);
        before != self.on_set.len() + self.on_remove.len()
    }

    fn fire_remove(&mut self, entity: Entity, value: &dyn Any) {
        let Some(value) = value.downcast_ref::<T>() else {
            return;
        };
        for (_, hook) in self.on_remove.iter_mut() {
            hook(entity, value);
        }
    }

    fn fire_remove_column(&mut self, entities: &[Entity], column: &dyn Column) {
        let Some(column) = column.as_any().downcast_ref::<TypedColumn<T>>() else {
            return;
        };
        for (_, hook) in self.on_remove.iter_mut() {
            for (entity, value) in entities.iter().zip(column.as_slice()) {
                hook(*entity, value);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All hooks of one world, indexed by component id.
#[derive(Default)]
pub(crate) struct HookTable {
    slots: Vec<Option<Box<dyn ErasedHooks>>>,
    next_serial: u64,
}

impl HookTable {
    pub fn on_set<T: Component>(&mut self, hook: SetHook<T>) -> HookId {
        let id = self.next_id::<T>();
        self.typed_or_insert::<T>().on_set.push((id.serial, hook));
        id
    }

    pub fn on_remove<T: Component>(&mut self, hook: RemoveHook<T>) -> HookId {
        let id = self.next_id::<T>();
        self.typed_or_insert::<T>().on_remove.push((id.serial, hook));
        id
    }

    pub fn unsubscribe(&mut self, id: HookId) -> bool {
        self.slots
            .get_mut(id.component as usize)
            .and_then(Option::as_mut)
            .is_some_and(|hooks| hooks.unsubscribe(id.serial))
    }

    pub fn has_remove(&self, component: ComponentId) -> bool {
        self.erased(component).is_some_and(|hooks| hooks.has_remove())
    }

    pub fn fire_set<T: Component>(&mut self, entity: Entity, old: Option<&T>, new: &mut T) {
        let Some(hooks) = self.typed::<T>() else {
            return;
        };
        for (_, hook) in hooks.on_set.iter_mut() {
            hook(entity, old, &mut *new);
        }
    }

    pub fn fire_remove(&mut self, component: ComponentId, entity: Entity, value: &dyn Any) {
        if let Some(hooks) = self.erased_mut(component) {
            hooks.fire_remove(entity, value);
        }
    }

    /// Remove hooks for every row of a column, subscriber by subscriber.
    pub fn fire_remove_column(&mut self, entities: &[Entity], column: &dyn Column) {
        if let Some(hooks) = self.erased_mut(column.component()) {
            hooks.fire_remove_column(entities, column);
        }
    }

    fn next_id<T: Component>(&mut self) -> HookId {
        self.next_serial += 1;
        HookId {
            component: component_id::<T>(),
            serial: self.next_serial,
        }
    }

    fn erased(&self, component: ComponentId) -> Option<&(dyn ErasedHooks + 'static)> {
        self.slots.get(component as usize)?.as_deref()
    }

    fn erased_mut(&mut self, component: ComponentId) -> Option<&mut (dyn ErasedHooks + 'static)> {
        self.slots.get_mut(component as usize)?.as_deref_mut()
    }

    fn typed<T: Component>(&mut self) -> Option<&mut ComponentHooks<T>> {
        self.erased_mut(component_id::<T>())?
            .as_any_mut()
            .downcast_mut::<ComponentHooks<T>>()
    }

    fn typed_or_insert<T: Component>(&mut self) -> &mut ComponentHooks<T> {
        let index = component_id::<T>() as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = self.slots[index].get_or_insert_with(|| Box::new(ComponentHooks::<T>::default()));
        match slot.as_any_mut().downcast_mut::<ComponentHooks<T>>() {
            Some(hooks) => hooks,
            None => panic!("hook table slot {index} holds another component type"),
        }
    }
}
