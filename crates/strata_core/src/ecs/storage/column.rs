// column.rs - Dense, type-erased component column
//
// One column per component type per archetype. Rows are kept contiguous:
// removal swaps the last row into the hole, mirroring the entity list.

use std::any::Any;

use crate::ecs::component::{Component, ComponentId};

/// Object-safe view over a `TypedColumn<T>`.
pub(crate) trait Column {
    fn component(&self) -> ComponentId;

    #[cfg(test)]
    fn len(&self) -> usize;

    /// Make room for `capacity` rows in total.
    fn reserve_total(&mut self, capacity: usize);

    /// Release storage beyond `capacity` rows.
    fn shrink_total(&mut self, capacity: usize);

    fn push_default(&mut self);

    fn swap_remove_drop(&mut self, row: usize);

    fn swap_remove_erased(&mut self, row: usize) -> Box<dyn Any>;

    /// Swap-remove `row` and append the value to `dst`, which must hold the same type.
    fn migrate_row(&mut self, row: usize, dst: &mut dyn Column);

    fn get_erased(&self, row: usize) -> Option<&dyn Any>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) struct TypedColumn<T> {
    component: ComponentId,
    values: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            values: Vec::new(),
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn push(&mut self, value: T) -> &mut T {
        self.values.push(value);
        let last = self.values.len() - 1;
        &mut self.values[last]
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn component(&self) -> ComponentId {
        self.component
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.values.len()
    }

    fn reserve_total(&mut self, capacity: usize) {
        if capacity > self.values.capacity() {
            self.values.reserve_exact(capacity - self.values.len());
        }
    }

    fn shrink_total(&mut self, capacity: usize) {
        self.values.shrink_to(capacity);
    }

    fn push_default(&mut self) {
        self.values.push(T::default());
    }

    fn swap_remove_drop(&mut self, row: usize) {
        self.values.swap_remove(row);
    }

    fn swap_remove_erased(&mut self, row: usize) -> Box<dyn Any> {
        Box::new(self.values.swap_remove(row))
    }

    fn migrate_row(&mut self, row: usize, dst: &mut dyn Column) {
        let value = self.values.swap_remove(row);
        let Some(dst) = dst.as_any_mut().downcast_mut::<TypedColumn<T>>() else {
            panic!("column type mismatch while migrating component {}", self.component);
        };
        dst.values.push(value);
    }

    fn get_erased(&self, row: usize) -> Option<&dyn Any> {
        self.values.get(row).map(|value| value as &dyn Any)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
