// archetype_storage.rs - Columnar storage for one archetype
//
// Every archetype owns one dense column per component type plus the list of
// resident entities. Row `i` of every column belongs to `entities[i]`.
// Columns are found through a small bucket table indexed by
// `component_id % bucket_count` with overflow chained through `next`.

use std::any::Any;

use crate::ecs::archetype::Archetype;
use crate::ecs::component::{component_meta, Component, ComponentId, INVALID_COMPONENT};
use crate::ecs::entity::Entity;
use crate::ecs::signature::TypeSignature;

use super::column::{Column, TypedColumn};

/// Smallest row capacity an archetype ever holds.
pub const MIN_CAPACITY: usize = 8;

/// Placement of one component in the bucket table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketPlan {
    pub component: ComponentId,
    pub next: Option<usize>,
}

impl BucketPlan {
    const EMPTY: BucketPlan = BucketPlan {
        component: INVALID_COMPONENT,
        next: None,
    };

    fn is_empty(&self) -> bool {
        self.component == INVALID_COMPONENT
    }
}

/// Lay out `ids` over `max(1, ids.len())` buckets.
///
/// Pass 1 puts every id whose natural bucket is free there. Pass 2 walks the
/// chain from the natural bucket and links the first free bucket at its tail.
pub(crate) fn plan_buckets(ids: &[ComponentId]) -> Vec<BucketPlan> {
    let bucket_count = ids.len().max(1);
    let mut buckets = vec![BucketPlan::EMPTY; bucket_count];

    for &id in ids {
        let natural = id as usize % bucket_count;
        if buckets[natural].is_empty() {
            buckets[natural].component = id;
        }
    }

    for &id in ids {
        if buckets.iter().any(|bucket| bucket.component == id) {
            continue;
        }
        let mut tail = id as usize % bucket_count;
        while let Some(next) = buckets[tail].next {
            tail = next;
        }
        let Some(free) = buckets.iter().position(BucketPlan::is_empty) else {
            panic!("bucket table exhausted placing component {id}");
        };
        buckets[tail].next = Some(free);
        buckets[free].component = id;
    }

    buckets
}

struct Bucket {
    plan: BucketPlan,
    column: Option<Box<dyn Column>>,
}

/// Values and back-pointer fix-up produced by a swap-remove.
pub(crate) struct RemovedRow {
    /// Entity that now occupies the removed row, if any moved.
    pub moved: Option<Entity>,
    /// Values the caller asked to keep, by component.
    pub values: Vec<(ComponentId, Box<dyn Any>)>,
}

/// Result of moving a row between two archetypes.
pub(crate) struct Migration {
    /// Row in the destination archetype.
    pub row: usize,
    /// Entity that now occupies the vacated source row, if any moved.
    pub moved: Option<Entity>,
    /// Source values with no column in the destination, when kept.
    pub removed: Vec<(ComponentId, Box<dyn Any>)>,
}

/// Storage for all entities of a single archetype.
pub struct ArchetypeStorage {
    handle: Archetype,
    signature: TypeSignature,
    entities: Vec<Entity>,
    capacity: usize,
    buckets: Box<[Bucket]>,
}

impl ArchetypeStorage {
    /// Build storage for `signature`. Every id must be registered.
    pub(crate) fn new(handle: Archetype, signature: TypeSignature) -> Self {
        let buckets: Box<[Bucket]> = plan_buckets(signature.ids())
            .into_iter()
            .map(|plan| {
                let column = (!plan.is_empty()).then(|| {
                    let Some(meta) = component_meta(plan.component) else {
                        panic!("component {} is not registered", plan.component);
                    };
                    (meta.new_column)(plan.component)
                });
                Bucket { plan, column }
            })
            .collect();

        let mut storage = Self {
            handle,
            signature,
            entities: Vec::new(),
            capacity: 0,
            buckets,
        };
        storage.resize(MIN_CAPACITY);
        storage
    }

    pub fn handle(&self) -> Archetype {
        self.handle
    }

    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Rows currently reserved in every column.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_at(&self, row: usize) -> Option<Entity> {
        self.entities.get(row).copied()
    }

    pub fn has(&self, id: ComponentId) -> bool {
        self.bucket_of(id).is_some()
    }

    /// Raw column for `T`, one value per resident entity.
    pub fn column<T: Component>(&self) -> Option<&[T]> {
        self.typed::<T>().map(TypedColumn::as_slice)
    }

    pub fn column_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        self.typed_mut::<T>().map(TypedColumn::as_mut_slice)
    }

    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        self.column::<T>()?.get(row)
    }

    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(row)
    }

    /// Visit every value of `row` in bucket order.
    pub fn visit_row(&self, row: usize, mut visitor: impl FnMut(ComponentId, &dyn Any)) {
        for column in self.columns() {
            if let Some(value) = column.get_erased(row) {
                visitor(column.component(), value);
            }
        }
    }

    /// Grow every column to the next power of two that fits `required` rows.
    pub fn ensure_capacity(&mut self, required: usize) {
        if required <= self.capacity {
            return;
        }
        let mut size = self.capacity.max(MIN_CAPACITY);
        while size < required {
            size *= 2;
        }
        self.resize(size);
    }

    /// Shrink to the smallest power of two strictly above the row count.
    pub fn shrink_to_fit(&mut self) {
        let mut size = MIN_CAPACITY;
        while size <= self.len() {
            size *= 2;
        }
        if size != self.capacity {
            self.resize(size);
        }
    }

    fn resize(&mut self, size: usize) {
        if size > self.capacity {
            self.entities.reserve_exact(size - self.entities.len());
            for column in self.columns_mut() {
                column.reserve_total(size);
            }
        } else {
            self.entities.shrink_to(size);
            for column in self.columns_mut() {
                column.shrink_total(size);
            }
        }
        self.capacity = size;
    }

    /// Append `entity` with default values in every column.
    pub(crate) fn push_default_row(&mut self, entity: Entity) -> usize {
        self.ensure_capacity(self.len() + 1);
        let row = self.entities.len();
        self.entities.push(entity);
        for column in self.columns_mut() {
            column.push_default();
        }
        row
    }

    /// Fill the `T` column of the row appended last by a migration.
    pub(crate) fn push_value<T: Component>(&mut self, value: T) -> &mut T {
        let expected = self.len() - 1;
        let Some(column) = self.typed_mut::<T>() else {
            panic!("archetype has no column for {}", std::any::type_name::<T>());
        };
        debug_assert_eq!(column.as_slice().len(), expected);
        column.push(value)
    }

    /// Swap-remove `row`, keeping the values whose component `keep` accepts.
    pub(crate) fn swap_remove_row(
        &mut self,
        row: usize,
        mut keep: impl FnMut(ComponentId) -> bool,
    ) -> RemovedRow {
        let mut values = Vec::new();
        for column in self.columns_mut() {
            let id = column.component();
            if keep(id) {
                values.push((id, column.swap_remove_erased(row)));
            } else {
                column.swap_remove_drop(row);
            }
        }
        self.entities.swap_remove(row);
        RemovedRow {
            moved: self.entities.get(row).copied(),
            values,
        }
    }

    /// Move `row` into `dst`. Columns `dst` lacks are dropped unless `keep` accepts them.
    ///
    /// Columns `dst` has but `self` lacks are left one short; the caller fills
    /// them with [`push_value`](Self::push_value).
    pub(crate) fn migrate_row(
        &mut self,
        row: usize,
        dst: &mut ArchetypeStorage,
        mut keep: impl FnMut(ComponentId) -> bool,
    ) -> Migration {
        let entity = self.entities[row];
        dst.ensure_capacity(dst.len() + 1);
        let dst_row = dst.entities.len();
        dst.entities.push(entity);

        let mut removed = Vec::new();
        for bucket in self.buckets.iter_mut() {
            let Some(column) = bucket.column.as_deref_mut() else {
                continue;
            };
            let id = bucket.plan.component;
            match dst.column_dyn_mut(id) {
                Some(target) => column.migrate_row(row, target),
                None if keep(id) => removed.push((id, column.swap_remove_erased(row))),
                None => column.swap_remove_drop(row),
            }
        }
        self.entities.swap_remove(row);

        Migration {
            row: dst_row,
            moved: self.entities.get(row).copied(),
            removed,
        }
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = &(dyn Column + 'static)> + '_ {
        self.buckets.iter().filter_map(|bucket| bucket.column.as_deref())
    }

    fn columns_mut(&mut self) -> impl Iterator<Item = &mut (dyn Column + 'static)> + '_ {
        self.buckets
            .iter_mut()
            .filter_map(|bucket| bucket.column.as_deref_mut())
    }

    fn bucket_of(&self, id: ComponentId) -> Option<usize> {
        if id == INVALID_COMPONENT {
            return None;
        }
        let mut index = id as usize % self.buckets.len();
        loop {
            let plan = &self.buckets[index].plan;
            if plan.component == id {
                return Some(index);
            }
            index = plan.next?;
        }
    }

    fn column_dyn_mut(&mut self, id: ComponentId) -> Option<&mut (dyn Column + 'static)> {
        let index = self.bucket_of(id)?;
        self.buckets[index].column.as_deref_mut()
    }

    fn typed<T: Component>(&self) -> Option<&TypedColumn<T>> {
        let index = self.bucket_of(crate::ecs::component_id::<T>())?;
        self.buckets[index]
            .column
            .as_deref()?
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
    }

    fn typed_mut<T: Component>(&mut self) -> Option<&mut TypedColumn<T>> {
        let index = self.bucket_of(crate::ecs::component_id::<T>())?;
        self.buckets[index]
            .column
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
    }

    #[cfg(test)]
    pub(crate) fn bucket_plans(&self) -> Vec<BucketPlan> {
        self.buckets.iter().map(|bucket| bucket.plan).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Position(f32, f32);
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Velocity(f32, f32);
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Health(u32);

    fn storage_for(signature: TypeSignature) -> ArchetypeStorage {
        ArchetypeStorage::new(Archetype::new(World::NULL, 0, 1), signature)
    }

    fn entity(index: u32) -> Entity {
        Entity::new(index, 1)
    }

    #[test]
    fn colliding_ids_are_chained() {
        // all three land in bucket 0
        let plan = plan_buckets(&[9, 6, 3]);
        assert_eq!(
            plan,
            vec![
                BucketPlan { component: 9, next: Some(1) },
                BucketPlan { component: 6, next: Some(2) },
                BucketPlan { component: 3, next: None },
            ]
        );
    }

    #[test]
    fn natural_slots_win_before_chaining() {
        // 8 -> 2, 4 -> 1, 5 wants 2 and is chained to the free bucket 0
        let plan = plan_buckets(&[8, 5, 4]);
        assert_eq!(plan[0], BucketPlan { component: 5, next: None });
        assert_eq!(plan[1], BucketPlan { component: 4, next: None });
        assert_eq!(plan[2], BucketPlan { component: 8, next: Some(0) });
    }

    #[test]
    fn empty_signature_gets_one_empty_bucket() {
        assert_eq!(plan_buckets(&[]), vec![BucketPlan::EMPTY]);
        let storage = storage_for(TypeSignature::new());
        assert_eq!(storage.columns().count(), 0);
        assert!(!storage.has(INVALID_COMPONENT));
    }

    #[test]
    fn every_signature_component_is_found() {
        let signature = TypeSignature::new()
            .with::<Position>()
            .with::<Velocity>()
            .with::<Health>();
        let storage = storage_for(signature.clone());
        for id in signature.iter() {
            assert!(storage.has(id));
        }
        assert_eq!(storage.bucket_plans().len(), 3);
        assert_eq!(storage.columns().count(), 3);
    }

    #[test]
    fn capacity_doubles_from_minimum() {
        let mut storage = storage_for(TypeSignature::new().with::<Health>());
        assert_eq!(storage.capacity(), MIN_CAPACITY);
        for i in 0..9 {
            storage.push_default_row(entity(i));
        }
        assert_eq!(storage.capacity(), 16);
        storage.ensure_capacity(33);
        assert_eq!(storage.capacity(), 64);
    }

    #[test]
    fn shrink_uses_power_of_two_strictly_above_count() {
        let mut storage = storage_for(TypeSignature::new().with::<Health>());
        storage.ensure_capacity(128);
        for i in 0..8 {
            storage.push_default_row(entity(i));
        }
        storage.shrink_to_fit();
        assert_eq!(storage.capacity(), 16);

        let mut small = storage_for(TypeSignature::new());
        small.ensure_capacity(40);
        small.shrink_to_fit();
        assert_eq!(small.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn swap_remove_reports_moved_entity() {
        let mut storage = storage_for(TypeSignature::new().with::<Health>());
        for i in 0..3 {
            let row = storage.push_default_row(entity(i));
            *storage.get_mut::<Health>(row).unwrap() = Health(i * 10);
        }

        let removed = storage.swap_remove_row(0, |_| true);
        assert_eq!(removed.moved, Some(entity(2)));
        assert_eq!(removed.values.len(), 1);
        assert_eq!(removed.values[0].1.downcast_ref::<Health>(), Some(&Health(0)));
        assert_eq!(storage.entities(), &[entity(2), entity(1)]);
        assert_eq!(storage.column::<Health>().unwrap(), &[Health(20), Health(10)]);

        let last = storage.swap_remove_row(1, |_| false);
        assert_eq!(last.moved, None);
        assert!(last.values.is_empty());
    }

    #[test]
    fn migrate_row_carries_shared_columns() {
        let mut src = storage_for(TypeSignature::new().with::<Position>().with::<Health>());
        let mut dst = storage_for(TypeSignature::new().with::<Position>().with::<Velocity>());

        for i in 0..2 {
            let row = src.push_default_row(entity(i));
            *src.get_mut::<Position>(row).unwrap() = Position(i as f32, 0.0);
        }

        let migration = src.migrate_row(0, &mut dst, |_| true);
        assert_eq!(migration.row, 0);
        assert_eq!(migration.moved, Some(entity(1)));
        assert_eq!(migration.removed.len(), 1);
        assert_eq!(migration.removed[0].1.downcast_ref::<Health>(), Some(&Health(0)));

        dst.push_value(Velocity(1.0, 1.0));
        assert_eq!(dst.get::<Position>(0), Some(&Position(0.0, 0.0)));
        assert_eq!(dst.get::<Velocity>(0), Some(&Velocity(1.0, 1.0)));
        assert_eq!(src.get::<Position>(0), Some(&Position(1.0, 0.0)));
        assert_eq!(src.entities(), &[entity(1)]);
    }

    #[test]
    fn visit_row_sees_every_component() {
        let mut storage = storage_for(TypeSignature::new().with::<Position>().with::<Health>());
        storage.push_default_row(entity(0));
        let mut seen = Vec::new();
        storage.visit_row(0, |id, _| seen.push(id));
        seen.sort_unstable();
        let mut expected: Vec<_> = storage.signature().iter().collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }
}
