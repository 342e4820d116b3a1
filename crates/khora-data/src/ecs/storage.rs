// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sparse-set component pools.

use khora_core::ecs::{Component, EntityId};
use std::any::Any;

const EMPTY: u32 = u32::MAX;

/// Dense storage for every component of type `T` in one world.
///
/// Components live in a packed array with a sparse index keyed by entity slot,
/// which makes lookup, insertion and removal $O(1)$. Removal swaps the last
/// element into the hole, so iteration order is the *storage* order: it starts
/// out as insertion order but diverges as soon as anything is removed.
#[derive(Debug)]
pub struct ComponentPool<T> {
    sparse: Vec<u32>,
    entities: Vec<EntityId>,
    data: Vec<T>,
}

impl<T: Component> ComponentPool<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::with_capacity(capacity),
            data: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of stored components.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no entity carries this component.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The entities carrying this component, in storage order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Returns `true` if `id` (with this exact generation) carries the component.
    pub fn contains(&self, id: EntityId) -> bool {
        self.dense_index(id).is_some()
    }

    /// Returns a shared reference to the component of `id`.
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.dense_index(id).map(|dense| &self.data[dense])
    }

    /// Returns a mutable reference to the component of `id`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.dense_index(id).map(move |dense| &mut self.data[dense])
    }

    /// Iterates `(entity, component)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.entities.iter().copied().zip(self.data.iter())
    }

    /// Stores `value` for `id`, replacing any previous component.
    ///
    /// Liveness is the caller's concern; [`World`](crate::ecs::World) checks it.
    pub(crate) fn insert(&mut self, id: EntityId, value: T) -> &mut T {
        if let Some(dense) = self.dense_index(id) {
            self.data[dense] = value;
            return &mut self.data[dense];
        }
        let slot = id.index as usize;
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, EMPTY);
        }
        self.sparse[slot] = self.data.len() as u32;
        self.entities.push(id);
        self.data.push(value);
        let last = self.data.len() - 1;
        &mut self.data[last]
    }

    pub(crate) fn get_or_insert_with(&mut self, id: EntityId, make: impl FnOnce() -> T) -> &mut T {
        match self.dense_index(id) {
            Some(dense) => &mut self.data[dense],
            None => self.insert(id, make()),
        }
    }

    /// Removes and returns the component of `id`.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<T> {
        let dense = self.dense_index(id)?;
        self.sparse[id.index as usize] = EMPTY;
        let last = self.entities.len() - 1;
        if dense != last {
            let moved = self.entities[last];
            self.sparse[moved.index as usize] = dense as u32;
        }
        self.entities.swap_remove(dense);
        Some(self.data.swap_remove(dense))
    }

    fn dense_index(&self, id: EntityId) -> Option<usize> {
        let dense = *self.sparse.get(id.index as usize)?;
        if dense == EMPTY {
            return None;
        }
        let dense = dense as usize;
        (self.entities[dense] == id).then_some(dense)
    }
}

/// Object-safe view of a pool, used by the world to clean up despawned entities.
pub(crate) trait ErasedPool: Any {
    /// Drops the component of `id`, if any.
    fn remove_entity(&mut self, id: EntityId) -> bool;
    /// Number of stored components.
    fn len(&self) -> usize;
    /// Name of the component type, for diagnostics.
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for ComponentPool<T> {
    fn remove_entity(&mut self, id: EntityId) -> bool {
        self.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    fn id(index: u32, generation: u32) -> EntityId {
        EntityId { index, generation }
    }

    #[test]
    fn swap_remove_keeps_sparse_index_consistent() {
        let mut pool = ComponentPool::<Health>::with_capacity(4);
        pool.insert(id(0, 0), Health(10));
        pool.insert(id(1, 0), Health(20));
        pool.insert(id(2, 0), Health(30));

        assert_eq!(pool.remove(id(0, 0)), Some(Health(10)));

        // The last element moved into the hole.
        assert_eq!(pool.entities(), &[id(2, 0), id(1, 0)]);
        assert_eq!(pool.get(id(2, 0)), Some(&Health(30)));
        assert_eq!(pool.get(id(1, 0)), Some(&Health(20)));
        assert!(!pool.contains(id(0, 0)));
    }

    #[test]
    fn stale_generation_is_not_found() {
        let mut pool = ComponentPool::<Health>::with_capacity(1);
        pool.insert(id(5, 1), Health(1));
        assert!(pool.get(id(5, 0)).is_none());
        assert!(pool.remove(id(5, 0)).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut pool = ComponentPool::<Health>::with_capacity(1);
        pool.insert(id(0, 0), Health(1));
        *pool.insert(id(0, 0), Health(2)) = Health(3);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(id(0, 0)), Some(&Health(3)));
    }
}
