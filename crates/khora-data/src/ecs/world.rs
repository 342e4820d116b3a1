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

use crate::ecs::{
    entity_store::EntityStore,
    registry::PoolRegistry,
    storage::{ComponentPool, ErasedPool},
    Filter,
};
use khora_core::ecs::{Component, EntityId, WorldId};
use std::{any::TypeId, cell::RefCell, fmt, marker::PhantomData, rc::Rc};

/// A world shared between its owner and the handles pointing into it.
pub type SharedWorld = Rc<RefCell<World>>;

/// A typed, pre-resolved reference to one component pool of one world.
///
/// Resolving the handle once with [`World::pool`] skips the `TypeId` lookup on
/// every subsequent access.
pub struct PoolHandle<T> {
    index: u32,
    world: WorldId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolHandle<T> {}

impl<T> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("type", &std::any::type_name::<T>())
            .field("index", &self.index)
            .field("world", &self.world)
            .finish()
    }
}

impl<T> PoolHandle<T> {
    /// The world this handle was resolved against.
    pub fn world(&self) -> WorldId {
        self.world
    }
}

/// A container of entities and their components.
///
/// Entities are generational ids; components of each type live in their own
/// sparse-set [`ComponentPool`]. Pools are created lazily the first time a
/// type is touched and are never removed, so a [`PoolHandle`] stays valid for
/// the world's lifetime.
pub struct World {
    id: WorldId,
    entities: EntityStore,
    pools: Vec<Box<dyn ErasedPool>>,
    registry: PoolRegistry,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.entities.alive_count())
            .field(
                "pools",
                &self.pools.iter().map(|p| p.type_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl World {
    /// Creates an empty world with a fresh [`WorldId`].
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Creates an empty world, pre-sizing the entity store and the pool table.
    pub fn with_capacity(entities: usize, component_types: usize) -> Self {
        Self {
            id: WorldId::next(),
            entities: EntityStore::with_capacity(entities),
            pools: Vec::with_capacity(component_types),
            registry: PoolRegistry::with_capacity(component_types),
        }
    }

    /// Wraps the world so [`EntityHandle`](crate::ecs::EntityHandle)s can point into it.
    pub fn into_shared(self) -> SharedWorld {
        Rc::new(RefCell::new(self))
    }

    /// The identity of this world.
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Creates a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        self.entities.create_entity()
    }

    /// Creates a new entity carrying `value` and returns both.
    pub fn spawn_with<T: Component>(&mut self, value: T) -> (EntityId, &mut T) {
        let id = self.entities.create_entity();
        let pool = self.pool::<T>();
        (id, self.storage_mut(pool).insert(id, value))
    }

    /// Destroys an entity and every component attached to it.
    ///
    /// Returns `false` if the entity was already dead.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.destroy_entity(id) {
            return false;
        }
        for pool in &mut self.pools {
            pool.remove_entity(id);
        }
        true
    }

    /// Returns `true` if `id` refers to a live entity of this world.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.alive_count()
    }

    /// Returns `true` if the world holds no live entity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the pool handle for `T`, creating the pool on first use.
    pub fn pool<T: Component>(&mut self) -> PoolHandle<T> {
        let type_id = TypeId::of::<T>();
        let index = match self.registry.index_of(type_id) {
            Some(index) => index,
            None => {
                let index = self.pools.len() as u32;
                self.pools.push(Box::new(ComponentPool::<T>::with_capacity(0)));
                self.registry.register(type_id, index);
                log::trace!(
                    "{}: created pool for '{}'",
                    self.id,
                    std::any::type_name::<T>()
                );
                index
            }
        };
        self.handle(index)
    }

    /// Returns the pool handle for `T` if the pool exists.
    pub fn find_pool<T: Component>(&self) -> Option<PoolHandle<T>> {
        self.registry
            .index_of(TypeId::of::<T>())
            .map(|index| self.handle(index))
    }

    /// Returns a cached filter over entities carrying `T`.
    pub fn filter<T: Component>(&mut self) -> Filter<T> {
        Filter::new(self.pool::<T>())
    }

    /// Entities matched by `filter`, in storage order.
    pub fn matching<T: Component>(&self, filter: &Filter<T>) -> &[EntityId] {
        self.storage(filter.pool()).entities()
    }

    /// Entities carrying `T`, in storage order. Empty if no pool exists yet.
    pub fn entities_with<T: Component>(&self) -> &[EntityId] {
        match self.find_pool::<T>() {
            Some(pool) => self.storage(pool).entities(),
            None => &[],
        }
    }

    /// Number of entities carrying `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.entities_with::<T>().len()
    }

    /// Read access to a pool.
    ///
    /// # Panics
    ///
    /// Panics if the handle was resolved against another world.
    pub fn storage<T: Component>(&self, pool: PoolHandle<T>) -> &ComponentPool<T> {
        self.check_handle(&pool);
        self.pools[pool.index as usize]
            .as_any()
            .downcast_ref::<ComponentPool<T>>()
            .unwrap_or_else(|| mismatch::<T>())
    }

    /// Write access to a pool.
    ///
    /// # Panics
    ///
    /// Panics if the handle was resolved against another world.
    pub fn storage_mut<T: Component>(&mut self, pool: PoolHandle<T>) -> &mut ComponentPool<T> {
        self.check_handle(&pool);
        self.pools[pool.index as usize]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .unwrap_or_else(|| mismatch::<T>())
    }

    /// Attaches `value` to a live entity, replacing any previous `T`.
    ///
    /// Returns `None` if the entity is dead.
    pub fn insert<T: Component>(&mut self, id: EntityId, value: T) -> Option<&mut T> {
        let pool = self.pool::<T>();
        self.insert_in(pool, id, value)
    }

    /// [`World::insert`] through an already-resolved pool handle.
    pub fn insert_in<T: Component>(
        &mut self,
        pool: PoolHandle<T>,
        id: EntityId,
        value: T,
    ) -> Option<&mut T> {
        if !self.is_alive(id) {
            return None;
        }
        Some(self.storage_mut(pool).insert(id, value))
    }

    /// Returns the `T` of a live entity, creating it with `make` if absent.
    pub fn get_or_insert_with<T: Component>(
        &mut self,
        id: EntityId,
        make: impl FnOnce() -> T,
    ) -> Option<&mut T> {
        if !self.is_alive(id) {
            return None;
        }
        let pool = self.pool::<T>();
        Some(self.storage_mut(pool).get_or_insert_with(id, make))
    }

    /// Returns the `T` of `id`, if present.
    pub fn get<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.find_pool::<T>()
            .and_then(|pool| self.storage(pool).get(id))
    }

    /// Returns the `T` of `id` mutably, if present.
    pub fn get_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let pool = self.find_pool::<T>()?;
        self.storage_mut(pool).get_mut(id)
    }

    /// Returns `true` if `id` carries a `T`.
    pub fn has<T: Component>(&self, id: EntityId) -> bool {
        self.find_pool::<T>()
            .is_some_and(|pool| self.storage(pool).contains(id))
    }

    /// [`World::has`] through an already-resolved pool handle.
    pub fn has_in<T: Component>(&self, pool: PoolHandle<T>, id: EntityId) -> bool {
        self.storage(pool).contains(id)
    }

    /// Detaches and returns the `T` of `id`. The entity itself stays alive.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> Option<T> {
        let pool = self.find_pool::<T>()?;
        self.storage_mut(pool).remove(id)
    }

    fn handle<T>(&self, index: u32) -> PoolHandle<T> {
        PoolHandle {
            index,
            world: self.id,
            _marker: PhantomData,
        }
    }

    fn check_handle<T>(&self, pool: &PoolHandle<T>) {
        assert_eq!(
            pool.world, self.id,
            "pool handle for '{}' used on the wrong world",
            std::any::type_name::<T>()
        );
    }
}

fn mismatch<T>() -> ! {
    panic!(
        "component pool type mismatch for '{}'",
        std::any::type_name::<T>()
    )
}
