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

use crate::ecs::{SharedWorld, World};
use khora_core::ecs::{EntityId, WorldId};
use std::{
    cell::RefCell,
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

/// A stable reference to an entity of a specific world.
///
/// The handle remembers the world (weakly), the slot and the generation of the
/// entity, so it can be resolved back to a live `(world, entity)` pair from
/// anywhere, or report that the entity is gone. Equality and hashing use
/// `(world id, slot, generation)`: a recycled slot never compares equal to the
/// entity that previously occupied it.
#[derive(Clone)]
pub struct EntityHandle {
    world: Weak<RefCell<World>>,
    world_id: WorldId,
    entity: EntityId,
}

impl EntityHandle {
    /// Packs `entity` of `world` into a handle.
    ///
    /// # Panics
    ///
    /// Panics if `world` is currently mutably borrowed.
    pub fn new(world: &SharedWorld, entity: EntityId) -> Self {
        let world_id = world.borrow().id();
        Self::from_parts(Rc::downgrade(world), world_id, entity)
    }

    /// Packs a handle from parts the caller already holds, without borrowing the world.
    pub fn from_parts(world: Weak<RefCell<World>>, world_id: WorldId, entity: EntityId) -> Self {
        Self {
            world,
            world_id,
            entity,
        }
    }

    /// Spawns a fresh entity in `world` and returns its handle.
    pub fn spawn(world: &SharedWorld) -> Self {
        let (world_id, entity) = {
            let mut guard = world.borrow_mut();
            (guard.id(), guard.spawn())
        };
        Self::from_parts(Rc::downgrade(world), world_id, entity)
    }

    /// The id of the world this handle points into.
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// The entity id inside its world.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The world, if it is still alive. Does not check the entity.
    pub fn world(&self) -> Option<SharedWorld> {
        self.world.upgrade()
    }

    /// Resolves the handle to its world and entity if the entity is still alive.
    ///
    /// # Panics
    ///
    /// Panics if the world is currently mutably borrowed.
    pub fn resolve(&self) -> Option<(SharedWorld, EntityId)> {
        let world = self.world.upgrade()?;
        let alive = world.borrow().is_alive(self.entity);
        alive.then_some((world, self.entity))
    }

    /// Returns `true` if the world still exists and the entity is alive in it.
    pub fn is_alive(&self) -> bool {
        self.resolve().is_some()
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.world_id == other.world_id && self.entity == other.entity
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.world_id.hash(state);
        self.entity.hash(state);
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({}:{})", self.world_id, self.entity)
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world_id, self.entity)
    }
}
