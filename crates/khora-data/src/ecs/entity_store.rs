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

use khora_core::ecs::EntityId;

/// Allocates entity ids and tracks which slots are alive.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntityStore {
    /// A dense list of every entity slot that has ever been created.
    /// Each entry holds the slot's current `EntityId` (including generation) and
    /// whether the entity occupying it is alive.
    pub(crate) entities: Vec<(EntityId, bool)>,
    /// A list of entity indices available for reuse, enabling $O(1)$ allocation
    /// for previously despawned entities.
    pub(crate) freed_entities: Vec<u32>,
    /// Number of slots currently alive.
    alive: usize,
}

impl EntityStore {
    /// Creates an empty store with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            freed_entities: Vec::new(),
            alive: 0,
        }
    }

    /// Allocates a new or recycled `EntityId`.
    ///
    /// If there are indices in the `freed_entities` list, one is popped and its
    /// generation is incremented. Otherwise, a new slot is appended.
    pub fn create_entity(&mut self) -> EntityId {
        self.alive += 1;
        if let Some(index) = self.freed_entities.pop() {
            let (id_slot, alive) = &mut self.entities[index as usize];
            id_slot.generation = id_slot.generation.wrapping_add(1);
            *alive = true;
            *id_slot
        } else {
            let index = self.entities.len() as u32;
            let new_id = EntityId {
                index,
                generation: 0,
            };
            self.entities.push((new_id, true));
            new_id
        }
    }

    /// Marks the entity as dead and queues its index for reuse.
    ///
    /// Returns `false` if the id was already stale.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        self.entities[id.index as usize].1 = false;
        self.freed_entities.push(id.index);
        self.alive -= 1;
        true
    }

    /// Returns `true` if the slot is occupied by exactly this generation.
    pub fn is_alive(&self, id: EntityId) -> bool {
        matches!(
            self.entities.get(id.index as usize),
            Some((slot_id, true)) if slot_id.generation == id.generation
        )
    }

    /// Returns the number of live entities.
    pub fn alive_count(&self) -> usize {
        self.alive
    }
}
