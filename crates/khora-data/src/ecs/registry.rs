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

use std::{any::TypeId, collections::HashMap};

/// Maps component types to the index of their pool inside a world.
///
/// Looking a pool up by `TypeId` costs a hash; callers on hot paths resolve a
/// [`PoolHandle`](crate::ecs::PoolHandle) once and keep it.
#[derive(Debug, Default)]
pub(crate) struct PoolRegistry {
    mapping: HashMap<TypeId, u32>,
}

impl PoolRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            mapping: HashMap::with_capacity(capacity),
        }
    }

    /// Records that pools of `type_id` live at `index`.
    pub(crate) fn register(&mut self, type_id: TypeId, index: u32) {
        self.mapping.insert(type_id, index);
    }

    /// Looks up the pool index for a component type.
    pub(crate) fn index_of(&self, type_id: TypeId) -> Option<u32> {
        self.mapping.get(&type_id).copied()
    }
}
