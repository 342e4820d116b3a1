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

use crate::ecs::PoolHandle;
use std::fmt;

/// A cached view over every entity that carries a `T`.
///
/// Obtained once from [`World::filter`](crate::ecs::World::filter) and reused;
/// reading it through [`World::matching`](crate::ecs::World::matching) is a
/// plain slice access. The yielded order is storage order, which is **not**
/// the order in which components were added once any of them was removed.
pub struct Filter<T> {
    pool: PoolHandle<T>,
}

impl<T> Filter<T> {
    pub(crate) fn new(pool: PoolHandle<T>) -> Self {
        Self { pool }
    }

    /// The pool this filter reads.
    pub fn pool(&self) -> PoolHandle<T> {
        self.pool
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self { pool: self.pool }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("pool", &self.pool).finish()
    }
}
