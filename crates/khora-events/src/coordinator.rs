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

//! Fixed-order drain of the four event categories.

use crate::registry::CategoryDrain;
use khora_core::event::{CategoryKind, DrainProcedure};

/// Drains all four categories in a fixed order: flags, entity events,
/// global events, unique events.
///
/// The host runs this once per tick, usually through
/// [`EventBus::drain_all`](crate::EventBus::drain_all).
#[derive(Clone)]
pub struct DrainCoordinator {
    stages: [CategoryDrain; 4],
}

impl DrainCoordinator {
    pub(crate) fn new(
        flags: CategoryDrain,
        entities: CategoryDrain,
        globals: CategoryDrain,
        uniques: CategoryDrain,
    ) -> Self {
        Self {
            stages: [flags, entities, globals, uniques],
        }
    }

    /// The categories in the order they are drained.
    pub fn order(&self) -> [CategoryKind; 4] {
        let [a, b, c, d] = &self.stages;
        [a.kind(), b.kind(), c.kind(), d.kind()]
    }
}

impl DrainProcedure for DrainCoordinator {
    fn run(&self) {
        for stage in &self.stages {
            stage.run();
        }
    }

    fn label(&self) -> &'static str {
        "event bus"
    }
}
