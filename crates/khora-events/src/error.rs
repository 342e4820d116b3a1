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

//! Error types for the event bus.

use khora_core::ecs::{EntityId, WorldId};
use thiserror::Error;

/// Errors reported by [`EventBus`](crate::EventBus) operations.
///
/// Programming errors (a type-identity mismatch behind a type-erased table, a
/// `RefCell` borrow held across a drain) are not represented here: they panic.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus was destroyed; it cannot be used again.
    #[error("the event bus has been destroyed")]
    Destroyed,

    /// The target entity is dead or its world has been dropped.
    #[error("entity {entity} of {world} is no longer alive")]
    StaleHandle {
        /// World the handle points into.
        world: WorldId,
        /// Entity the handle points at.
        entity: EntityId,
    },

    /// A flag type is already bound to a different world.
    #[error("flag '{event}' is bound to {bound}, cannot be used on {requested}")]
    WorldMismatch {
        /// Name of the flag type.
        event: &'static str,
        /// World the flag's drain procedure was bound to by its first subscription.
        bound: WorldId,
        /// World of the rejected subscription target.
        requested: WorldId,
    },

    /// A configuration document could not be parsed.
    #[error("invalid event bus configuration: {0}")]
    Config(#[from] ron::error::SpannedError),
}

/// A specialized `Result` for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;
