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

//! A compact, single-threaded Entity-Component-System store.
//!
//! This is the storage layer the event dispatch engine sits on: generational
//! entities, one sparse-set [`ComponentPool`] per component type, cached
//! [`Filter`]s, and [`EntityHandle`]s that identify an entity across worlds.
//!
//! The primary entry point is the [`World`] struct. Worlds that other worlds
//! need to point into are shared as a [`SharedWorld`].

mod entity_store;
mod filter;
mod handle;
mod registry;
mod storage;
mod world;

pub use filter::Filter;
pub use handle::EntityHandle;
pub use khora_core::ecs::{Component, EntityId, WorldId};
pub use storage::ComponentPool;
pub use world::*;

#[cfg(test)]
mod tests;
