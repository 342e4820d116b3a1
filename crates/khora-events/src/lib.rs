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

//! # Khora Events
//!
//! Per-tick event dispatch on top of the Khora ECS store.
//!
//! Events come in four categories, each with its own registry on the
//! [`EventBus`]:
//!
//! - [`GlobalEvents`]: any number of instances, broadcast to every subscriber.
//! - [`UniqueEvents`]: at most one instance per type; raises coalesce.
//! - [`EntityEvents`]: instances stamped with the entity they are about,
//!   delivered to the subscribers of that entity only.
//! - [`FlagEvents`]: presence markers living on the target entity itself.
//!
//! Raised instances wait in the bus's events world until the host calls
//! [`EventBus::drain_all`], which hands them to subscribers and deletes the
//! non-persistent ones.

#![warn(missing_docs)]

mod bus;
mod config;
mod coordinator;
mod entity_events;
mod error;
mod flags;
mod globals;
mod listeners;
mod registry;
mod store;
mod token;
mod uniques;

pub use bus::{EventBus, WeakEventBus};
pub use config::EventBusConfig;
pub use coordinator::DrainCoordinator;
pub use entity_events::EntityEvents;
pub use error::{EventBusError, EventBusResult};
pub use flags::FlagEvents;
pub use globals::GlobalEvents;
pub use listeners::ListenerId;
pub use registry::CategoryDrain;
pub use token::Subscription;
pub use uniques::UniqueEvents;

pub use khora_core::ecs::Component;
pub use khora_core::event::{
    CategoryKind, DrainProcedure, Entity, EntityEvent, Event, EventCategory, Flag, FlagEvent,
    Global, GlobalEvent, Unique, UniqueEvent,
};
pub use khora_data::ecs::{EntityHandle, SharedWorld, World};
