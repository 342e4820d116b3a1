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

//! Contracts for the per-tick event dispatch layer.
//!
//! Events are ordinary components tagged with a category. The category decides
//! where an instance is stored and how many instances may be live at once:
//!
//! * [`Global`]: any number of instances in the shared events world.
//! * [`Unique`]: at most one instance; re-raising coalesces into it.
//! * [`Entity`]: any number of instances, each about one entity of another world.
//! * [`Flag`]: a marker attached directly to the target entity in its own world.
//!
//! Concrete storage and delivery live in `khora-events`; this module only
//! defines the traits the rest of the engine programs against.

mod category;
mod drain;

pub use self::category::{
    CategoryKind, Entity, EntityEvent, Event, EventCategory, Flag, FlagEvent, Global,
    GlobalEvent, Unique, UniqueEvent,
};
pub use self::drain::DrainProcedure;
