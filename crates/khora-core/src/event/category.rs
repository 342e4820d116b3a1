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

use crate::ecs::Component;
use std::fmt;

mod sealed {
    pub trait Sealed {}
}

/// The runtime tag of an event category, used for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    /// See [`Global`].
    Global,
    /// See [`Unique`].
    Unique,
    /// See [`Entity`].
    Entity,
    /// See [`Flag`].
    Flag,
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CategoryKind::Global => "global",
            CategoryKind::Unique => "unique",
            CategoryKind::Entity => "entity",
            CategoryKind::Flag => "flag",
        };
        f.write_str(name)
    }
}

/// A type-level event category. Implemented only by the four category markers.
pub trait EventCategory: sealed::Sealed + 'static {
    /// The runtime tag of this category.
    const KIND: CategoryKind;
}

/// Broadcast events with no identity beyond their type.
#[derive(Debug)]
pub enum Global {}
/// Events with at most one live instance per type.
#[derive(Debug)]
pub enum Unique {}
/// Events raised about an entity living in another world.
#[derive(Debug)]
pub enum Entity {}
/// Presence markers attached directly to an entity.
#[derive(Debug)]
pub enum Flag {}

impl sealed::Sealed for Global {}
impl sealed::Sealed for Unique {}
impl sealed::Sealed for Entity {}
impl sealed::Sealed for Flag {}

impl EventCategory for Global {
    const KIND: CategoryKind = CategoryKind::Global;
}
impl EventCategory for Unique {
    const KIND: CategoryKind = CategoryKind::Unique;
}
impl EventCategory for Entity {
    const KIND: CategoryKind = CategoryKind::Entity;
}
impl EventCategory for Flag {
    const KIND: CategoryKind = CategoryKind::Flag;
}

/// An event payload.
///
/// The associated `Category` binds every event type to exactly one category at
/// compile time. `PERSISTENT` events survive their drain pass and must be
/// deleted explicitly through the owning registry.
///
/// # Example
///
/// ```rust
/// use khora_core::ecs::Component;
/// use khora_core::event::{Event, Global};
///
/// struct ScoreChanged { delta: i32 }
/// impl Component for ScoreChanged {}
/// impl Event for ScoreChanged {
///     type Category = Global;
/// }
///
/// assert!(!<ScoreChanged as Event>::PERSISTENT);
/// ```
pub trait Event: Component {
    /// The category this event type belongs to.
    type Category: EventCategory;

    /// When `true`, drains deliver the instance but never delete it.
    const PERSISTENT: bool = false;
}

/// An event of the [`Global`] category.
pub trait GlobalEvent: Event<Category = Global> {}
impl<T: Event<Category = Global>> GlobalEvent for T {}

/// An event of the [`Unique`] category. Created from `Default` on first raise.
pub trait UniqueEvent: Event<Category = Unique> + Default {}
impl<T: Event<Category = Unique> + Default> UniqueEvent for T {}

/// An event of the [`Entity`] category.
pub trait EntityEvent: Event<Category = Entity> {}
impl<T: Event<Category = Entity>> EntityEvent for T {}

/// A marker of the [`Flag`] category. Attached from `Default`.
pub trait FlagEvent: Event<Category = Flag> + Default {}
impl<T: Event<Category = Flag> + Default> FlagEvent for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Pinged;
    impl Component for Pinged {}
    impl Event for Pinged {
        type Category = Unique;
        const PERSISTENT: bool = true;
    }

    fn kind_of<T: Event>() -> CategoryKind {
        <T::Category as EventCategory>::KIND
    }

    fn assert_unique<T: UniqueEvent>() {}

    #[test]
    fn category_is_resolved_at_compile_time() {
        assert_unique::<Pinged>();
        assert_eq!(kind_of::<Pinged>(), CategoryKind::Unique);
        assert!(<Pinged as Event>::PERSISTENT);
        assert_eq!(CategoryKind::Flag.to_string(), "flag");
    }
}
