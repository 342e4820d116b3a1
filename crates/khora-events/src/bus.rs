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

//! The event bus facade.

use crate::config::EventBusConfig;
use crate::coordinator::DrainCoordinator;
use crate::entity_events::EntityEvents;
use crate::error::{EventBusError, EventBusResult};
use crate::flags::FlagEvents;
use crate::globals::GlobalEvents;
use crate::store::EventStore;
use crate::token::TokenPool;
use crate::uniques::UniqueEvents;
use khora_core::event::DrainProcedure;
use khora_data::ecs::World;
use std::fmt;
use std::rc::{Rc, Weak};

struct BusShared {
    store: Rc<EventStore>,
    tokens: Rc<TokenPool>,
    globals: GlobalEvents,
    uniques: UniqueEvents,
    entities: EntityEvents,
    flags: FlagEvents,
    coordinator: DrainCoordinator,
}

/// Owns the events world and the four category registries.
///
/// Cloning yields another handle to the same bus. The bus is single-threaded:
/// it is neither `Send` nor `Sync`.
///
/// # Example
///
/// ```rust
/// use khora_events::{Component, Event, EventBus, Global};
/// use std::{cell::Cell, rc::Rc};
///
/// struct Scored(u32);
/// impl Component for Scored {}
/// impl Event for Scored {
///     type Category = Global;
/// }
///
/// let bus = EventBus::new();
/// let total = Rc::new(Cell::new(0));
/// let sink = total.clone();
/// let _subscription = bus
///     .globals()
///     .subscribe(move |event: &mut Scored| sink.set(sink.get() + event.0))?;
///
/// bus.globals().add(Scored(3))?;
/// bus.globals().add(Scored(4))?;
/// bus.drain_all()?;
///
/// assert_eq!(total.get(), 7);
/// assert!(!bus.globals().has::<Scored>());
/// # Ok::<(), khora_events::EventBusError>(())
/// ```
#[derive(Clone)]
pub struct EventBus {
    shared: Rc<BusShared>,
}

impl EventBus {
    /// Creates a bus with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&EventBusConfig::default())
    }

    /// Creates a bus pre-sized from `config`.
    pub fn with_config(config: &EventBusConfig) -> Self {
        let world = World::with_capacity(config.event_capacity, config.event_capacity);
        log::info!("event bus created over events world {}", world.id());

        let store = Rc::new(EventStore::new(world));
        let tokens = TokenPool::new();
        let capacity = config.event_capacity;
        let globals = GlobalEvents::new(store.clone(), tokens.clone(), capacity);
        let uniques = UniqueEvents::new(
            store.clone(),
            tokens.clone(),
            capacity,
            config.unique_capacity,
        );
        let entities = EntityEvents::new(store.clone(), tokens.clone(), capacity);
        let flags = FlagEvents::new(store.clone(), tokens.clone(), capacity);
        let coordinator = DrainCoordinator::new(
            flags.category_drain(),
            entities.category_drain(),
            globals.category_drain(),
            uniques.category_drain(),
        );

        Self {
            shared: Rc::new(BusShared {
                store,
                tokens,
                globals,
                uniques,
                entities,
                flags,
                coordinator,
            }),
        }
    }

    /// Broadcast events.
    pub fn globals(&self) -> &GlobalEvents {
        &self.shared.globals
    }

    /// Single-instance events.
    pub fn uniques(&self) -> &UniqueEvents {
        &self.shared.uniques
    }

    /// Events about entities of other worlds.
    pub fn entity_events(&self) -> &EntityEvents {
        &self.shared.entities
    }

    /// Presence markers on entities of other worlds.
    pub fn flags(&self) -> &FlagEvents {
        &self.shared.flags
    }

    /// The per-tick drain of the whole bus.
    pub fn coordinator(&self) -> &DrainCoordinator {
        &self.shared.coordinator
    }

    /// Drains every category once. Call this once per tick.
    pub fn drain_all(&self) -> EventBusResult<()> {
        self.shared.store.ensure_alive()?;
        self.shared.coordinator.run();
        Ok(())
    }

    /// Read access to the events world, for diagnostics.
    pub fn with_events_world<R>(&self, f: impl FnOnce(&World) -> R) -> EventBusResult<R> {
        self.shared.store.read(f).ok_or(EventBusError::Destroyed)
    }

    /// Number of subscription tokens still holding a registration.
    pub fn outstanding_subscriptions(&self) -> usize {
        self.shared.tokens.live()
    }

    /// Tears the bus down.
    ///
    /// Clears every registry, invalidates every token and drops the events
    /// world. Returns `false` if the bus was already destroyed.
    pub fn destroy(&self) -> bool {
        let shared = &self.shared;
        if shared.store.is_destroyed() {
            return false;
        }
        let world = shared.store.destroy();
        let channels = shared.flags.release_all()
            + shared.entities.release_all()
            + shared.globals.release_all()
            + shared.uniques.release_all();
        shared.uniques.forget_instances();
        let tokens = shared.tokens.revoke_all();
        drop(world);
        log::info!("event bus destroyed ({channels} channel(s), {tokens} token(s) released)");
        true
    }

    /// Returns `true` once [`EventBus::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.store.is_destroyed()
    }

    /// A handle that does not keep the bus alive, for use inside callbacks.
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("destroyed", &self.is_destroyed())
            .field("subscriptions", &self.outstanding_subscriptions())
            .finish_non_exhaustive()
    }
}

/// A non-owning [`EventBus`] handle.
///
/// Callbacks are owned by the bus, so a callback capturing an `EventBus`
/// clone would keep it alive forever; capture one of these instead.
#[derive(Clone)]
pub struct WeakEventBus {
    shared: Weak<BusShared>,
}

impl WeakEventBus {
    /// Returns the bus if it still exists.
    pub fn upgrade(&self) -> Option<EventBus> {
        self.shared.upgrade().map(|shared| EventBus { shared })
    }
}

impl fmt::Debug for WeakEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEventBus")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
