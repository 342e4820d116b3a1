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

//! Events with at most one live instance per type.

use crate::error::EventBusResult;
use crate::listeners::{EventCallback, Listener, ListenerId, ListenerList, ListenerOwner};
use crate::registry::{CategoryDrain, ChannelTable, RunGuard};
use crate::store::{EventStore, InFlight};
use crate::token::{Subscription, TokenPool, TokenRecord};
use ahash::AHashMap;
use khora_core::event::{CategoryKind, DrainProcedure, UniqueEvent};
use khora_data::ecs::EntityId;
use std::any::TypeId;
use std::cell::{Cell, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// Which events-world entity holds the live instance of each unique type.
struct UniqueSlots {
    by_type: RefCell<AHashMap<TypeId, EntityId>>,
}

impl UniqueSlots {
    fn get<T: 'static>(&self) -> Option<EntityId> {
        self.by_type.borrow().get(&TypeId::of::<T>()).copied()
    }

    fn set<T: 'static>(&self, id: EntityId) {
        self.by_type.borrow_mut().insert(TypeId::of::<T>(), id);
    }

    /// Clears the slot of `T` if it still points at `id`.
    fn clear_if<T: 'static>(&self, id: EntityId) {
        let mut by_type = self.by_type.borrow_mut();
        if by_type.get(&TypeId::of::<T>()) == Some(&id) {
            by_type.remove(&TypeId::of::<T>());
        }
    }

    fn take<T: 'static>(&self) -> Option<EntityId> {
        self.by_type.borrow_mut().remove(&TypeId::of::<T>())
    }

    fn clear(&self) {
        self.by_type.borrow_mut().clear();
    }
}

/// Registry of [`UniqueEvent`]s.
///
/// Raising a type that already has a live instance returns that instance, so
/// repeated raises within one tick coalesce into a single delivery.
pub struct UniqueEvents {
    store: Rc<EventStore>,
    tokens: Rc<TokenPool>,
    table: Rc<ChannelTable>,
    slots: Rc<UniqueSlots>,
}

impl UniqueEvents {
    pub(crate) fn new(
        store: Rc<EventStore>,
        tokens: Rc<TokenPool>,
        capacity: usize,
        slot_capacity: usize,
    ) -> Self {
        Self {
            store,
            tokens,
            table: Rc::new(ChannelTable::new(CategoryKind::Unique, capacity)),
            slots: Rc::new(UniqueSlots {
                by_type: RefCell::new(AHashMap::with_capacity(slot_capacity)),
            }),
        }
    }

    /// Returns the live instance of `T`, raising a default one if there is none.
    pub fn add<T: UniqueEvent>(&self) -> EventBusResult<RefMut<'_, T>> {
        let slot = self.slots.get::<T>();
        let mut world = self.store.borrow_world()?;
        if let Some(id) = slot {
            match RefMut::filter_map(world, |world| world.get_or_insert_with(id, T::default)) {
                Ok(existing) => return Ok(existing),
                Err(unchanged) => world = unchanged,
            }
        }

        let mut spawned = None;
        let instance = RefMut::map(world, |world| {
            let (id, instance) = world.spawn_with(T::default());
            spawned = Some(id);
            instance
        });
        if let Some(id) = spawned {
            self.slots.set::<T>(id);
        }
        Ok(instance)
    }

    /// Returns `true` if `T` has a live instance, including one being delivered.
    pub fn has<T: UniqueEvent>(&self) -> bool {
        if self.lifted::<T>().is_some_and(|channel| channel.in_flight.is_live()) {
            return true;
        }
        let Some(id) = self.slots.get::<T>() else {
            return false;
        };
        self.store.read(|world| world.has::<T>(id)).unwrap_or(false)
    }

    /// Deletes the live instance of `T` without delivering it.
    ///
    /// Called from a callback of `T`, this deletes the instance being delivered.
    pub fn del<T: UniqueEvent>(&self) -> bool {
        let lifted = self
            .lifted::<T>()
            .is_some_and(|channel| channel.in_flight.delete());
        let stored = match self.slots.take::<T>() {
            Some(id) => self.store.with(|world| world.despawn(id)).unwrap_or(false),
            None => false,
        };
        lifted || stored
    }

    fn lifted<T: UniqueEvent>(&self) -> Option<Rc<UniqueDrain<T>>> {
        self.table.get::<UniqueDrain<T>>()
    }

    /// Registers `callback` for `T` until the returned token is dropped.
    pub fn subscribe<T: UniqueEvent>(
        &self,
        callback: impl FnMut(&mut T) + 'static,
    ) -> EventBusResult<Subscription> {
        let channel = self.channel::<T>()?;
        let listener = self.table.next_listener_id();
        channel.listeners.push(listener, Box::new(callback));
        let owner = Rc::downgrade(&channel.listeners);
        let owner: Weak<dyn ListenerOwner> = owner;
        Ok(self.tokens.issue(TokenRecord {
            owner,
            target: None,
            listener,
        }))
    }

    /// Registers `callback` for `T` without a token.
    pub fn listen<T: UniqueEvent>(
        &self,
        callback: impl FnMut(&mut T) + 'static,
    ) -> EventBusResult<ListenerId> {
        let channel = self.channel::<T>()?;
        let listener = self.table.next_listener_id();
        channel.listeners.push(listener, Box::new(callback));
        Ok(listener)
    }

    /// Removes a registration made with [`UniqueEvents::listen`].
    pub fn remove_listener<T: UniqueEvent>(&self, id: ListenerId) -> bool {
        self.table
            .get::<UniqueDrain<T>>()
            .is_some_and(|channel| channel.listeners.remove(id))
    }

    /// Number of callbacks registered for `T`.
    pub fn listener_count<T: UniqueEvent>(&self) -> usize {
        self.table
            .get::<UniqueDrain<T>>()
            .map_or(0, |channel| channel.listeners.len())
    }

    /// The drain procedure of `T`, created if needed.
    pub fn drain_procedure<T: UniqueEvent>(&self) -> EventBusResult<Rc<dyn DrainProcedure>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).1)
    }

    /// Delivers and consumes the instance of `T` right now.
    pub fn drain<T: UniqueEvent>(&self) -> EventBusResult<()> {
        self.drain_procedure::<T>()?.run();
        Ok(())
    }

    /// Runs the drain of every unique event type seen so far.
    pub fn drain_all(&self) {
        self.table.run_all();
    }

    /// A procedure draining the whole category.
    pub fn category_drain(&self) -> CategoryDrain {
        CategoryDrain::new(self.table.clone())
    }

    /// Drops every unique channel. Outstanding tokens become inert.
    pub fn release_all(&self) -> usize {
        self.table.clear()
    }

    /// Forgets every slot. Used when the events world goes away.
    pub(crate) fn forget_instances(&self) {
        self.slots.clear();
    }

    fn channel<T: UniqueEvent>(&self) -> EventBusResult<Rc<UniqueDrain<T>>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).0)
    }

    fn create<T: UniqueEvent>(&self) -> (Rc<UniqueDrain<T>>, Rc<dyn DrainProcedure>) {
        let channel = Rc::new(UniqueDrain::<T> {
            store: self.store.clone(),
            slots: self.slots.clone(),
            listeners: Rc::new(ListenerList::new()),
            running: Cell::new(false),
            scratch: RefCell::new(Vec::new()),
            in_flight: InFlight::new(),
        });
        let drain: Rc<dyn DrainProcedure> = channel.clone();
        (channel, drain)
    }
}

pub(crate) struct UniqueDrain<T: UniqueEvent> {
    store: Rc<EventStore>,
    slots: Rc<UniqueSlots>,
    listeners: Rc<ListenerList<EventCallback<T>>>,
    running: Cell<bool>,
    scratch: RefCell<Vec<Rc<Listener<EventCallback<T>>>>>,
    in_flight: InFlight<EntityId>,
}

impl<T: UniqueEvent> DrainProcedure for UniqueDrain<T> {
    fn run(&self) {
        let Some(_guard) = RunGuard::enter(&self.running, self.label()) else {
            return;
        };
        let Some(id) = self.slots.get::<T>() else {
            return;
        };
        let Ok(Some(mut event)) = self.store.with(|world| world.remove::<T>(id)) else {
            self.slots.clear_if::<T>(id);
            let _ = self.store.with(|world| world.despawn(id));
            return;
        };
        if !T::PERSISTENT {
            // A raise from inside a callback starts a fresh instance.
            self.slots.clear_if::<T>(id);
        }

        let mut listeners = self.scratch.take();
        self.listeners.snapshot_into(&mut listeners);
        log::trace!("{}: delivering to {} listener(s)", self.label(), listeners.len());
        self.in_flight.begin(id);
        for listener in &listeners {
            listener.call(|callback| callback(&mut event));
        }
        let deleted = self.in_flight.finish();
        listeners.clear();
        *self.scratch.borrow_mut() = listeners;

        if deleted {
            self.slots.clear_if::<T>(id);
        }
        let _ = self.store.with(|world| {
            if !T::PERSISTENT || deleted {
                world.despawn(id);
            } else if !world.has::<T>(id) {
                world.insert(id, event);
            }
        });
    }

    fn label(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
