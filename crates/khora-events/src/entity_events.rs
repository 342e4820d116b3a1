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

//! Events raised about an entity that lives in another world.

use crate::error::EventBusResult;
use crate::listeners::{EntityCallback, KeyedListeners, Listener, ListenerId, ListenerOwner};
use crate::registry::{CategoryDrain, ChannelTable, RunGuard};
use crate::store::{EventStore, InFlight};
use crate::token::{Subscription, TokenPool, TokenRecord};
use khora_core::ecs::Component;
use khora_core::event::{CategoryKind, DrainProcedure, EntityEvent};
use khora_data::ecs::{EntityHandle, EntityId};
use std::cell::{Cell, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// An entity event as stored in the events world: the payload stamped with
/// the entity it is about.
pub(crate) struct Sourced<T> {
    source: EntityHandle,
    event: T,
}

impl<T: 'static> Component for Sourced<T> {}

/// Registry of [`EntityEvent`]s.
///
/// Subscriptions are keyed by `(T, target)`; an instance raised for a target
/// is delivered only to the callbacks registered for that exact handle.
pub struct EntityEvents {
    store: Rc<EventStore>,
    tokens: Rc<TokenPool>,
    table: Rc<ChannelTable>,
}

impl EntityEvents {
    pub(crate) fn new(store: Rc<EventStore>, tokens: Rc<TokenPool>, capacity: usize) -> Self {
        Self {
            store,
            tokens,
            table: Rc::new(ChannelTable::new(CategoryKind::Entity, capacity)),
        }
    }

    /// Raises a new instance about `target` and returns it for further population.
    pub fn add<T: EntityEvent>(
        &self,
        target: &EntityHandle,
        event: T,
    ) -> EventBusResult<RefMut<'_, T>> {
        let source = target.clone();
        self.store
            .map_mut(|world| &mut world.spawn_with(Sourced { source, event }).1.event)
    }

    /// Returns `true` if at least one instance of `T` is live.
    pub fn has<T: EntityEvent>(&self) -> bool {
        self.count::<T>() > 0
    }

    /// Number of live instances of `T`, whatever their target.
    pub fn count<T: EntityEvent>(&self) -> usize {
        let lifted = self
            .table
            .get::<EntityDrain<T>>()
            .is_some_and(|channel| channel.in_flight.is_live());
        self.store.count::<Sourced<T>>() + usize::from(lifted)
    }

    /// Deletes every live instance of `T` without delivering it.
    pub fn del<T: EntityEvent>(&self) -> usize {
        let lifted = self
            .table
            .get::<EntityDrain<T>>()
            .is_some_and(|channel| channel.in_flight.delete());
        self.store.despawn_where::<Sourced<T>>(|_| true) + usize::from(lifted)
    }

    /// Deletes the live instances of `T` raised about `target`, including the
    /// one being delivered to `target`'s callbacks.
    pub fn del_for<T: EntityEvent>(&self, target: &EntityHandle) -> usize {
        let lifted = self
            .table
            .get::<EntityDrain<T>>()
            .is_some_and(|channel| channel.in_flight.delete_where(|source| source == target));
        let stored = self
            .store
            .despawn_where::<Sourced<T>>(|stored| &stored.source == target);
        stored + usize::from(lifted)
    }

    /// Registers `callback` for instances of `T` about `target`.
    pub fn subscribe<T: EntityEvent>(
        &self,
        target: &EntityHandle,
        callback: impl FnMut(&EntityHandle, &mut T) + 'static,
    ) -> EventBusResult<Subscription> {
        let channel = self.channel::<T>()?;
        let listener = self.table.next_listener_id();
        channel.listeners.push(target, listener, Box::new(callback));
        let owner = Rc::downgrade(&channel.listeners);
        let owner: Weak<dyn ListenerOwner> = owner;
        Ok(self.tokens.issue(TokenRecord {
            owner,
            target: Some(target.clone()),
            listener,
        }))
    }

    /// Registers `callback` for `(T, target)` without a token.
    pub fn listen<T: EntityEvent>(
        &self,
        target: &EntityHandle,
        callback: impl FnMut(&EntityHandle, &mut T) + 'static,
    ) -> EventBusResult<ListenerId> {
        let channel = self.channel::<T>()?;
        let listener = self.table.next_listener_id();
        channel.listeners.push(target, listener, Box::new(callback));
        Ok(listener)
    }

    /// Removes a registration made with [`EntityEvents::listen`] for the same target.
    pub fn remove_listener<T: EntityEvent>(&self, target: &EntityHandle, id: ListenerId) -> bool {
        self.table
            .get::<EntityDrain<T>>()
            .is_some_and(|channel| channel.listeners.remove(target, id))
    }

    /// Number of callbacks registered for `(T, target)`.
    pub fn listener_count<T: EntityEvent>(&self, target: &EntityHandle) -> usize {
        self.table
            .get::<EntityDrain<T>>()
            .map_or(0, |channel| channel.listeners.len(target))
    }

    /// The drain procedure of `T`, created if needed.
    pub fn drain_procedure<T: EntityEvent>(&self) -> EventBusResult<Rc<dyn DrainProcedure>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).1)
    }

    /// Delivers and consumes the live instances of `T` right now.
    pub fn drain<T: EntityEvent>(&self) -> EventBusResult<()> {
        self.drain_procedure::<T>()?.run();
        Ok(())
    }

    /// Runs the drain of every entity event type seen so far.
    pub fn drain_all(&self) {
        self.table.run_all();
    }

    /// A procedure draining the whole category.
    pub fn category_drain(&self) -> CategoryDrain {
        CategoryDrain::new(self.table.clone())
    }

    /// Drops every entity event channel. Outstanding tokens become inert.
    pub fn release_all(&self) -> usize {
        self.table.clear()
    }

    fn channel<T: EntityEvent>(&self) -> EventBusResult<Rc<EntityDrain<T>>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).0)
    }

    fn create<T: EntityEvent>(&self) -> (Rc<EntityDrain<T>>, Rc<dyn DrainProcedure>) {
        let channel = Rc::new(EntityDrain::<T> {
            store: self.store.clone(),
            listeners: Rc::new(KeyedListeners::new()),
            running: Cell::new(false),
            pending: RefCell::new(Vec::new()),
            scratch: RefCell::new(Vec::new()),
            in_flight: InFlight::new(),
        });
        let drain: Rc<dyn DrainProcedure> = channel.clone();
        (channel, drain)
    }
}

pub(crate) struct EntityDrain<T: EntityEvent> {
    store: Rc<EventStore>,
    listeners: Rc<KeyedListeners<EntityCallback<T>>>,
    running: Cell<bool>,
    pending: RefCell<Vec<EntityId>>,
    scratch: RefCell<Vec<Rc<Listener<EntityCallback<T>>>>>,
    in_flight: InFlight<EntityHandle>,
}

impl<T: EntityEvent> DrainProcedure for EntityDrain<T> {
    fn run(&self) {
        let Some(_guard) = RunGuard::enter(&self.running, self.label()) else {
            return;
        };
        let mut pending = self.pending.take();
        self.store.snapshot_into::<Sourced<T>>(&mut pending);
        let mut listeners = self.scratch.take();
        log::trace!("{}: {} instance(s)", self.label(), pending.len());

        for &id in &pending {
            let lifted = self.store.with(|world| world.remove::<Sourced<T>>(id));
            let Ok(Some(mut stored)) = lifted else {
                continue;
            };
            let mut deleted = false;
            // A dead source still consumes the instance.
            if stored.source.is_alive()
                && self.listeners.snapshot_into(&stored.source, &mut listeners)
            {
                self.in_flight.begin(stored.source.clone());
                let source = &stored.source;
                let event = &mut stored.event;
                for listener in &listeners {
                    listener.call(|callback| callback(source, &mut *event));
                }
                deleted = self.in_flight.finish();
                listeners.clear();
            }
            self.store.settle::<T, Sourced<T>>(id, stored, deleted);
        }

        *self.scratch.borrow_mut() = listeners;
        pending.clear();
        *self.pending.borrow_mut() = pending;
    }

    fn label(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
