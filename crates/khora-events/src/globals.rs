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

//! Broadcast events.

use crate::error::EventBusResult;
use crate::listeners::{EventCallback, Listener, ListenerId, ListenerList, ListenerOwner};
use crate::registry::{CategoryDrain, ChannelTable, RunGuard};
use crate::store::{EventStore, InFlight};
use crate::token::{Subscription, TokenPool, TokenRecord};
use khora_core::event::{CategoryKind, DrainProcedure, GlobalEvent};
use khora_data::ecs::EntityId;
use std::cell::{Cell, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// Registry of [`GlobalEvent`]s.
///
/// Any number of instances of one type may be live at once. Each drain pass
/// hands every instance to every subscriber, then deletes it unless the type
/// is persistent.
pub struct GlobalEvents {
    store: Rc<EventStore>,
    tokens: Rc<TokenPool>,
    table: Rc<ChannelTable>,
}

impl GlobalEvents {
    pub(crate) fn new(store: Rc<EventStore>, tokens: Rc<TokenPool>, capacity: usize) -> Self {
        Self {
            store,
            tokens,
            table: Rc::new(ChannelTable::new(CategoryKind::Global, capacity)),
        }
    }

    /// Raises a new instance and returns it for further population.
    ///
    /// The guard borrows the events world; drop it before draining.
    pub fn add<T: GlobalEvent>(&self, event: T) -> EventBusResult<RefMut<'_, T>> {
        self.store.map_mut(|world| world.spawn_with(event).1)
    }

    /// Returns `true` if at least one instance of `T` is live.
    pub fn has<T: GlobalEvent>(&self) -> bool {
        self.count::<T>() > 0
    }

    /// Number of live instances of `T`, including one being delivered.
    pub fn count<T: GlobalEvent>(&self) -> usize {
        let lifted = self
            .table
            .get::<GlobalDrain<T>>()
            .is_some_and(|channel| channel.in_flight.is_live());
        self.store.count::<T>() + usize::from(lifted)
    }

    /// Deletes every live instance of `T` without delivering it.
    ///
    /// Called from a callback of `T`, this also deletes the instance being
    /// delivered, persistent or not.
    pub fn del<T: GlobalEvent>(&self) -> usize {
        let lifted = self
            .table
            .get::<GlobalDrain<T>>()
            .is_some_and(|channel| channel.in_flight.delete());
        self.store.despawn_where::<T>(|_| true) + usize::from(lifted)
    }

    /// Registers `callback` for `T` until the returned token is dropped.
    pub fn subscribe<T: GlobalEvent>(
        &self,
        callback: impl FnMut(&mut T) + 'static,
    ) -> EventBusResult<Subscription> {
        let channel = self.channel::<T>()?;
        let listener = self.register(&channel, callback);
        let owner = Rc::downgrade(&channel.listeners);
        let owner: Weak<dyn ListenerOwner> = owner;
        Ok(self.tokens.issue(TokenRecord {
            owner,
            target: None,
            listener,
        }))
    }

    /// Registers `callback` for `T` without a token.
    pub fn listen<T: GlobalEvent>(
        &self,
        callback: impl FnMut(&mut T) + 'static,
    ) -> EventBusResult<ListenerId> {
        let channel = self.channel::<T>()?;
        Ok(self.register(&channel, callback))
    }

    /// Removes a registration made with [`GlobalEvents::listen`]. Unknown ids are ignored.
    pub fn remove_listener<T: GlobalEvent>(&self, id: ListenerId) -> bool {
        self.table
            .get::<GlobalDrain<T>>()
            .is_some_and(|channel| channel.listeners.remove(id))
    }

    /// Number of callbacks registered for `T`.
    pub fn listener_count<T: GlobalEvent>(&self) -> usize {
        self.table
            .get::<GlobalDrain<T>>()
            .map_or(0, |channel| channel.listeners.len())
    }

    /// The drain procedure of `T`, created if needed.
    pub fn drain_procedure<T: GlobalEvent>(&self) -> EventBusResult<Rc<dyn DrainProcedure>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).1)
    }

    /// Delivers and consumes the live instances of `T` right now.
    pub fn drain<T: GlobalEvent>(&self) -> EventBusResult<()> {
        self.drain_procedure::<T>()?.run();
        Ok(())
    }

    /// Runs the drain of every global event type seen so far.
    pub fn drain_all(&self) {
        self.table.run_all();
    }

    /// A procedure draining the whole category.
    pub fn category_drain(&self) -> CategoryDrain {
        CategoryDrain::new(self.table.clone())
    }

    /// Drops every global channel, with its listeners and its drain.
    ///
    /// Outstanding tokens become inert. Raised instances stay in the store.
    pub fn release_all(&self) -> usize {
        self.table.clear()
    }

    fn channel<T: GlobalEvent>(&self) -> EventBusResult<Rc<GlobalDrain<T>>> {
        self.store.ensure_alive()?;
        Ok(self.table.get_or_create(|| self.create::<T>()).0)
    }

    fn create<T: GlobalEvent>(&self) -> (Rc<GlobalDrain<T>>, Rc<dyn DrainProcedure>) {
        let channel = Rc::new(GlobalDrain::<T>::new(self.store.clone()));
        let drain: Rc<dyn DrainProcedure> = channel.clone();
        (channel, drain)
    }

    fn register<T: GlobalEvent>(
        &self,
        channel: &GlobalDrain<T>,
        callback: impl FnMut(&mut T) + 'static,
    ) -> ListenerId {
        let id = self.table.next_listener_id();
        channel.listeners.push(id, Box::new(callback));
        id
    }
}

/// Listeners and drain of one global event type.
pub(crate) struct GlobalDrain<T: GlobalEvent> {
    store: Rc<EventStore>,
    listeners: Rc<ListenerList<EventCallback<T>>>,
    running: Cell<bool>,
    pending: RefCell<Vec<EntityId>>,
    scratch: RefCell<Vec<Rc<Listener<EventCallback<T>>>>>,
    in_flight: InFlight<EntityId>,
}

impl<T: GlobalEvent> GlobalDrain<T> {
    fn new(store: Rc<EventStore>) -> Self {
        Self {
            store,
            listeners: Rc::new(ListenerList::new()),
            running: Cell::new(false),
            pending: RefCell::new(Vec::new()),
            scratch: RefCell::new(Vec::new()),
            in_flight: InFlight::new(),
        }
    }
}

impl<T: GlobalEvent> DrainProcedure for GlobalDrain<T> {
    fn run(&self) {
        let Some(_guard) = RunGuard::enter(&self.running, self.label()) else {
            return;
        };
        let mut pending = self.pending.take();
        self.store.snapshot_into::<T>(&mut pending);
        if !pending.is_empty() {
            let mut listeners = self.scratch.take();
            self.listeners.snapshot_into(&mut listeners);
            log::trace!(
                "{}: {} instance(s), {} listener(s)",
                self.label(),
                pending.len(),
                listeners.len()
            );

            for &id in &pending {
                let Ok(Some(mut event)) = self.store.with(|world| world.remove::<T>(id)) else {
                    // Deleted by an earlier callback, or the bus went away.
                    continue;
                };
                self.in_flight.begin(id);
                for listener in &listeners {
                    listener.call(|callback| callback(&mut event));
                }
                let deleted = self.in_flight.finish();
                self.store.settle::<T, T>(id, event, deleted);
            }

            listeners.clear();
            *self.scratch.borrow_mut() = listeners;
        }
        pending.clear();
        *self.pending.borrow_mut() = pending;
    }

    fn label(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
