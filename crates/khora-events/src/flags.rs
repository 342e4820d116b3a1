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

//! Presence markers stored on the target entity itself.

use crate::error::{EventBusError, EventBusResult};
use crate::listeners::{FlagCallback, KeyedListeners, Listener, ListenerId, ListenerOwner};
use crate::registry::{CategoryDrain, ChannelTable, RunGuard};
use crate::store::{EventStore, InFlight};
use crate::token::{Subscription, TokenPool, TokenRecord};
use khora_core::event::{CategoryKind, DrainProcedure, FlagEvent};
use khora_data::ecs::{EntityHandle, EntityId, Filter, PoolHandle, World, WorldId};
use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Registry of [`FlagEvent`]s.
///
/// A flag is a marker component attached to the target in the target's own
/// world. The drain of a flag type is bound to the world of its first
/// subscription; subscribing or raising the same type in another world is
/// rejected with [`EventBusError::WorldMismatch`].
pub struct FlagEvents {
    store: Rc<EventStore>,
    tokens: Rc<TokenPool>,
    table: Rc<ChannelTable>,
}

impl FlagEvents {
    pub(crate) fn new(store: Rc<EventStore>, tokens: Rc<TokenPool>, capacity: usize) -> Self {
        Self {
            store,
            tokens,
            table: Rc::new(ChannelTable::new(CategoryKind::Flag, capacity)),
        }
    }

    /// Attaches `T` to `target`. Returns `Ok(false)` if it was already there.
    pub fn add<T: FlagEvent>(&self, target: &EntityHandle) -> EventBusResult<bool> {
        self.store.ensure_alive()?;
        self.check_binding::<T>(target.world_id())?;
        let (world, entity) = target.resolve().ok_or_else(|| stale(target))?;
        let mut world = world.borrow_mut();
        let pool = world.pool::<T>();
        Ok(self.add_raw(&mut world, pool, entity))
    }

    /// Attaches `T` through an already-resolved pool, for hot loops.
    ///
    /// Returns `false` if the marker was already present, the entity is dead,
    /// the bus is destroyed, or `T` is bound to another world.
    pub fn add_raw<T: FlagEvent>(
        &self,
        world: &mut World,
        pool: PoolHandle<T>,
        entity: EntityId,
    ) -> bool {
        if self.store.is_destroyed() || self.check_binding::<T>(world.id()).is_err() {
            return false;
        }
        if world.has_in(pool, entity) {
            return false;
        }
        world.insert_in(pool, entity, T::default()).is_some()
    }

    /// Returns `true` if `target` currently carries `T`, including a marker
    /// being delivered.
    pub fn has<T: FlagEvent>(&self, target: &EntityHandle) -> bool {
        let Some((world, entity)) = target.resolve() else {
            return false;
        };
        if self
            .bound_channel::<T>(target.world_id())
            .is_some_and(|channel| channel.in_flight.is_live_where(|lifted| *lifted == entity))
        {
            return true;
        }
        let world = world.borrow();
        world.has::<T>(entity)
    }

    /// Removes `T` from `target` without delivering it.
    ///
    /// Called from a callback of `T`, this also removes the marker being
    /// delivered, persistent or not.
    pub fn del<T: FlagEvent>(&self, target: &EntityHandle) -> bool {
        let Some((world, entity)) = target.resolve() else {
            return false;
        };
        let lifted = self
            .bound_channel::<T>(target.world_id())
            .is_some_and(|channel| channel.in_flight.delete_where(|lifted| *lifted == entity));
        let removed = world.borrow_mut().remove::<T>(entity).is_some();
        lifted || removed
    }

    /// Registers `callback` for `T` appearing on `target`.
    ///
    /// The first registration for `T` binds its drain to the target's world.
    pub fn subscribe<T: FlagEvent>(
        &self,
        target: &EntityHandle,
        callback: impl FnMut(&EntityHandle) + 'static,
    ) -> EventBusResult<Subscription> {
        let (channel, listener) = self.register::<T>(target, callback)?;
        let owner = Rc::downgrade(&channel.listeners);
        let owner: Weak<dyn ListenerOwner> = owner;
        Ok(self.tokens.issue(TokenRecord {
            owner,
            target: Some(target.clone()),
            listener,
        }))
    }

    /// Registers `callback` for `(T, target)` without a token.
    pub fn listen<T: FlagEvent>(
        &self,
        target: &EntityHandle,
        callback: impl FnMut(&EntityHandle) + 'static,
    ) -> EventBusResult<ListenerId> {
        Ok(self.register::<T>(target, callback)?.1)
    }

    /// Removes a registration made with [`FlagEvents::listen`] for the same target.
    pub fn remove_listener<T: FlagEvent>(&self, target: &EntityHandle, id: ListenerId) -> bool {
        self.table
            .get::<FlagDrain<T>>()
            .is_some_and(|channel| channel.listeners.remove(target, id))
    }

    /// Number of callbacks registered for `(T, target)`.
    pub fn listener_count<T: FlagEvent>(&self, target: &EntityHandle) -> usize {
        self.table
            .get::<FlagDrain<T>>()
            .map_or(0, |channel| channel.listeners.len(target))
    }

    /// The world the drain of `T` is bound to, once bound.
    pub fn bound_world<T: FlagEvent>(&self) -> Option<WorldId> {
        self.table.get::<FlagDrain<T>>().map(|channel| channel.world_id)
    }

    /// The drain procedure of `T`, if a subscription has bound one.
    pub fn drain_procedure<T: FlagEvent>(&self) -> EventBusResult<Option<Rc<dyn DrainProcedure>>> {
        self.store.ensure_alive()?;
        Ok(self.table.drain_of::<FlagDrain<T>>())
    }

    /// Delivers and clears the markers of `T` right now. No-op while unbound.
    pub fn drain<T: FlagEvent>(&self) -> EventBusResult<()> {
        if let Some(drain) = self.drain_procedure::<T>()? {
            drain.run();
        }
        Ok(())
    }

    /// Runs the drain of every bound flag type.
    pub fn drain_all(&self) {
        self.table.run_all();
    }

    /// A procedure draining the whole category.
    pub fn category_drain(&self) -> CategoryDrain {
        CategoryDrain::new(self.table.clone())
    }

    /// Drops every flag channel and its world binding. Outstanding tokens become inert.
    pub fn release_all(&self) -> usize {
        self.table.clear()
    }

    fn register<T: FlagEvent>(
        &self,
        target: &EntityHandle,
        callback: impl FnMut(&EntityHandle) + 'static,
    ) -> EventBusResult<(Rc<FlagDrain<T>>, ListenerId)> {
        self.store.ensure_alive()?;
        let (world, _) = target.resolve().ok_or_else(|| stale(target))?;
        let (channel, _) = self.table.get_or_create(|| {
            log::debug!("{} bound to {}", type_name::<T>(), target.world_id());
            let filter = world.borrow_mut().filter::<T>();
            let channel = Rc::new(FlagDrain::<T>::new(
                self.store.clone(),
                Rc::downgrade(&world),
                target.world_id(),
                filter,
            ));
            let drain: Rc<dyn DrainProcedure> = channel.clone();
            (channel, drain)
        });
        if channel.world_id != target.world_id() {
            return Err(mismatch::<T>(channel.world_id, target.world_id()));
        }
        let listener = self.table.next_listener_id();
        channel.listeners.push(target, listener, Box::new(callback));
        Ok((channel, listener))
    }

    fn bound_channel<T: FlagEvent>(&self, world: WorldId) -> Option<Rc<FlagDrain<T>>> {
        self.table
            .get::<FlagDrain<T>>()
            .filter(|channel| channel.world_id == world)
    }

    fn check_binding<T: FlagEvent>(&self, requested: WorldId) -> EventBusResult<()> {
        match self.table.get::<FlagDrain<T>>() {
            Some(channel) if channel.world_id != requested => {
                Err(mismatch::<T>(channel.world_id, requested))
            }
            _ => Ok(()),
        }
    }
}

fn stale(target: &EntityHandle) -> EventBusError {
    EventBusError::StaleHandle {
        world: target.world_id(),
        entity: target.entity(),
    }
}

fn mismatch<T>(bound: WorldId, requested: WorldId) -> EventBusError {
    log::warn!(
        "{} is bound to {bound}; rejected use from {requested}",
        type_name::<T>()
    );
    EventBusError::WorldMismatch {
        event: type_name::<T>(),
        bound,
        requested,
    }
}

pub(crate) struct FlagDrain<T: FlagEvent> {
    store: Rc<EventStore>,
    world: Weak<RefCell<World>>,
    world_id: WorldId,
    listeners: Rc<KeyedListeners<FlagCallback>>,
    running: Cell<bool>,
    pending: RefCell<Vec<EntityId>>,
    scratch: RefCell<Vec<Rc<Listener<FlagCallback>>>>,
    filter: Filter<T>,
    in_flight: InFlight<EntityId>,
}

impl<T: FlagEvent> FlagDrain<T> {
    fn new(
        store: Rc<EventStore>,
        world: Weak<RefCell<World>>,
        world_id: WorldId,
        filter: Filter<T>,
    ) -> Self {
        Self {
            store,
            world,
            world_id,
            listeners: Rc::new(KeyedListeners::new()),
            running: Cell::new(false),
            pending: RefCell::new(Vec::new()),
            scratch: RefCell::new(Vec::new()),
            filter,
            in_flight: InFlight::new(),
        }
    }
}

impl<T: FlagEvent> DrainProcedure for FlagDrain<T> {
    fn run(&self) {
        let Some(_guard) = RunGuard::enter(&self.running, self.label()) else {
            return;
        };
        if self.store.is_destroyed() {
            return;
        }
        let Some(world) = self.world.upgrade() else {
            log::trace!("{}: bound world is gone", self.label());
            return;
        };

        let mut pending = self.pending.take();
        pending.extend_from_slice(world.borrow().matching(&self.filter));
        let mut listeners = self.scratch.take();
        log::trace!("{}: {} marked entit(ies)", self.label(), pending.len());

        for &entity in &pending {
            // Lift the marker for the duration of the delivery.
            let Some(marker) = world.borrow_mut().remove::<T>(entity) else {
                continue;
            };
            let handle = EntityHandle::from_parts(self.world.clone(), self.world_id, entity);
            let mut deleted = false;
            if self.listeners.snapshot_into(&handle, &mut listeners) {
                self.in_flight.begin(entity);
                for listener in &listeners {
                    listener.call(|callback| callback(&handle));
                }
                deleted = self.in_flight.finish();
                listeners.clear();
            }
            if T::PERSISTENT && !deleted {
                let mut world = world.borrow_mut();
                if !world.has::<T>(entity) {
                    world.insert(entity, marker);
                }
            }
        }

        *self.scratch.borrow_mut() = listeners;
        pending.clear();
        *self.pending.borrow_mut() = pending;
    }

    fn label(&self) -> &'static str {
        type_name::<T>()
    }
}
