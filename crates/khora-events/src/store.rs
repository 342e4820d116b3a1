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

//! The bus-owned events world.

use crate::error::{EventBusError, EventBusResult};
use ahash::AHashMap;
use khora_core::event::Event;
use khora_data::ecs::{Component, EntityId, Filter, World};
use std::any::{type_name, Any, TypeId};
use std::cell::{Cell, RefCell, RefMut};

/// Owns the world that holds raised event payloads.
///
/// The world can be torn down exactly once; afterwards every accessor reports
/// [`EventBusError::Destroyed`] or an empty result. Borrows taken here are
/// short and never span a subscriber callback.
pub(crate) struct EventStore {
    world: RefCell<Option<World>>,
    /// One filter per payload type, resolved on first use.
    filters: RefCell<AHashMap<TypeId, Box<dyn Any>>>,
    destroyed: Cell<bool>,
}

impl EventStore {
    pub(crate) fn new(world: World) -> Self {
        Self {
            world: RefCell::new(Some(world)),
            filters: RefCell::new(AHashMap::new()),
            destroyed: Cell::new(false),
        }
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn ensure_alive(&self) -> EventBusResult<()> {
        if self.is_destroyed() {
            Err(EventBusError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Runs `f` with mutable access to the events world.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> EventBusResult<R> {
        let mut guard = self.world.borrow_mut();
        let world = guard.as_mut().ok_or(EventBusError::Destroyed)?;
        Ok(f(world))
    }

    /// Runs `f` with shared access to the events world; `None` once destroyed.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&World) -> R) -> Option<R> {
        self.world.borrow().as_ref().map(f)
    }

    /// Borrows the events world for longer than one call, e.g. to hand out a `RefMut`.
    pub(crate) fn borrow_world(&self) -> EventBusResult<RefMut<'_, World>> {
        RefMut::filter_map(self.world.borrow_mut(), |slot| slot.as_mut())
            .map_err(|_| EventBusError::Destroyed)
    }

    /// Projects a borrow of the events world onto one component.
    pub(crate) fn map_mut<T>(
        &self,
        f: impl FnOnce(&mut World) -> &mut T,
    ) -> EventBusResult<RefMut<'_, T>> {
        Ok(RefMut::map(self.borrow_world()?, f))
    }

    /// The cached filter over payloads of type `C`.
    pub(crate) fn filter<C: Component>(&self) -> EventBusResult<Filter<C>> {
        if let Some(cached) = self.filters.borrow().get(&TypeId::of::<C>()) {
            return match cached.downcast_ref::<Filter<C>>() {
                Some(filter) => Ok(filter.clone()),
                None => panic!("filter cache holds a foreign filter under {}", type_name::<C>()),
            };
        }
        let filter = self.with(|world| world.filter::<C>())?;
        self.filters
            .borrow_mut()
            .insert(TypeId::of::<C>(), Box::new(filter.clone()));
        Ok(filter)
    }

    /// Number of stored payloads of type `C`.
    pub(crate) fn count<C: Component>(&self) -> usize {
        let Ok(filter) = self.filter::<C>() else {
            return 0;
        };
        self.read(|world| world.matching(&filter).len()).unwrap_or(0)
    }

    /// Appends the entities carrying `C` to `out`, in storage order.
    pub(crate) fn snapshot_into<C: Component>(&self, out: &mut Vec<EntityId>) {
        let Ok(filter) = self.filter::<C>() else {
            return;
        };
        let _ = self.read(|world| out.extend_from_slice(world.matching(&filter)));
    }

    /// Despawns every event entity whose `C` satisfies `doomed`, without delivery.
    pub(crate) fn despawn_where<C: Component>(&self, doomed: impl Fn(&C) -> bool) -> usize {
        let Ok(filter) = self.filter::<C>() else {
            return 0;
        };
        self.with(|world| {
            let victims: Vec<EntityId> = world
                .matching(&filter)
                .iter()
                .copied()
                .filter(|id| world.get::<C>(*id).is_some_and(&doomed))
                .collect();
            for id in &victims {
                world.despawn(*id);
            }
            victims.len()
        })
        .unwrap_or(0)
    }

    /// Finishes the delivery of one instance. A persistent payload goes back
    /// into its entity unless it was deleted during delivery; anything else
    /// is deleted together with the entity.
    pub(crate) fn settle<E: Event, C: Component>(&self, id: EntityId, payload: C, deleted: bool) {
        let _ = self.with(|world| {
            if E::PERSISTENT && !deleted {
                world.insert(id, payload);
            } else {
                world.despawn(id);
            }
        });
    }

    /// Tears the world down. Returns it so the caller controls when it drops.
    pub(crate) fn destroy(&self) -> Option<World> {
        self.destroyed.set(true);
        self.filters.borrow_mut().clear();
        self.world.borrow_mut().take()
    }
}

/// The instance a drain is delivering right now.
///
/// A drain lifts the payload out of its pool for the duration of the
/// callbacks. Registries consult this record so the lifted instance still
/// counts as live and can still be deleted; `finish` reports the deletion so
/// the drain does not put the payload back.
pub(crate) struct InFlight<K> {
    current: RefCell<Option<K>>,
    deleted: Cell<bool>,
}

impl<K> InFlight<K> {
    pub(crate) fn new() -> Self {
        Self {
            current: RefCell::new(None),
            deleted: Cell::new(false),
        }
    }

    pub(crate) fn begin(&self, key: K) {
        self.deleted.set(false);
        *self.current.borrow_mut() = Some(key);
    }

    /// Ends the delivery. Returns `true` if the instance was deleted meanwhile.
    pub(crate) fn finish(&self) -> bool {
        self.current.borrow_mut().take();
        self.deleted.replace(false)
    }

    /// Returns `true` while an undeleted instance matching `pred` is in flight.
    pub(crate) fn is_live_where(&self, pred: impl FnOnce(&K) -> bool) -> bool {
        !self.deleted.get() && self.current.borrow().as_ref().is_some_and(pred)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.is_live_where(|_| true)
    }

    /// Marks the in-flight instance deleted if it matches `pred`.
    pub(crate) fn delete_where(&self, pred: impl FnOnce(&K) -> bool) -> bool {
        let hit = self.is_live_where(pred);
        if hit {
            self.deleted.set(true);
        }
        hit
    }

    pub(crate) fn delete(&self) -> bool {
        self.delete_where(|_| true)
    }
}
