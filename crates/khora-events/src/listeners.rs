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

//! Subscriber storage shared by the four category registries.
//!
//! Every registration is an `Rc<Listener<F>>`. Drains copy the (cheap) `Rc`s
//! into a scratch buffer before dispatching, so callbacks may subscribe or
//! unsubscribe freely while a pass is running: removals flip the listener's
//! `active` flag and are honoured immediately, additions are seen next pass.

use ahash::AHashMap;
use khora_data::ecs::EntityHandle;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Callback shape of global and unique events.
pub(crate) type EventCallback<T> = dyn FnMut(&mut T);
/// Callback shape of entity-scoped events.
pub(crate) type EntityCallback<T> = dyn FnMut(&EntityHandle, &mut T);
/// Callback shape of flag events.
pub(crate) type FlagCallback = dyn FnMut(&EntityHandle);

/// Identifies one registration inside one registry.
///
/// Returned by `listen` and accepted by `remove_listener`. Registering the same
/// closure twice yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// One registered callback.
pub(crate) struct Listener<F: ?Sized> {
    id: ListenerId,
    active: Cell<bool>,
    callback: RefCell<Box<F>>,
}

impl<F: ?Sized> Listener<F> {
    fn new(id: ListenerId, callback: Box<F>) -> Rc<Self> {
        Rc::new(Self {
            id,
            active: Cell::new(true),
            callback: RefCell::new(callback),
        })
    }

    /// Invokes the callback unless it was removed or is already running further up the stack.
    pub(crate) fn call(&self, invoke: impl FnOnce(&mut F)) {
        if !self.active.get() {
            return;
        }
        match self.callback.try_borrow_mut() {
            Ok(mut callback) => invoke(&mut **callback),
            Err(_) => log::warn!("{} re-entered its own dispatch; skipped", self.id),
        }
    }
}

fn remove_from<F: ?Sized>(entries: &mut Vec<Rc<Listener<F>>>, id: ListenerId) -> bool {
    match entries.iter().position(|listener| listener.id == id) {
        Some(at) => {
            let listener = entries.remove(at);
            listener.active.set(false);
            true
        }
        None => false,
    }
}

/// Something a subscription token can detach a listener from.
pub(crate) trait ListenerOwner {
    /// Removes the registration. Unknown ids are a no-op returning `false`.
    fn detach(&self, target: Option<&EntityHandle>, id: ListenerId) -> bool;
    /// Returns `true` if the registration is still present.
    fn holds(&self, target: Option<&EntityHandle>, id: ListenerId) -> bool;
}

/// Callbacks for one event type, in registration order.
pub(crate) struct ListenerList<F: ?Sized> {
    entries: RefCell<Vec<Rc<Listener<F>>>>,
}

impl<F: ?Sized> ListenerList<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, id: ListenerId, callback: Box<F>) {
        self.entries.borrow_mut().push(Listener::new(id, callback));
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        remove_from(&mut self.entries.borrow_mut(), id)
    }

    /// Copies the current registrations into `out`, keeping order.
    pub(crate) fn snapshot_into(&self, out: &mut Vec<Rc<Listener<F>>>) {
        out.extend(self.entries.borrow().iter().cloned());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl<F: ?Sized> ListenerOwner for ListenerList<F> {
    fn detach(&self, _target: Option<&EntityHandle>, id: ListenerId) -> bool {
        self.remove(id)
    }

    fn holds(&self, _target: Option<&EntityHandle>, id: ListenerId) -> bool {
        self.entries.borrow().iter().any(|listener| listener.id == id)
    }
}

/// Callbacks for one event type, grouped by the entity they observe.
pub(crate) struct KeyedListeners<F: ?Sized> {
    by_target: RefCell<AHashMap<EntityHandle, Vec<Rc<Listener<F>>>>>,
}

impl<F: ?Sized> KeyedListeners<F> {
    pub(crate) fn new() -> Self {
        Self {
            by_target: RefCell::new(AHashMap::new()),
        }
    }

    pub(crate) fn push(&self, target: &EntityHandle, id: ListenerId, callback: Box<F>) {
        self.by_target
            .borrow_mut()
            .entry(target.clone())
            .or_default()
            .push(Listener::new(id, callback));
    }

    /// Removes one registration; drops the target's entry once it is empty.
    pub(crate) fn remove(&self, target: &EntityHandle, id: ListenerId) -> bool {
        let mut by_target = self.by_target.borrow_mut();
        let Some(entries) = by_target.get_mut(target) else {
            return false;
        };
        let removed = remove_from(entries, id);
        if entries.is_empty() {
            by_target.remove(target);
        }
        removed
    }

    /// Copies the registrations for `target` into `out`.
    ///
    /// Returns `false` if nobody observes `target`.
    pub(crate) fn snapshot_into(
        &self,
        target: &EntityHandle,
        out: &mut Vec<Rc<Listener<F>>>,
    ) -> bool {
        match self.by_target.borrow().get(target) {
            Some(entries) => {
                out.extend(entries.iter().cloned());
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self, target: &EntityHandle) -> usize {
        self.by_target.borrow().get(target).map_or(0, Vec::len)
    }
}

impl<F: ?Sized> ListenerOwner for KeyedListeners<F> {
    fn detach(&self, target: Option<&EntityHandle>, id: ListenerId) -> bool {
        target.is_some_and(|target| self.remove(target, id))
    }

    fn holds(&self, target: Option<&EntityHandle>, id: ListenerId) -> bool {
        let Some(target) = target else {
            return false;
        };
        self.by_target
            .borrow()
            .get(target)
            .is_some_and(|entries| entries.iter().any(|listener| listener.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khora_data::ecs::World;

    type Counter = dyn FnMut(&mut u32);

    fn counting(list: &ListenerList<Counter>, id: u64, step: u32) {
        list.push(ListenerId::new(id), Box::new(move |n: &mut u32| *n += step));
    }

    fn dispatch(list: &ListenerList<Counter>, value: &mut u32) {
        let mut snapshot = Vec::new();
        list.snapshot_into(&mut snapshot);
        for listener in &snapshot {
            listener.call(|callback| callback(value));
        }
    }

    #[test]
    fn removal_only_touches_the_given_id() {
        let list = ListenerList::<Counter>::new();
        counting(&list, 1, 1);
        counting(&list, 2, 10);

        assert!(list.remove(ListenerId::new(1)));
        assert!(!list.remove(ListenerId::new(1)), "second removal is a no-op");

        let mut value = 0;
        dispatch(&list, &mut value);
        assert_eq!(value, 10);
    }

    #[test]
    fn removed_listener_is_skipped_even_if_already_snapshotted() {
        let list = ListenerList::<Counter>::new();
        counting(&list, 1, 1);
        let mut snapshot = Vec::new();
        list.snapshot_into(&mut snapshot);

        list.remove(ListenerId::new(1));

        let mut value = 0;
        for listener in &snapshot {
            listener.call(|callback| callback(&mut value));
        }
        assert_eq!(value, 0);
    }

    #[test]
    fn keyed_entry_is_dropped_when_empty() {
        let world = World::new().into_shared();
        let target = EntityHandle::spawn(&world);
        let keyed = KeyedListeners::<FlagCallback>::new();
        keyed.push(&target, ListenerId::new(7), Box::new(|_: &EntityHandle| {}));
        assert_eq!(keyed.len(&target), 1);
        assert!(keyed.holds(Some(&target), ListenerId::new(7)));

        assert!(keyed.detach(Some(&target), ListenerId::new(7)));
        assert!(keyed.by_target.borrow().is_empty());
        assert!(!keyed.detach(None, ListenerId::new(7)));
    }
}
