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

//! Disposable subscription tokens.

use crate::listeners::{ListenerId, ListenerOwner};
use khora_data::ecs::EntityHandle;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// What a live token points at.
pub(crate) struct TokenRecord {
    pub(crate) owner: Weak<dyn ListenerOwner>,
    pub(crate) target: Option<EntityHandle>,
    pub(crate) listener: ListenerId,
}

struct TokenSlot {
    generation: u32,
    record: Option<TokenRecord>,
}

/// Generation-stamped slots backing every [`Subscription`] of one bus.
///
/// Released slots go onto a free list and are reused; the generation bump makes
/// a stale token's release a no-op.
pub(crate) struct TokenPool {
    slots: RefCell<Vec<TokenSlot>>,
    free: RefCell<Vec<u32>>,
}

impl TokenPool {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn issue(self: &Rc<Self>, record: TokenRecord) -> Subscription {
        let listener = record.listener;
        let mut slots = self.slots.borrow_mut();
        let (slot, generation) = match self.free.borrow_mut().pop() {
            Some(slot) => {
                let entry = &mut slots[slot as usize];
                entry.record = Some(record);
                (slot, entry.generation)
            }
            None => {
                slots.push(TokenSlot {
                    generation: 0,
                    record: Some(record),
                });
                ((slots.len() - 1) as u32, 0)
            }
        };
        Subscription {
            pool: Rc::downgrade(self),
            slot,
            generation,
            listener,
            released: false,
        }
    }

    /// Frees the slot and detaches its listener. Returns `false` for stale tokens.
    fn release(&self, slot: u32, generation: u32) -> bool {
        let record = {
            let mut slots = self.slots.borrow_mut();
            let Some(entry) = slots.get_mut(slot as usize) else {
                return false;
            };
            if entry.generation != generation {
                return false;
            }
            let Some(record) = entry.record.take() else {
                return false;
            };
            entry.generation = entry.generation.wrapping_add(1);
            self.free.borrow_mut().push(slot);
            record
        };
        // The owner may be gone already; the slot is freed regardless.
        if let Some(owner) = record.owner.upgrade() {
            owner.detach(record.target.as_ref(), record.listener);
        }
        true
    }

    fn is_live(&self, slot: u32, generation: u32) -> bool {
        let record = {
            let slots = self.slots.borrow();
            match slots.get(slot as usize) {
                Some(entry) if entry.generation == generation => match &entry.record {
                    Some(record) => (record.owner.clone(), record.target.clone(), record.listener),
                    None => return false,
                },
                _ => return false,
            }
        };
        let (owner, target, listener) = record;
        owner
            .upgrade()
            .is_some_and(|owner| owner.holds(target.as_ref(), listener))
    }

    /// Invalidates every outstanding token without touching the listeners.
    pub(crate) fn revoke_all(&self) -> usize {
        let mut slots = self.slots.borrow_mut();
        let mut free = self.free.borrow_mut();
        let mut revoked = 0;
        for (index, entry) in slots.iter_mut().enumerate() {
            if entry.record.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                free.push(index as u32);
                revoked += 1;
            }
        }
        revoked
    }

    /// Number of tokens whose listener is still registered.
    ///
    /// A token whose channel was released, or whose listener was removed by
    /// other means, no longer counts even though it has not been disposed.
    pub(crate) fn live(&self) -> usize {
        let records: Vec<_> = self
            .slots
            .borrow()
            .iter()
            .filter_map(|entry| entry.record.as_ref())
            .map(|record| (record.owner.clone(), record.target.clone(), record.listener))
            .collect();
        records
            .into_iter()
            .filter(|(owner, target, listener)| {
                owner
                    .upgrade()
                    .is_some_and(|owner| owner.holds(target.as_ref(), *listener))
            })
            .count()
    }
}

/// Keeps one listener registered for as long as it is held.
///
/// Dropping the subscription, or calling [`Subscription::dispose`], removes the
/// listener. Disposing twice is harmless, and so is disposing after the owning
/// bus was destroyed.
#[must_use = "dropping a Subscription unregisters its listener immediately"]
pub struct Subscription {
    pool: Weak<TokenPool>,
    slot: u32,
    generation: u32,
    listener: ListenerId,
    released: bool,
}

impl Subscription {
    /// Unregisters the listener. Returns `true` only on the call that actually removed it.
    pub fn dispose(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        self.pool
            .upgrade()
            .is_some_and(|pool| pool.release(self.slot, self.generation))
    }

    /// Returns `true` while the listener is still registered through this token.
    pub fn is_active(&self) -> bool {
        !self.released
            && self
                .pool
                .upgrade()
                .is_some_and(|pool| pool.is_live(self.slot, self.generation))
    }

    /// The id of the listener this token controls.
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::ListenerList;

    type Noop = dyn FnMut(&mut u8);

    fn registered(list: &Rc<ListenerList<Noop>>, id: u64) -> TokenRecord {
        list.push(ListenerId::new(id), Box::new(|_: &mut u8| {}));
        let owner: Rc<dyn ListenerOwner> = list.clone();
        TokenRecord {
            owner: Rc::downgrade(&owner),
            target: None,
            listener: ListenerId::new(id),
        }
    }

    #[test]
    fn dispose_detaches_once() {
        let pool = TokenPool::new();
        let list = Rc::new(ListenerList::<Noop>::new());
        let mut token = pool.issue(registered(&list, 1));
        assert!(token.is_active());

        assert!(token.dispose());
        assert!(!token.dispose());
        assert_eq!(list.len(), 0);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn reused_slot_ignores_stale_generation() {
        let pool = TokenPool::new();
        let list = Rc::new(ListenerList::<Noop>::new());
        let first = pool.issue(registered(&list, 1));
        let (slot, generation) = (first.slot, first.generation);
        drop(first);

        let second = pool.issue(registered(&list, 2));
        assert_eq!(second.slot, slot, "the freed slot is reused");
        assert!(!pool.release(slot, generation));
        assert!(second.is_active());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn revoke_keeps_listeners_but_kills_tokens() {
        let pool = TokenPool::new();
        let list = Rc::new(ListenerList::<Noop>::new());
        let mut token = pool.issue(registered(&list, 1));

        assert_eq!(pool.revoke_all(), 1);
        assert!(!token.is_active());
        assert!(!token.dispose());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn live_skips_tokens_whose_listener_is_gone() {
        let pool = TokenPool::new();
        let list = Rc::new(ListenerList::<Noop>::new());
        let _kept = pool.issue(registered(&list, 1));
        let _removed = pool.issue(registered(&list, 2));
        assert_eq!(pool.live(), 2);

        assert!(list.remove(ListenerId::new(2)));
        assert_eq!(pool.live(), 1);

        drop(list);
        assert_eq!(pool.live(), 0, "the owning list was released");
    }
}
