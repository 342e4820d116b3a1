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

//! Per-category channel tables.
//!
//! Each registry keeps one channel per event type, created lazily on first use.
//! A channel is stored type-erased next to its drain procedure; the typed side
//! is recovered with `Rc::downcast` when the registry is called with a concrete
//! event type.

use crate::listeners::ListenerId;
use ahash::AHashMap;
use khora_core::event::{CategoryKind, DrainProcedure};
use std::any::{type_name, Any, TypeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct ChannelEntry {
    channel: Rc<dyn Any>,
    drain: Rc<dyn DrainProcedure>,
}

/// The channels of one category, keyed by event type.
pub(crate) struct ChannelTable {
    kind: CategoryKind,
    channels: RefCell<AHashMap<TypeId, ChannelEntry>>,
    /// Drains in channel creation order.
    drains: RefCell<Vec<Rc<dyn DrainProcedure>>>,
    next_listener: Cell<u64>,
}

impl ChannelTable {
    pub(crate) fn new(kind: CategoryKind, capacity: usize) -> Self {
        Self {
            kind,
            channels: RefCell::new(AHashMap::with_capacity(capacity)),
            drains: RefCell::new(Vec::with_capacity(capacity)),
            next_listener: Cell::new(0),
        }
    }

    pub(crate) fn kind(&self) -> CategoryKind {
        self.kind
    }

    /// Returns the channel for `C` if one was created.
    ///
    /// # Panics
    ///
    /// Panics if the slot for `C` holds a channel of another type.
    pub(crate) fn get<C: 'static>(&self) -> Option<Rc<C>> {
        let channels = self.channels.borrow();
        let entry = channels.get(&TypeId::of::<C>())?;
        Some(downcast(entry.channel.clone()))
    }

    /// Returns the drain of the channel for `C`, if one was created.
    pub(crate) fn drain_of<C: 'static>(&self) -> Option<Rc<dyn DrainProcedure>> {
        self.channels
            .borrow()
            .get(&TypeId::of::<C>())
            .map(|entry| entry.drain.clone())
    }

    /// Returns the channel for `C`, creating it (and its drain) on first use.
    pub(crate) fn get_or_create<C: 'static>(
        &self,
        create: impl FnOnce() -> (Rc<C>, Rc<dyn DrainProcedure>),
    ) -> (Rc<C>, Rc<dyn DrainProcedure>) {
        if let Some(entry) = self.channels.borrow().get(&TypeId::of::<C>()) {
            return (downcast(entry.channel.clone()), entry.drain.clone());
        }
        let (channel, drain) = create();
        log::debug!("{} registry: new channel for {}", self.kind, drain.label());
        self.channels.borrow_mut().insert(
            TypeId::of::<C>(),
            ChannelEntry {
                channel: channel.clone(),
                drain: drain.clone(),
            },
        );
        self.drains.borrow_mut().push(drain.clone());
        (channel, drain)
    }

    pub(crate) fn next_listener_id(&self) -> ListenerId {
        let raw = self.next_listener.get();
        self.next_listener.set(raw + 1);
        ListenerId::new(raw)
    }

    /// Number of channels created so far.
    pub(crate) fn len(&self) -> usize {
        self.drains.borrow().len()
    }

    /// Runs every channel's drain in creation order.
    ///
    /// Channels created by a callback during this pass are drained too.
    pub(crate) fn run_all(&self) {
        let mut index = 0;
        loop {
            let drain = match self.drains.borrow().get(index) {
                Some(drain) => drain.clone(),
                None => break,
            };
            drain.run();
            index += 1;
        }
    }

    /// Drops every channel. Listeners and drains are released outside the borrow.
    pub(crate) fn clear(&self) -> usize {
        let channels = std::mem::take(&mut *self.channels.borrow_mut());
        let drains = std::mem::take(&mut *self.drains.borrow_mut());
        let released = drains.len();
        drop(channels);
        drop(drains);
        released
    }
}

fn downcast<C: 'static>(channel: Rc<dyn Any>) -> Rc<C> {
    match channel.downcast::<C>() {
        Ok(channel) => channel,
        Err(_) => panic!("channel table holds a foreign channel under {}", type_name::<C>()),
    }
}

/// Marks a drain as running; dropping the guard clears the mark.
pub(crate) struct RunGuard<'a> {
    running: &'a Cell<bool>,
}

impl<'a> RunGuard<'a> {
    /// Returns `None` (and logs) if the drain is already running further up the stack.
    pub(crate) fn enter(running: &'a Cell<bool>, label: &str) -> Option<Self> {
        if running.replace(true) {
            log::warn!("{label}: re-entrant drain ignored");
            return None;
        }
        Some(Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.set(false);
    }
}

/// Drains every channel of one category.
///
/// Obtained from a registry's `category_drain`; the bus-level coordinator
/// composes four of these.
#[derive(Clone)]
pub struct CategoryDrain {
    table: Rc<ChannelTable>,
}

impl CategoryDrain {
    pub(crate) fn new(table: Rc<ChannelTable>) -> Self {
        Self { table }
    }

    /// The category this procedure drains.
    pub fn kind(&self) -> CategoryKind {
        self.table.kind()
    }
}

impl DrainProcedure for CategoryDrain {
    fn run(&self) {
        log::trace!("draining {} events ({} channels)", self.table.kind(), self.table.len());
        self.table.run_all();
    }

    fn label(&self) -> &'static str {
        match self.table.kind() {
            CategoryKind::Global => "global events",
            CategoryKind::Unique => "unique events",
            CategoryKind::Entity => "entity events",
            CategoryKind::Flag => "flag events",
        }
    }
}
