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

use anyhow::Result;
use khora_events::{
    Component, Entity, EntityHandle, Event, EventBus, EventBusConfig, Flag, Global, SharedWorld,
    Subscription, Unique, World,
};
use std::cell::Cell;
use std::rc::Rc;

// --- COMPONENTS ---

struct Health(i32);
impl Component for Health {}

// --- EVENTS ---

/// Damage dealt to one actor.
struct Damaged {
    amount: i32,
}
impl Component for Damaged {}
impl Event for Damaged {
    type Category = Entity;
}

/// Set on an actor the tick its health reaches zero.
#[derive(Default)]
struct Died;
impl Component for Died {}
impl Event for Died {
    type Category = Flag;
}

/// Raised whenever an actor dies; coalesces per tick.
#[derive(Default)]
struct Casualties {
    count: u32,
}
impl Component for Casualties {}
impl Event for Casualties {
    type Category = Unique;
}

/// One line of the combat log.
struct Announce(String);
impl Component for Announce {}
impl Event for Announce {
    type Category = Global;
}

const ACTORS: usize = 5;
const TICKS: u32 = 12;

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = EventBusConfig::from_ron(include_str!("../bus.ron"))?;
    let bus = EventBus::with_config(&config);
    let world = World::new().into_shared();

    let actors: Vec<EntityHandle> = (0..ACTORS)
        .map(|i| {
            let handle = EntityHandle::spawn(&world);
            world
                .borrow_mut()
                .insert(handle.entity(), Health(10 + 5 * i as i32));
            handle
        })
        .collect();

    let subscriptions = wire(&bus, &world, &actors)?;
    let survivors = Rc::new(Cell::new(ACTORS));
    let _tally = {
        let survivors = survivors.clone();
        bus.uniques().subscribe(move |casualties: &mut Casualties| {
            survivors.set(survivors.get().saturating_sub(casualties.count as usize));
        })?
    };

    for tick in 0..TICKS {
        // Everyone takes a hit every tick; the bus delivers at the end of it.
        for (i, actor) in actors.iter().enumerate() {
            if actor.is_alive() {
                bus.entity_events().add(actor, Damaged { amount: 3 + i as i32 })?;
            }
        }
        bus.drain_all()?;
        log::info!("tick {tick}: {} actor(s) standing", survivors.get());
        if survivors.get() == 0 {
            break;
        }
    }

    log::info!(
        "{} subscription(s) still registered",
        bus.outstanding_subscriptions()
    );
    drop(subscriptions);
    bus.destroy();
    Ok(())
}

/// Registers the per-actor reactions. The returned tokens keep them alive.
fn wire(
    bus: &EventBus,
    world: &SharedWorld,
    actors: &[EntityHandle],
) -> Result<Vec<Subscription>> {
    let mut subscriptions = Vec::new();

    for actor in actors {
        let weak_bus = bus.downgrade();
        let weak_world = Rc::downgrade(world);
        subscriptions.push(bus.entity_events().subscribe(
            actor,
            move |target, damaged: &mut Damaged| {
                let (Some(bus), Some(world)) = (weak_bus.upgrade(), weak_world.upgrade()) else {
                    return;
                };
                let remaining = {
                    let mut world = world.borrow_mut();
                    match world.get_mut::<Health>(target.entity()) {
                        Some(health) => {
                            health.0 -= damaged.amount;
                            health.0
                        }
                        None => return,
                    }
                };
                if remaining <= 0 {
                    if let Err(err) = bus.flags().add::<Died>(target) {
                        log::warn!("could not flag {target}: {err}");
                    }
                }
            },
        )?);

        let weak_bus = bus.downgrade();
        let weak_world = Rc::downgrade(world);
        subscriptions.push(bus.flags().subscribe::<Died>(actor, move |target| {
            let (Some(bus), Some(world)) = (weak_bus.upgrade(), weak_world.upgrade()) else {
                return;
            };
            world.borrow_mut().despawn(target.entity());
            if let Ok(mut casualties) = bus.uniques().add::<Casualties>() {
                casualties.count += 1;
            }
            let _ = bus.globals().add(Announce(format!("{target} is down")));
        })?);
    }

    subscriptions.push(
        bus.globals()
            .subscribe(|line: &mut Announce| log::info!("{}", line.0))?,
    );
    Ok(subscriptions)
}
