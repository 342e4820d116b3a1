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

use super::{Component, EntityHandle, World};

// --- DUMMY COMPONENTS FOR TESTING ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position(i32);
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Stunned;
impl Component for Stunned {}

// --- TESTS ---

#[test]
fn test_spawn_and_despawn_recycles_with_new_generation() {
    // --- 1. SETUP ---
    let mut world = World::new();
    let first = world.spawn();

    // --- 2. ACTION ---
    assert!(world.despawn(first));
    let second = world.spawn();

    // --- 3. ASSERTIONS ---
    assert_eq!(second.index, first.index, "The slot should be recycled");
    assert_eq!(second.generation, first.generation + 1);
    assert!(!world.is_alive(first), "The old id must be stale");
    assert!(world.is_alive(second));
    assert!(!world.despawn(first), "Despawning a stale id is a no-op");
    assert_eq!(world.len(), 1);
}

#[test]
fn test_despawn_removes_every_component() {
    let mut world = World::new();
    let entity = world.spawn();
    world.insert(entity, Position(3));
    world.insert(entity, Stunned);

    world.despawn(entity);

    assert_eq!(world.count::<Position>(), 0);
    assert_eq!(world.count::<Stunned>(), 0);
}

#[test]
fn test_spawn_with_returns_the_stored_component() {
    let mut world = World::new();

    let (entity, position) = world.spawn_with(Position(5));
    position.0 += 1;

    assert!(world.is_alive(entity));
    assert_eq!(world.get::<Position>(entity), Some(&Position(6)));
}

#[test]
fn test_insert_on_dead_entity_is_rejected() {
    let mut world = World::new();
    let entity = world.spawn();
    world.despawn(entity);

    assert!(world.insert(entity, Position(1)).is_none());
    assert!(world.get_or_insert_with(entity, || Position(1)).is_none());
    assert_eq!(world.count::<Position>(), 0);
}

#[test]
fn test_filter_yields_storage_order() {
    // --- 1. SETUP ---
    let mut world = World::new();
    let ids: Vec<_> = (0..4).map(|_| world.spawn()).collect();
    for (i, id) in ids.iter().enumerate() {
        world.insert(*id, Position(i as i32));
    }
    let filter = world.filter::<Position>();

    // --- 2. ACTION ---
    world.remove::<Position>(ids[0]);

    // --- 3. ASSERTIONS ---
    // Swap-removal moved the last entity to the front: storage order is not insertion order.
    assert_eq!(world.matching(&filter), &[ids[3], ids[1], ids[2]]);
}

#[test]
fn test_pool_handle_skips_lookup() {
    let mut world = World::new();
    let pool = world.pool::<Stunned>();
    let entity = world.spawn();

    assert!(!world.has_in(pool, entity));
    world.insert_in(pool, entity, Stunned);
    assert!(world.has_in(pool, entity));
    assert!(world.has::<Stunned>(entity));
    assert_eq!(pool.world(), world.id());
}

#[test]
#[should_panic(expected = "wrong world")]
fn test_pool_handle_from_other_world_panics() {
    let mut a = World::new();
    let b = World::new();
    let pool = a.pool::<Position>();
    let _ = b.storage(pool);
}

#[test]
fn test_entity_handle_resolves_and_goes_stale() {
    // --- 1. SETUP ---
    let world = World::new().into_shared();
    let handle = EntityHandle::spawn(&world);

    // --- 2. ASSERTIONS (alive) ---
    let (resolved, entity) = handle.resolve().expect("handle should resolve");
    assert_eq!(entity, handle.entity());
    assert_eq!(resolved.borrow().id(), handle.world_id());

    // --- 3. ACTION ---
    world.borrow_mut().despawn(handle.entity());
    let recycled = EntityHandle::spawn(&world);

    // --- 4. ASSERTIONS (stale) ---
    assert!(!handle.is_alive());
    assert_eq!(recycled.entity().index, handle.entity().index);
    assert_ne!(recycled, handle, "A recycled slot must not alias the old handle");
}

#[test]
fn test_entity_handle_of_dropped_world_is_stale() {
    let world = World::new().into_shared();
    let handle = EntityHandle::spawn(&world);
    drop(world);

    assert!(handle.world().is_none());
    assert!(handle.resolve().is_none());
}

#[test]
fn test_handles_from_different_worlds_differ() {
    let a = World::new().into_shared();
    let b = World::new().into_shared();
    let ha = EntityHandle::spawn(&a);
    let hb = EntityHandle::spawn(&b);

    // Same slot and generation, different worlds.
    assert_eq!(ha.entity(), hb.entity());
    assert_ne!(ha, hb);
}
