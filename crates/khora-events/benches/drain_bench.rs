use criterion::{criterion_group, criterion_main, Criterion};
use khora_events::{Component, Entity, EntityHandle, Event, EventBus, Flag, Global, World};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default)]
struct Damage(u32);
impl Component for Damage {}
impl Event for Damage {
    type Category = Global;
}

#[derive(Debug, Clone, Copy, Default)]
struct Hit(u32);
impl Component for Hit {}
impl Event for Hit {
    type Category = Entity;
}

#[derive(Debug, Default)]
struct Dirty;
impl Component for Dirty {}
impl Event for Dirty {
    type Category = Flag;
}

fn bench_drains(c: &mut Criterion) {
    let bus = EventBus::new();
    let world = World::new().into_shared();
    let targets: Vec<_> = (0..1_000).map(|_| EntityHandle::spawn(&world)).collect();

    let total = Rc::new(Cell::new(0u64));
    let mut subs = Vec::new();
    let sink = total.clone();
    subs.push(
        bus.globals()
            .subscribe(move |event: &mut Damage| sink.set(sink.get() + event.0 as u64))
            .unwrap(),
    );
    for target in &targets {
        let sink = total.clone();
        subs.push(
            bus.entity_events()
                .subscribe(target, move |_, hit: &mut Hit| sink.set(sink.get() + hit.0 as u64))
                .unwrap(),
        );
        let sink = total.clone();
        subs.push(
            bus.flags()
                .subscribe::<Dirty>(target, move |_| sink.set(sink.get() + 1))
                .unwrap(),
        );
    }

    let mut group = c.benchmark_group("Event Drains");

    group.bench_function("Global (10k raises)", |b| {
        b.iter(|| {
            for i in 0..10_000 {
                bus.globals().add(Damage(i)).unwrap();
            }
            bus.drain_all().unwrap();
            black_box(total.get());
        });
    });

    group.bench_function("Entity-scoped (10 per target)", |b| {
        b.iter(|| {
            for (i, target) in targets.iter().cycle().take(10_000).enumerate() {
                bus.entity_events().add(target, Hit(i as u32)).unwrap();
            }
            bus.drain_all().unwrap();
            black_box(total.get());
        });
    });

    group.bench_function("Flags (raw add)", |b| {
        b.iter(|| {
            {
                let mut world = world.borrow_mut();
                let pool = world.pool::<Dirty>();
                for target in &targets {
                    bus.flags().add_raw(&mut world, pool, target.entity());
                }
            }
            bus.drain_all().unwrap();
            black_box(total.get());
        });
    });

    group.finish();
    drop(subs);
}

criterion_group!(benches, bench_drains);
criterion_main!(benches);
