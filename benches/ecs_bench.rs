use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nova_ecs::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Velocity {
    dx: f32,
    dy: f32,
}

fn populated_world(n: usize) -> World {
    let mut world = World::new();
    for i in 0..n {
        let e = world.create_entity(true);
        world
            .add_component(e, Position { x: i as f32, y: 0.0 })
            .unwrap();
        if i % 2 == 0 {
            world
                .add_component(e, Velocity { dx: 1.0, dy: 1.0 })
                .unwrap();
        }
    }
    world
}

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("create_with_two_components_10k", |b| {
        b.iter(|| black_box(populated_world(10_000)))
    });

    c.bench_function("prefab_batch_spawn_10k", |b| {
        b.iter(|| {
            let mut world = World::new();
            world
                .define_prefab(
                    "unit",
                    PrefabSpec::new()
                        .comp(Position { x: 0.0, y: 0.0 })
                        .comp(Velocity { dx: 1.0, dy: 0.0 }),
                )
                .unwrap();
            world
                .spawn_prefab("unit", SpawnOptions::new().count(10_000).seed(1))
                .unwrap();
            black_box(world)
        })
    });
}

fn bench_query(c: &mut Criterion) {
    let mut world = populated_world(10_000);
    let mut query = Query::new().require::<Position>().require::<Velocity>();

    c.bench_function("query_iterate_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            query
                .for_each(&mut world, |_, row| {
                    sum += row.get::<Position>().unwrap().x;
                })
                .unwrap();
            black_box(sum)
        })
    });

    c.bench_function("query_chunks_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for chunk in query.chunks(&world, 1024) {
                for pos in chunk.column::<Position>().unwrap() {
                    sum += pos.x;
                }
            }
            black_box(sum)
        })
    });
}

fn bench_command_flush(c: &mut Criterion) {
    c.bench_function("command_flush_1k_adds", |b| {
        b.iter(|| {
            let mut world = populated_world(1_000);
            let mut cmd = CommandBuffer::new();
            let mut q = Query::new().require::<Position>();
            q.for_each(&mut world, |entity, _| {
                cmd.add(entity, Velocity { dx: 2.0, dy: 2.0 });
            })
            .unwrap();
            cmd.flush(&mut world).unwrap();
            black_box(world)
        })
    });
}

criterion_group!(benches, bench_spawn, bench_query, bench_command_flush);
criterion_main!(benches);
