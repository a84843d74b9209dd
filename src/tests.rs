//! Cross-module smoke tests. The heavier property and scenario suites live
//! under `tests/`.

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health {
    cur: i32,
    max: i32,
}

struct Dead;

#[test]
fn move_and_damage_loop() {
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_fn(Stage::Update, "movement", |ctx| {
        let dt = ctx.fixed_dt as f32;
        let mut q = Query::new().require::<Position>().require::<Velocity>();
        q.for_each(ctx.world, |_, row| {
            let vel = *row.get::<Velocity>().unwrap();
            let pos = row.get_mut::<Position>().unwrap();
            pos.x += vel.dx * dt;
            pos.y += vel.dy * dt;
        })
    });

    let e1 = world.create_entity(true);
    world.add_component(e1, Position { x: 10.0, y: 20.0 }).unwrap();
    world.add_component(e1, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
    let e2 = world.create_entity(true);
    world.add_component(e2, Position { x: 30.0, y: 40.0 }).unwrap();
    world.add_component(e2, Health { cur: 80, max: 100 }).unwrap();
    let e3 = world.create_entity(true);
    world.add_component(e3, Velocity { dx: 0.0, dy: 1.0 }).unwrap();
    world.add_component(e3, Dead).unwrap();

    schedule.run_step(&mut world, 1.0 / 60.0).unwrap();

    let mut moving = Query::new().require::<Position>().require::<Velocity>();
    assert_eq!(moving.entities(&mut world), vec![e1]);
    assert!(world.get_component::<Position>(e1).unwrap().x > 10.0);

    let mut living = Query::new().require::<Position>().without::<Dead>();
    assert_eq!(living.count(&mut world), 2);
}

#[test]
fn command_buffer_inside_iteration() {
    let mut world = World::new();
    for i in 0..4 {
        let e = world.create_entity(true);
        world
            .add_component(e, Health { cur: i * 10, max: 100 })
            .unwrap();
    }

    // Kill everything below 20 health, recording destroys mid-iteration.
    let mut cmd = CommandBuffer::new();
    let mut q = Query::new().require::<Health>();
    q.for_each(&mut world, |entity, row| {
        if row.get::<Health>().unwrap().cur < 20 {
            cmd.destroy(entity);
        }
    })
    .unwrap();
    cmd.flush(&mut world).unwrap();

    assert_eq!(world.alive_count(), 2);
}

#[test]
fn changed_filter_sees_only_this_frames_writes() {
    let mut world = World::new();
    let touched = world.create_entity(true);
    let untouched = world.create_entity(true);
    for e in [touched, untouched] {
        world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
    }

    // A new frame clears the spawn-time writes.
    world.begin_frame();
    world.get_component_mut::<Position>(touched).unwrap().x = 1.0;

    let mut q = Query::new().require::<Position>().changed::<Position>();
    assert_eq!(q.entities(&mut world), vec![touched]);

    world.begin_frame();
    assert_eq!(q.count(&mut world), 0);

    world.mark_changed::<Position>(untouched);
    assert_eq!(q.entities(&mut world), vec![untouched]);
}

#[test]
fn optional_components_via_row_access() {
    let mut world = World::new();
    let with_health = world.create_entity(true);
    world
        .add_component(with_health, Position { x: 0.0, y: 0.0 })
        .unwrap();
    world
        .add_component(with_health, Health { cur: 5, max: 10 })
        .unwrap();
    let without_health = world.create_entity(true);
    world
        .add_component(without_health, Position { x: 0.0, y: 0.0 })
        .unwrap();

    let mut seen = Vec::new();
    let mut q = Query::new().require::<Position>().optional::<Health>();
    q.for_each(&mut world, |entity, row| {
        seen.push((entity, row.get::<Health>().copied()));
    })
    .unwrap();

    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&(with_health, Some(Health { cur: 5, max: 10 }))));
    assert!(seen.contains(&(without_health, None)));
}

#[test]
fn full_frame_through_the_driver() {
    let mut world = World::new();
    let mut schedule = Schedule::new();
    HierarchySync::install(&mut world, &mut schedule);
    schedule.add_fn(Stage::Update, "drift", |ctx| {
        let mut q = Query::new().require::<Position>();
        q.for_each(ctx.world, |_, row| {
            row.get_mut::<Position>().unwrap().x += 1.0;
        })
    });

    let e = world.create_entity(true);
    world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();

    let mut ts = FixedTimestep::new().with_smooth_factor(0.0);
    ts.tick(&mut world, &mut schedule, 3.0 / 60.0).unwrap();

    assert_eq!(world.get_component::<Position>(e).unwrap().x, 3.0);
    world.verify().unwrap();
}
