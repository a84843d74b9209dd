//! Deferred-operation semantics: dedup rules, phase ordering, failure
//! isolation.

use nova_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct P {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct V {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct T1(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct T2(u32);

#[test]
fn cancellation_scenario() {
    let mut world = World::new();
    let e = world.create_entity(true);

    let mut cmd = CommandBuffer::new();
    cmd.add(e, P { x: 1.0, y: 1.0 });
    cmd.remove::<P>(e);
    cmd.add(e, V { dx: 2.0, dy: 2.0 });
    cmd.flush(&mut world).unwrap();

    assert!(!world.has_component::<P>(e));
    assert!(world.has_component::<V>(e));
    assert_eq!(world.get_component::<V>(e), Some(&V { dx: 2.0, dy: 2.0 }));
}

#[test]
fn destroy_wins_over_all_recorded_ops() {
    let mut world = World::new();
    let e = world.create_entity(true);

    let mut cmd = CommandBuffer::new();
    cmd.add(e, T1(1));
    cmd.remove::<T1>(e);
    cmd.add(e, T2(2));
    cmd.destroy(e);
    cmd.flush(&mut world).unwrap();

    assert!(!world.is_alive(e));
    // No side effects leaked into storage.
    let mut q1 = Query::new().require::<T1>();
    let mut q2 = Query::new().require::<T2>();
    assert_eq!(q1.count(&mut world), 0);
    assert_eq!(q2.count(&mut world), 0);
    world.verify().unwrap();
}

#[test]
fn removes_apply_before_adds() {
    let mut world = World::new();
    let e = world.create_entity(true);
    world.add_component(e, P { x: 0.0, y: 0.0 }).unwrap();

    // Recorded add-then-remove across two types: remove phase runs first,
    // so removing P and re-adding it in one buffer leaves the new value.
    let mut cmd = CommandBuffer::new();
    cmd.remove::<P>(e);
    cmd.add(e, P { x: 9.0, y: 9.0 });
    cmd.flush(&mut world).unwrap();

    assert_eq!(world.get_component::<P>(e), Some(&P { x: 9.0, y: 9.0 }));
}

#[test]
fn destroy_is_idempotent_across_buffers() {
    let mut world = World::new();
    let e = world.create_entity(true);

    let mut cmd = CommandBuffer::new();
    cmd.destroy(e);
    cmd.destroy(e);
    cmd.flush(&mut world).unwrap();
    assert!(!world.is_alive(e));

    // A second buffer destroying the same stale handle is a quiet no-op.
    let mut cmd = CommandBuffer::new();
    cmd.destroy(e);
    cmd.flush(&mut world).unwrap();
    assert!(!world.is_alive(e));
}

#[test]
fn spawn_phase_runs_before_component_phases() {
    use serde::{Deserialize, Serialize};
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    struct Seeded(u32);

    let mut world = World::new();
    world
        .define_prefab("thing", PrefabSpec::new().comp(Seeded(7)))
        .unwrap();

    let mut cmd = CommandBuffer::new();
    cmd.spawn("thing", SpawnOptions::new().count(2).seed(1));
    cmd.flush(&mut world).unwrap();

    let mut q = Query::new().require::<Seeded>();
    assert_eq!(q.count(&mut world), 2);
}

#[test]
fn deferred_create_can_be_referenced_before_flush() {
    let mut world = World::new();
    let mut cmd = CommandBuffer::new();

    let parent = cmd.create(world.entities(), true);
    let child = cmd.create(world.entities(), true);
    assert_ne!(parent, child);
    cmd.add(child, Parent(parent));
    cmd.flush(&mut world).unwrap();

    assert!(world.is_alive(parent));
    assert!(world.is_alive(child));
    assert_eq!(world.get_component::<Parent>(child), Some(&Parent(parent)));
}

#[test]
fn failures_are_isolated_per_entity() {
    let mut world = World::new();
    let stale = world.create_entity(true);
    world.destroy_entity(stale).unwrap();
    let live_a = world.create_entity(true);
    let live_b = world.create_entity(true);

    let mut cmd = CommandBuffer::new();
    cmd.add(live_a, T1(1));
    cmd.add(stale, T1(2));
    cmd.remove::<T2>(live_b); // never present: logged, skipped
    cmd.flush(&mut world).unwrap();

    assert_eq!(world.get_component::<T1>(live_a), Some(&T1(1)));
    assert!(!world.has_component::<T2>(live_b));
    // One skip for the stale add, one for the missing remove.
    assert!(world.diagnostics().entries().len() >= 2);
}
