//! Delta subscriptions: dedup, drains, and overflow behavior.

use nova_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct P {
    x: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Unrelated(u32);

#[test]
fn delta_accumulates_adds_removes_changes() {
    let mut world = World::new();
    let q = Query::new().require::<P>().enable_delta(&mut world);

    let a = world.create_entity(true);
    let b = world.create_entity(true);
    world.add_component(a, P { x: 0.0 }).unwrap();
    world.add_component(b, P { x: 0.0 }).unwrap();
    world.get_component_mut::<P>(a).unwrap().x = 1.0;
    world.remove_component::<P>(b).unwrap();

    let delta = q.consume_delta();
    assert!(!delta.overflowed);
    let mut added = delta.added.clone();
    added.sort_unstable();
    assert_eq!(added, {
        let mut v = vec![a, b];
        v.sort_unstable();
        v
    });
    assert_eq!(delta.changed, vec![a]);
    assert_eq!(delta.removed, vec![b]);

    // Drained: a second consume is empty.
    let empty = q.consume_delta();
    assert!(empty.added.is_empty() && empty.removed.is_empty() && empty.changed.is_empty());
}

#[test]
fn irrelevant_types_do_not_feed_the_delta() {
    let mut world = World::new();
    let q = Query::new().require::<P>().enable_delta(&mut world);

    let e = world.create_entity(true);
    world.add_component(e, Unrelated(1)).unwrap();
    world.get_component_mut::<Unrelated>(e).unwrap().0 = 2;

    let delta = q.consume_delta();
    assert!(delta.added.is_empty());
    assert!(delta.changed.is_empty());
}

#[test]
fn overflow_clears_sets_and_raises_flag() {
    let mut world = World::new();
    let q = Query::new().require::<P>().enable_delta(&mut world);

    // Blow past the combined default cap in one frame.
    for _ in 0..12_000 {
        let e = world.create_entity(true);
        world.add_component(e, P { x: 0.0 }).unwrap();
    }

    let delta = q.consume_delta();
    assert!(delta.overflowed);
    assert!(delta.added.is_empty());
    assert!(delta.removed.is_empty());
    assert!(delta.changed.is_empty());

    // After the overflow consume, accumulation resumes.
    let e = world.create_entity(true);
    world.add_component(e, P { x: 0.0 }).unwrap();
    let delta = q.consume_delta();
    assert!(!delta.overflowed);
    assert_eq!(delta.added, vec![e]);
}

#[test]
fn custom_capacity_is_respected() {
    let mut world = World::new();
    let q = Query::new()
        .require::<P>()
        .delta_capacity(8)
        .enable_delta(&mut world);

    for _ in 0..9 {
        let e = world.create_entity(true);
        world.add_component(e, P { x: 0.0 }).unwrap();
    }
    assert!(q.consume_delta().overflowed);
}

#[test]
fn queries_without_delta_return_empty_feeds() {
    let mut world = World::new();
    let q = Query::new().require::<P>();
    let e = world.create_entity(true);
    world.add_component(e, P { x: 0.0 }).unwrap();
    let delta = q.consume_delta();
    assert!(!delta.overflowed);
    assert!(delta.added.is_empty());
}
