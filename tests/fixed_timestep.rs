//! Fixed-timestep driver: spiral prevention and replay determinism.

use nova_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Body {
    x: f64,
    v: f64,
}

fn physics_schedule() -> Schedule {
    let mut schedule = Schedule::new();
    schedule.add_fn(Stage::Update, "integrate", |ctx| {
        let dt = ctx.fixed_dt;
        let mut q = Query::new().require::<Body>();
        q.for_each(ctx.world, |_, row| {
            let body = row.get_mut::<Body>().unwrap();
            body.v += 9.81 * dt;
            body.x += body.v * dt;
        })
    });
    schedule
}

fn seeded_world() -> World {
    let mut world = World::new();
    world.register_serde::<Body>();
    for i in 0..16 {
        let e = world.create_entity(true);
        world
            .add_component(e, Body { x: i as f64, v: 0.0 })
            .unwrap();
    }
    world
}

#[test]
fn spiral_prevention_scenario() {
    let mut world = seeded_world();
    let mut schedule = physics_schedule();
    let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

    // A two-second stall: clamped to 0.25s, at most five sub-steps run, and
    // the residual accumulator is bounded.
    let steps = ts.tick(&mut world, &mut schedule, 2.0).unwrap();
    assert_eq!(steps, 5);
    assert!(ts.accumulator() <= 5.0 / 60.0 + 1e-12);
}

#[test]
fn substep_counts_are_a_function_of_the_delta_sequence() {
    let deltas = [0.016, 0.02, 0.031, 0.009, 0.25, 0.016, 0.051, 0.012];

    let run = || {
        let mut world = seeded_world();
        let mut schedule = physics_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);
        deltas
            .iter()
            .map(|&dt| ts.tick(&mut world, &mut schedule, dt).unwrap())
            .collect::<Vec<u32>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn frame_hashes_match_across_replays() {
    let deltas = [0.016, 0.033, 0.016, 0.12, 0.008, 0.016];

    let run = || {
        let mut world = seeded_world();
        let mut schedule = physics_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);
        let mut hashes = Vec::new();
        for &dt in &deltas {
            ts.tick(&mut world, &mut schedule, dt).unwrap();
            hashes.push(world.frame_hash());
        }
        hashes
    };
    assert_eq!(run(), run());
}

#[test]
fn alpha_feeds_the_render_callback() {
    let mut world = seeded_world();
    let mut schedule = physics_schedule();
    let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

    let mut alphas = Vec::new();
    for _ in 0..4 {
        ts.tick_with_render(&mut world, &mut schedule, 0.75 / 60.0, &mut |a| {
            alphas.push(a)
        })
        .unwrap();
    }
    assert_eq!(alphas.len(), 4);
    for &alpha in &alphas {
        assert!((0.0..=1.0).contains(&alpha));
    }
    // 0.75 steps per tick: first tick banks 0.75, second crosses 1.0.
    assert!((alphas[0] - 0.75).abs() < 1e-9);
    assert!((alphas[1] - 0.5).abs() < 1e-9);
}

#[test]
fn pause_and_resume_via_timescale() {
    let mut world = seeded_world();
    let mut schedule = physics_schedule();
    let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

    ts.set_timescale(0.0);
    for _ in 0..5 {
        assert_eq!(ts.tick(&mut world, &mut schedule, 0.016).unwrap(), 0);
    }
    let frozen = world.frame_hash();

    ts.set_timescale(1.0);
    ts.tick(&mut world, &mut schedule, 2.0 / 60.0).unwrap();
    assert_ne!(world.frame_hash(), frozen);
}
