// Copyright 2025 NovaECS Developers
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

//! Fixed-timestep scheduler driver.
//!
//! Each render tick feeds a real frame delta in; the driver clamps it,
//! smooths it, scales it, and runs whole fixed sub-steps out of the
//! accumulator — at most `max_substeps` per tick, with the residual capped
//! so a long stall cannot spiral. The leftover fraction of a step comes
//! back as the interpolation alpha.

use crate::error::Result;
use crate::schedule::Schedule;
use crate::world::World;

/// Fixed-timestep accumulator with smoothing and spiral prevention.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    fixed_dt: f64,
    max_substeps: u32,
    clamp_dt: f64,
    smooth_factor: f64,
    timescale: f64,
    accumulator: f64,
    smoothed_dt: f64,
    alpha: f64,
}

impl FixedTimestep {
    pub fn new() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_substeps: 5,
            clamp_dt: 0.25,
            smooth_factor: 0.1,
            timescale: 1.0,
            accumulator: 0.0,
            smoothed_dt: 0.0,
            alpha: 0.0,
        }
    }

    pub fn with_fixed_dt(mut self, fixed_dt: f64) -> Self {
        self.set_fixed_dt(fixed_dt);
        self
    }

    /// Exponential smoothing factor in `[0, 1]`. Zero disables smoothing
    /// (the clamped delta is used as-is); one follows the raw delta
    /// instantly.
    pub fn with_smooth_factor(mut self, factor: f64) -> Self {
        self.smooth_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps.max(1);
        self
    }

    pub fn with_clamp_dt(mut self, clamp_dt: f64) -> Self {
        self.clamp_dt = clamp_dt.max(0.0);
        self
    }

    pub fn set_fixed_dt(&mut self, fixed_dt: f64) {
        self.fixed_dt = fixed_dt.max(f64::EPSILON);
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Zero pauses the simulation; the accumulator stops growing.
    pub fn set_timescale(&mut self, timescale: f64) {
        self.timescale = timescale.max(0.0);
    }

    pub fn timescale(&self) -> f64 {
        self.timescale
    }

    /// Interpolation alpha of the last tick, in `[0, 1]`.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Zero the accumulator (e.g. after a scene load).
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Advance by one render frame. Runs up to `max_substeps` fixed steps
    /// of the schedule and returns how many ran.
    pub fn tick(
        &mut self,
        world: &mut World,
        schedule: &mut Schedule,
        frame_dt: f64,
    ) -> Result<u32> {
        self.tick_inner(world, schedule, frame_dt, None::<&mut fn(f64)>)
    }

    /// Like [`FixedTimestep::tick`], invoking `render` with the
    /// interpolation alpha afterwards.
    pub fn tick_with_render<F>(
        &mut self,
        world: &mut World,
        schedule: &mut Schedule,
        frame_dt: f64,
        render: &mut F,
    ) -> Result<u32>
    where
        F: FnMut(f64),
    {
        self.tick_inner(world, schedule, frame_dt, Some(render))
    }

    fn tick_inner<F>(
        &mut self,
        world: &mut World,
        schedule: &mut Schedule,
        frame_dt: f64,
        render: Option<&mut F>,
    ) -> Result<u32>
    where
        F: FnMut(f64),
    {
        let clamped = frame_dt.max(0.0).min(self.clamp_dt);
        if self.smooth_factor > 0.0 {
            self.smoothed_dt += (clamped - self.smoothed_dt) * self.smooth_factor;
        } else {
            self.smoothed_dt = clamped;
        }
        self.accumulator += self.smoothed_dt * self.timescale;

        let mut steps = 0;
        while self.accumulator >= self.fixed_dt && steps < self.max_substeps {
            schedule.run_step(world, self.fixed_dt)?;
            self.accumulator -= self.fixed_dt;
            steps += 1;
        }

        // Residual kept, but bounded so recovery after a stall stays finite.
        let cap = self.fixed_dt * f64::from(self.max_substeps);
        if self.accumulator > cap {
            self.accumulator = cap;
        }
        self.alpha = (self.accumulator / self.fixed_dt).clamp(0.0, 1.0);

        if let Some(render) = render {
            render(self.alpha);
        }
        Ok(steps)
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Stage;

    #[derive(Default)]
    struct StepCount(u32);

    fn counting_schedule() -> Schedule {
        let mut schedule = Schedule::new();
        schedule.add_fn(Stage::Update, "count", |ctx| {
            ctx.world.get_or_create_resource::<StepCount>().0 += 1;
            Ok(())
        });
        schedule
    }

    fn steps_of(world: &World) -> u32 {
        world.get_resource::<StepCount>().map(|s| s.0).unwrap_or(0)
    }

    #[test]
    fn accumulates_whole_steps() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

        // Exactly two steps' worth of time.
        let ran = ts.tick(&mut world, &mut schedule, 2.0 / 60.0).unwrap();
        assert_eq!(ran, 2);
        assert_eq!(steps_of(&world), 2);
        assert!(ts.accumulator() < ts.fixed_dt());
    }

    #[test]
    fn spiral_prevention_caps_substeps_and_residual() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

        let ran = ts.tick(&mut world, &mut schedule, 2.0).unwrap();
        assert!(ran <= 5);
        assert!(ts.accumulator() <= 5.0 / 60.0 + 1e-9);
    }

    #[test]
    fn timescale_zero_pauses() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);
        ts.set_timescale(0.0);

        for _ in 0..10 {
            let ran = ts.tick(&mut world, &mut schedule, 1.0 / 30.0).unwrap();
            assert_eq!(ran, 0);
        }
        assert_eq!(steps_of(&world), 0);
        assert_eq!(ts.accumulator(), 0.0);
    }

    #[test]
    fn alpha_is_leftover_fraction() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);

        // Half a step: no sub-step runs, alpha is one half.
        let mut alpha_seen = None;
        ts.tick_with_render(&mut world, &mut schedule, 0.5 / 60.0, &mut |a| {
            alpha_seen = Some(a)
        })
        .unwrap();
        let alpha = alpha_seen.unwrap();
        assert!((alpha - 0.5).abs() < 1e-9);
        assert_eq!(ts.alpha(), alpha);
    }

    #[test]
    fn reset_zeros_the_accumulator() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.0);
        ts.tick(&mut world, &mut schedule, 0.5 / 60.0).unwrap();
        assert!(ts.accumulator() > 0.0);
        ts.reset();
        assert_eq!(ts.accumulator(), 0.0);
    }

    #[test]
    fn smoothing_ramps_toward_the_clamped_delta() {
        let mut world = World::new();
        let mut schedule = counting_schedule();
        let mut ts = FixedTimestep::new().with_smooth_factor(0.1);

        // First tick only takes 10% of the delta into the accumulator.
        ts.tick(&mut world, &mut schedule, 1.0 / 60.0).unwrap();
        assert!(ts.accumulator() < 1.0 / 60.0);
    }
}
