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

//! Stage-based system schedule.
//!
//! Four fixed stages run in order each simulation step; within a stage
//! systems run in registration order. Each stage owns one command buffer
//! that systems record into; the buffer flushes before the next stage
//! starts. A failing system is reported and skipped — a step never aborts
//! mid-flight.

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::system::{BoxedSystem, SystemContext};
use crate::world::World;

/// Execution stage of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreUpdate,
    Update,
    PostUpdate,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::PreUpdate,
        Stage::Update,
        Stage::PostUpdate,
        Stage::Cleanup,
    ];

    fn index(self) -> usize {
        match self {
            Stage::PreUpdate => 0,
            Stage::Update => 1,
            Stage::PostUpdate => 2,
            Stage::Cleanup => 3,
        }
    }
}

/// Systems grouped by stage, run in registration order.
#[derive(Default)]
pub struct Schedule {
    stages: [Vec<BoxedSystem>; 4],
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system(&mut self, stage: Stage, system: BoxedSystem) -> &mut Self {
        self.stages[stage.index()].push(system);
        self
    }

    /// Convenience for closure systems.
    pub fn add_fn<F>(&mut self, stage: Stage, name: impl Into<String>, func: F) -> &mut Self
    where
        F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send + 'static,
    {
        self.add_system(stage, crate::system::system(name, func))
    }

    pub fn system_count(&self) -> usize {
        self.stages.iter().map(|s| s.len()).sum()
    }

    /// Run one stage: every system in order, then the stage's command
    /// buffer.
    pub fn run_stage(&mut self, world: &mut World, stage: Stage, fixed_dt: f64) -> Result<()> {
        let frame = world.frame();
        let mut commands = CommandBuffer::new();
        for system in &mut self.stages[stage.index()] {
            let mut ctx = SystemContext {
                world: &mut *world,
                commands: &mut commands,
                fixed_dt,
                frame,
            };
            if let Err(error) = system.run(&mut ctx) {
                let name = system.name().to_string();
                world.diagnostics_mut().report_error(
                    error,
                    None,
                    None,
                    format!("system '{name}' failed; continuing with next system"),
                );
            }
        }
        if !commands.is_empty() {
            if let Err(error) = commands.flush(world) {
                world.diagnostics_mut().report_error(
                    error,
                    None,
                    None,
                    format!("stage {stage:?} command flush failed"),
                );
            }
        }
        Ok(())
    }

    /// One full simulation step: advance the frame, run every stage in
    /// order, then apply the frame-end event policy.
    pub fn run_step(&mut self, world: &mut World, fixed_dt: f64) -> Result<()> {
        world.begin_frame();
        for stage in Stage::ALL {
            self.run_stage(world, stage, fixed_dt)?;
        }
        world.end_frame();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::system;

    #[derive(Default, Debug, PartialEq)]
    struct RunLog(Vec<&'static str>);

    fn logging_system(label: &'static str) -> BoxedSystem {
        system(label, move |ctx| {
            ctx.world.get_or_create_resource::<RunLog>().0.push(label);
            Ok(())
        })
    }

    #[test]
    fn stages_and_registration_order() {
        let mut world = World::new();
        let mut schedule = Schedule::new();
        schedule.add_system(Stage::Update, logging_system("u1"));
        schedule.add_system(Stage::PreUpdate, logging_system("pre"));
        schedule.add_system(Stage::Update, logging_system("u2"));
        schedule.add_system(Stage::Cleanup, logging_system("clean"));
        schedule.add_system(Stage::PostUpdate, logging_system("post"));

        schedule.run_step(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(
            world.get_resource::<RunLog>().unwrap().0,
            vec!["pre", "u1", "u2", "post", "clean"]
        );
    }

    #[test]
    fn failing_system_does_not_stop_the_stage() {
        let mut world = World::new();
        let mut schedule = Schedule::new();
        schedule.add_fn(Stage::Update, "boom", |_ctx| {
            Err(crate::error::EcsError::ComponentNotFound)
        });
        schedule.add_system(Stage::Update, logging_system("after"));

        schedule.run_step(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(world.get_resource::<RunLog>().unwrap().0, vec!["after"]);
        assert!(!world.diagnostics().is_empty());
    }

    #[test]
    fn stage_commands_flush_before_next_stage() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Marker;

        let mut world = World::new();
        let mut schedule = Schedule::new();
        schedule.add_fn(Stage::Update, "spawner", |ctx| {
            let e = ctx.commands.create(ctx.world.entities(), true);
            ctx.commands.add(e, Marker);
            Ok(())
        });
        // PostUpdate sees the flushed entity.
        schedule.add_fn(Stage::PostUpdate, "checker", |ctx| {
            let mut q = crate::query::Query::new().require::<Marker>();
            assert_eq!(q.count(ctx.world), 1);
            Ok(())
        });

        schedule.run_step(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(world.alive_count(), 1);
    }

    #[test]
    fn frame_advances_once_per_step() {
        let mut world = World::new();
        let start = world.frame();
        let mut schedule = Schedule::new();
        schedule.run_step(&mut world, 1.0 / 60.0).unwrap();
        schedule.run_step(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(world.frame(), start + 2);
    }
}
