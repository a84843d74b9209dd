//! System trait and execution context.

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::world::World;

/// Context handed to every system invocation.
///
/// Structural changes made from a system go through `commands`; the
/// scheduler flushes the buffer at the end of the system's stage.
pub struct SystemContext<'a> {
    pub world: &'a mut World,
    pub commands: &'a mut CommandBuffer,
    /// Fixed simulation timestep of the current sub-step, in seconds.
    pub fixed_dt: f64,
    /// Frame being simulated.
    pub frame: u32,
}

/// A unit of simulation logic.
pub trait System: Send {
    fn name(&self) -> &str;

    fn run(&mut self, ctx: &mut SystemContext<'_>) -> Result<()>;
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

struct FnSystem<F> {
    name: String,
    func: F,
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        (self.func)(ctx)
    }
}

/// Wrap a closure as a named system.
pub fn system<F>(name: impl Into<String>, func: F) -> BoxedSystem
where
    F: FnMut(&mut SystemContext<'_>) -> Result<()> + Send + 'static,
{
    Box::new(FnSystem {
        name: name.into(),
        func,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_systems_carry_their_name() {
        let mut sys = system("noop", |_ctx| Ok(()));
        assert_eq!(sys.name(), "noop");

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext {
            world: &mut world,
            commands: &mut commands,
            fixed_dt: 1.0 / 60.0,
            frame: 1,
        };
        assert!(sys.run(&mut ctx).is_ok());
    }
}
