//! Hierarchy reconciliation system.
//!
//! Runs in `PreUpdate`: drains Removed(Parent) events first (unlinking),
//! then Added(Parent) events (validating and linking), then scans for
//! parents that died and applies the configured [`HierarchyPolicy`] through
//! the stage's command buffer.

use crate::component;
use crate::entity::Entity;
use crate::error::Result;
use crate::hierarchy::{ChildrenIndex, HierarchyPolicy, Parent};
use crate::schedule::{Schedule, Stage};
use crate::system::{System, SystemContext};
use crate::world::World;

/// The `PreUpdate` system keeping [`ChildrenIndex`] in sync with `Parent`
/// components.
pub struct HierarchySync;

impl HierarchySync {
    /// Ensure the index and policy resources exist, subscribe to `Parent`
    /// events, and register the system in `PreUpdate`.
    pub fn install(world: &mut World, schedule: &mut Schedule) {
        let parent_type = component::type_id::<Parent>();
        world.get_or_create_resource::<ChildrenIndex>();
        world.get_or_create_resource::<HierarchyPolicy>();
        world.added_channel_mut().retain_type(parent_type);
        world.removed_channel_mut().retain_type(parent_type);
        schedule.add_system(Stage::PreUpdate, Box::new(HierarchySync));
    }
}

impl System for HierarchySync {
    fn name(&self) -> &str {
        "hierarchy_sync"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let parent_type = component::type_id::<Parent>();
        let world = &mut *ctx.world;

        // The index leaves the resource map for the duration so we can keep
        // using the world alongside it.
        let mut index = world
            .remove_resource::<ChildrenIndex>()
            .unwrap_or_default();

        // Unlink before linking, so a remove+add in one frame resolves to
        // the add.
        for event in world.removed_channel_mut().take_matching(parent_type) {
            index.unlink(event.entity);
        }

        for event in world.added_channel_mut().take_matching(parent_type) {
            let child = event.entity;
            if !world.is_alive(child) {
                continue;
            }
            let Some(&Parent(requested)) = world.get_component::<Parent>(child) else {
                continue;
            };
            let parent = if requested.is_null() || !world.is_alive(requested) {
                Entity::NULL
            } else {
                requested
            };
            if let Err(error) = index.link(child, parent) {
                world.diagnostics_mut().report_error(
                    error,
                    Some(child),
                    Some(parent_type),
                    "hierarchy link rejected; child rebound to root",
                );
                let _ = index.link(child, Entity::NULL);
            }
        }

        // Parents that died without events (e.g. direct destroys earlier
        // this frame) get the configured policy.
        let policy = world
            .get_resource::<HierarchyPolicy>()
            .copied()
            .unwrap_or_default();
        let dead_parents: Vec<Entity> = index
            .parents()
            .filter(|&parent| !world.is_alive(parent))
            .collect();
        for parent in dead_parents {
            for child in index.take_children_of(parent) {
                match policy {
                    HierarchyPolicy::DetachToRoot => {
                        ctx.commands.add(child, Parent(Entity::NULL));
                    }
                    HierarchyPolicy::DestroyChildren => {
                        ctx.commands.destroy(child);
                    }
                }
            }
        }

        world.set_resource(index);
        Ok(())
    }
}
