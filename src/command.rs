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

//! Deferred structural mutation.
//!
//! A command buffer records operations against one world and applies them
//! at flush time, in five phases: prefab spawns, removes, adds, enable
//! flips, destroys. Per entity the buffer keeps one accumulator with
//! last-write-wins dedup: `add` cancels a pending `remove` of the same type
//! and vice versa, and `destroy` supersedes everything else recorded for
//! that entity.
//!
//! Per-entity failures during flush (stale handles, missing components) are
//! reported to diagnostics and skipped; the flush never aborts part-way.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::column::BoxedValue;
use crate::component::{self, Component, ComponentTypeId};
use crate::entity::{Entity, EntityManager};
use crate::error::{EcsError, Result};
use crate::prefab::SpawnOptions;
use crate::world::World;

#[derive(Default)]
struct EntityOps {
    /// Deferred create with its enabled flag.
    create: Option<bool>,
    destroy: bool,
    enable: Option<bool>,
    adds: Vec<(ComponentTypeId, BoxedValue)>,
    removes: SmallVec<[ComponentTypeId; 4]>,
}

/// Buffer of deferred operations against one world.
#[derive(Default)]
pub struct CommandBuffer {
    order: Vec<Entity>,
    ops: AHashMap<Entity, EntityOps>,
    spawns: Vec<(String, SpawnOptions)>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn ops_mut(&mut self, entity: Entity) -> &mut EntityOps {
        if !self.ops.contains_key(&entity) {
            self.order.push(entity);
        }
        self.ops.entry(entity).or_default()
    }

    /// Allocate a real entity handle immediately so it can be referenced
    /// within the buffer; activation happens at flush.
    pub fn create(&mut self, entities: &EntityManager, enabled: bool) -> Entity {
        let entity = entities.reserve();
        self.ops_mut(entity).create = Some(enabled);
        entity
    }

    /// Queue destruction. Supersedes every other pending op on `entity`.
    pub fn destroy(&mut self, entity: Entity) {
        let ops = self.ops_mut(entity);
        ops.destroy = true;
        ops.enable = None;
        ops.adds.clear();
        ops.removes.clear();
    }

    /// Queue an enabled-flag flip. Last write wins.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) {
        let ops = self.ops_mut(entity);
        if ops.destroy {
            return;
        }
        ops.enable = Some(enabled);
    }

    /// Queue a component add. Cancels a pending remove of the same type;
    /// recording the same type twice keeps the last value.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) {
        self.add_dyn(entity, component::type_id::<T>(), Box::new(value));
    }

    pub fn add_dyn(&mut self, entity: Entity, type_id: ComponentTypeId, value: BoxedValue) {
        let ops = self.ops_mut(entity);
        if ops.destroy {
            return;
        }
        ops.removes.retain(|t| *t != type_id);
        if let Some(slot) = ops.adds.iter_mut().find(|(t, _)| *t == type_id) {
            slot.1 = value;
        } else {
            ops.adds.push((type_id, value));
        }
    }

    /// Queue a component removal. Cancels a pending add of the same type.
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        self.remove_id(entity, component::type_id::<T>());
    }

    pub fn remove_id(&mut self, entity: Entity, type_id: ComponentTypeId) {
        let ops = self.ops_mut(entity);
        if ops.destroy {
            return;
        }
        ops.adds.retain(|(t, _)| *t != type_id);
        if !ops.removes.contains(&type_id) {
            ops.removes.push(type_id);
        }
    }

    /// Queue a prefab batch spawn.
    pub fn spawn(&mut self, prefab: impl Into<String>, options: SpawnOptions) {
        self.spawns.push((prefab.into(), options));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.spawns.is_empty()
    }

    /// Number of entities with pending ops plus pending spawns.
    pub fn len(&self) -> usize {
        self.ops.len() + self.spawns.len()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.ops.clear();
        self.spawns.clear();
    }

    /// Apply everything to the world and clear the buffer.
    ///
    /// Forbidden while a query iteration is in progress. Individual failures
    /// are reported to the world's diagnostics and skipped.
    pub fn flush(&mut self, world: &mut World) -> Result<()> {
        // On rejection the buffer stays intact so the caller can retry
        // after the iteration unwinds.
        world.guard_structural()?;

        let order = std::mem::take(&mut self.order);
        let mut ops = std::mem::take(&mut self.ops);
        let spawns = std::mem::take(&mut self.spawns);

        // Deferred creates activate first so later phases can target them.
        for entity in &order {
            if let Some(enabled) = ops.get(entity).and_then(|o| o.create) {
                if !world.activate_reserved(*entity, enabled) {
                    world.diagnostics_mut().report_error(
                        EcsError::InvalidHandle(*entity),
                        Some(*entity),
                        None,
                        "deferred create skipped: reservation went stale",
                    );
                }
            }
        }

        // Phase 1: prefab spawns.
        for (prefab, options) in spawns {
            if let Err(error) = world.spawn_prefab(&prefab, options) {
                world.diagnostics_mut().report_error(
                    error,
                    None,
                    None,
                    format!("deferred spawn of '{prefab}' skipped"),
                );
            }
        }

        // Phase 2: removes.
        for entity in &order {
            let Some(entry) = ops.get_mut(entity) else { continue };
            for type_id in entry.removes.drain(..) {
                if let Err(error) = world.remove_component_dyn(*entity, type_id) {
                    world.diagnostics_mut().report_error(
                        error,
                        Some(*entity),
                        Some(type_id),
                        "deferred remove skipped",
                    );
                }
            }
        }

        // Phase 3: adds.
        for entity in &order {
            let Some(entry) = ops.get_mut(entity) else { continue };
            for (type_id, value) in entry.adds.drain(..) {
                if let Err(error) = world.add_component_dyn(*entity, type_id, value) {
                    world.diagnostics_mut().report_error(
                        error,
                        Some(*entity),
                        Some(type_id),
                        "deferred add skipped",
                    );
                }
            }
        }

        // Phase 4: enabled flips.
        for entity in &order {
            if let Some(enabled) = ops.get(entity).and_then(|o| o.enable) {
                if !world.set_enabled(*entity, enabled) {
                    tracing::debug!(entity = %entity, "deferred set_enabled on dead entity");
                }
            }
        }

        // Phase 5: destroys. Idempotent on already-dead entities.
        for entity in &order {
            if ops.get(entity).is_some_and(|o| o.destroy) {
                match world.destroy_entity(*entity) {
                    Ok(_) => {}
                    Err(error) => {
                        world.diagnostics_mut().report_error(
                            error,
                            Some(*entity),
                            None,
                            "deferred destroy skipped",
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct CPos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct CVel {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn add_remove_cancellation() {
        let mut world = World::new();
        let e = world.create_entity(true);

        let mut cmd = CommandBuffer::new();
        cmd.add(e, CPos { x: 1.0, y: 1.0 });
        cmd.remove::<CPos>(e);
        cmd.add(e, CVel { dx: 2.0, dy: 2.0 });
        cmd.flush(&mut world).unwrap();

        assert!(!world.has_component::<CPos>(e));
        assert_eq!(
            world.get_component::<CVel>(e),
            Some(&CVel { dx: 2.0, dy: 2.0 })
        );
    }

    #[test]
    fn destroy_supersedes_everything() {
        let mut world = World::new();
        let e = world.create_entity(true);

        let mut cmd = CommandBuffer::new();
        cmd.add(e, CPos { x: 1.0, y: 1.0 });
        cmd.remove::<CPos>(e);
        cmd.add(e, CVel { dx: 0.0, dy: 0.0 });
        cmd.destroy(e);
        // Recorded after destroy: ignored.
        cmd.add(e, CPos { x: 9.0, y: 9.0 });
        cmd.flush(&mut world).unwrap();

        assert!(!world.is_alive(e));
        assert_eq!(world.alive_count(), 0);
    }

    #[test]
    fn last_add_wins_per_type() {
        let mut world = World::new();
        let e = world.create_entity(true);

        let mut cmd = CommandBuffer::new();
        cmd.add(e, CPos { x: 1.0, y: 1.0 });
        cmd.add(e, CPos { x: 7.0, y: 8.0 });
        cmd.flush(&mut world).unwrap();

        assert_eq!(
            world.get_component::<CPos>(e),
            Some(&CPos { x: 7.0, y: 8.0 })
        );
    }

    #[test]
    fn deferred_create_is_alive_after_flush() {
        let mut world = World::new();
        let mut cmd = CommandBuffer::new();
        let e = cmd.create(world.entities(), false);
        cmd.add(e, CPos { x: 0.0, y: 0.0 });
        assert!(!world.is_alive(e));

        cmd.flush(&mut world).unwrap();
        assert!(world.is_alive(e));
        assert!(!world.is_enabled(e));
        assert!(world.has_component::<CPos>(e));
    }

    #[test]
    fn flush_isolates_stale_entity_failures() {
        let mut world = World::new();
        let dead = world.create_entity(true);
        let live = world.create_entity(true);
        world.destroy_entity(dead).unwrap();

        let mut cmd = CommandBuffer::new();
        cmd.add(dead, CPos { x: 0.0, y: 0.0 });
        cmd.add(live, CPos { x: 1.0, y: 2.0 });
        cmd.flush(&mut world).unwrap();

        // The stale target was skipped, the live one applied.
        assert!(world.has_component::<CPos>(live));
        assert!(!world.diagnostics().is_empty());
    }

    #[test]
    fn flush_during_iteration_is_rejected_and_preserved() {
        let mut world = World::new();
        let e = world.create_entity(true);
        let mut cmd = CommandBuffer::new();
        cmd.add(e, CPos { x: 0.0, y: 0.0 });

        world.begin_iteration();
        assert!(matches!(
            cmd.flush(&mut world),
            Err(EcsError::StructuralChangeDuringIteration)
        ));
        assert!(!cmd.is_empty());
        world.end_iteration();

        cmd.flush(&mut world).unwrap();
        assert!(world.has_component::<CPos>(e));
    }

    #[test]
    fn set_enabled_last_write_wins() {
        let mut world = World::new();
        let e = world.create_entity(true);
        let mut cmd = CommandBuffer::new();
        cmd.set_enabled(e, false);
        cmd.set_enabled(e, true);
        cmd.set_enabled(e, false);
        cmd.flush(&mut world).unwrap();
        assert!(!world.is_enabled(e));
    }
}
