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

//! World: central entity and archetype storage.
//!
//! The world owns the entity manager, the archetype index, the sparse-set
//! fallback stores, tags, resources, the event channels and the delta bus.
//! It is single-threaded cooperative: the iteration-depth counter rejects
//! structural mutation while any query iteration is in flight, and deferred
//! changes go through [`CommandBuffer`](crate::command::CommandBuffer).

use std::any::{Any, TypeId};
use std::cell::Cell;

use ahash::AHashMap;

use crate::archetype::{ArchetypeIndex, EMPTY_ARCHETYPE};
use crate::bitset::BitSet;
use crate::column::BoxedValue;
use crate::component::{self, Component, ComponentTypeId, StorageKind, TypeInfo};
use crate::delta::{DeltaBus, DeltaKind};
use crate::diagnostics::Diagnostics;
use crate::entity::{Entity, EntityManager};
use crate::error::{EcsError, Result};
use crate::event::{ComponentEvent, EventChannel};
use crate::prefab::PrefabRegistry;
use crate::serialization::SerdeRegistry;
use crate::sparse::SparseColumn;
use crate::tag::TagStore;

/// Where a live entity's row lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: u32,
    pub row: u32,
}

impl EntityLocation {
    const EMPTY: EntityLocation = EntityLocation {
        archetype: u32::MAX,
        row: u32::MAX,
    };

    fn is_empty(self) -> bool {
        self.archetype == u32::MAX
    }
}

/// Central ECS world.
pub struct World {
    entities: EntityManager,
    locations: Vec<EntityLocation>,
    archetypes: ArchetypeIndex,

    /// Fallback stores for sparse-storage component types, keyed by type id.
    sparse: AHashMap<ComponentTypeId, Box<dyn SparseColumn>>,

    /// Cache for archetype transitions when adding/removing components.
    transitions: AHashMap<(u32, ComponentTypeId, bool), u32>,

    /// Typed resources (singletons) keyed by type.
    resources: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,

    tags: TagStore,
    added: EventChannel,
    removed: EventChannel,
    delta: DeltaBus,
    diagnostics: Diagnostics,

    pub(crate) prefabs: PrefabRegistry,
    pub(crate) serde: SerdeRegistry,

    /// Current frame. Frame 0 is reserved so fresh epochs always read as
    /// written-in-the-past.
    frame: u32,

    /// Query-iteration depth; structural mutation requires zero.
    iterating: Cell<u32>,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: EntityManager::new(),
            locations: Vec::new(),
            archetypes: ArchetypeIndex::new(),
            sparse: AHashMap::new(),
            transitions: AHashMap::with_capacity(128),
            resources: AHashMap::new(),
            tags: TagStore::new(),
            added: EventChannel::new(),
            removed: EventChannel::new(),
            delta: DeltaBus::default(),
            diagnostics: Diagnostics::new(),
            prefabs: PrefabRegistry::new(),
            serde: SerdeRegistry::new(),
            frame: 1,
            iterating: Cell::new(0),
        }
    }

    // ---- frame -----------------------------------------------------------

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Advance the frame counter and reset per-frame write masks.
    pub fn begin_frame(&mut self) {
        // Wrapping would break change detection everywhere.
        if self.frame == u32::MAX {
            panic!("World frame overflow at {}", self.frame);
        }
        self.frame += 1;
        self.archetypes.reset_write_masks();
    }

    /// Frame-end policy: discard event residue on unsubscribed channels.
    pub fn end_frame(&mut self) {
        self.added.end_frame();
        self.removed.end_frame();
    }

    // ---- iteration guard -------------------------------------------------

    pub fn iteration_depth(&self) -> u32 {
        self.iterating.get()
    }

    pub(crate) fn begin_iteration(&self) {
        self.iterating.set(self.iterating.get() + 1);
    }

    pub(crate) fn end_iteration(&self) {
        let depth = self.iterating.get();
        debug_assert!(depth > 0);
        self.iterating.set(depth.saturating_sub(1));
    }

    pub(crate) fn guard_structural(&self) -> Result<()> {
        if self.iterating.get() > 0 {
            return Err(EcsError::StructuralChangeDuringIteration);
        }
        Ok(())
    }

    // ---- entity lifecycle ------------------------------------------------

    pub fn create_entity(&mut self, enabled: bool) -> Entity {
        let entity = self.entities.create(enabled);
        self.place_in_empty_archetype(entity);
        entity
    }

    fn place_in_empty_archetype(&mut self, entity: Entity) {
        let arch = self
            .archetypes
            .get_mut(EMPTY_ARCHETYPE)
            .expect("empty archetype always exists");
        let row = arch.allocate_row(entity);
        self.set_location(entity, EMPTY_ARCHETYPE, row as u32);
    }

    /// Activate a handle reserved through a command buffer.
    pub(crate) fn activate_reserved(&mut self, entity: Entity, enabled: bool) -> bool {
        if !self.entities.activate(entity, enabled) {
            return false;
        }
        self.place_in_empty_archetype(entity);
        true
    }

    /// Destroy an entity and every component it holds. `Ok(false)` on a
    /// stale handle; never panics for one.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<bool> {
        self.guard_structural()?;
        if !self.entities.is_alive(entity) {
            return Ok(false);
        }

        if let Some(location) = self.location(entity) {
            let types: Vec<ComponentTypeId> = self
                .archetypes
                .get(location.archetype)
                .map(|a| a.types().to_vec())
                .unwrap_or_default();
            let removed_row = self
                .archetypes
                .get_mut(location.archetype)
                .map(|arch| arch.swap_remove_row(location.row as usize));
            if let Some((moved, swapped)) = removed_row {
                for (type_id, value) in types.into_iter().zip(moved) {
                    self.removed.push(ComponentEvent {
                        entity,
                        type_id,
                        payload: Some(value.value),
                    });
                    self.delta.notify(DeltaKind::Removed, entity, type_id);
                }
                if let Some(swapped) = swapped {
                    self.set_location(swapped, location.archetype, location.row);
                }
            }
        }

        let slot = entity.index();
        for (&type_id, store) in self.sparse.iter_mut() {
            if let Some(value) = store.remove(slot) {
                self.removed.push(ComponentEvent {
                    entity,
                    type_id,
                    payload: Some(value),
                });
                self.delta.notify(DeltaKind::Removed, entity, type_id);
            }
        }

        self.tags.clear_slot(entity);
        if let Some(location) = self.locations.get_mut(slot as usize) {
            *location = EntityLocation::EMPTY;
        }
        self.entities.destroy(entity);
        Ok(true)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.entities.is_enabled(entity)
    }

    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> bool {
        self.entities.set_enabled(entity, enabled)
    }

    pub fn alive_count(&self) -> u32 {
        self.entities.alive_count()
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    // ---- locations -------------------------------------------------------

    fn set_location(&mut self, entity: Entity, archetype: u32, row: u32) {
        let slot = entity.index() as usize;
        if self.locations.len() <= slot {
            self.locations.resize(slot + 1, EntityLocation::EMPTY);
        }
        self.locations[slot] = EntityLocation { archetype, row };
    }

    /// Archetype location of a live entity.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        let location = self.locations.get(entity.index() as usize).copied()?;
        (!location.is_empty()).then_some(location)
    }

    // ---- components ------------------------------------------------------

    fn sparse_store_mut(&mut self, info: &TypeInfo) -> Result<&mut Box<dyn SparseColumn>> {
        if !self.sparse.contains_key(&info.id) {
            let make = info
                .new_sparse
                .ok_or_else(|| EcsError::NotRegistered(info.name.clone()))?;
            self.sparse.insert(info.id, make());
        }
        Ok(self.sparse.get_mut(&info.id).expect("inserted above"))
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        let type_id = component::type_id::<T>();
        self.add_component_dyn(entity, type_id, Box::new(value))
    }

    /// Id-based add for deferred paths. Shell type ids fail with
    /// `NotRegistered`.
    pub fn add_component_dyn(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        value: BoxedValue,
    ) -> Result<()> {
        self.guard_structural()?;
        if !self.entities.is_alive(entity) {
            return Err(EcsError::InvalidHandle(entity));
        }
        let info = component::info(type_id)
            .ok_or_else(|| EcsError::NotRegistered(format!("#{}", type_id.get())))?;
        match info.storage {
            StorageKind::Sparse => {
                let frame = self.frame;
                let slot = entity.index();
                let had = self
                    .sparse
                    .get(&type_id)
                    .is_some_and(|store| store.has(slot));
                let store = self.sparse_store_mut(&info)?;
                store.insert(slot, value, frame)?;
                // Re-adding fires the channel again (consumers re-validate);
                // the delta feed records membership vs value change.
                self.added.push(ComponentEvent {
                    entity,
                    type_id,
                    payload: None,
                });
                let kind = if had { DeltaKind::Changed } else { DeltaKind::Added };
                self.delta.notify(kind, entity, type_id);
                Ok(())
            }
            StorageKind::Archetype => self.add_to_archetype(entity, type_id, value),
        }
    }

    fn add_to_archetype(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        value: BoxedValue,
    ) -> Result<()> {
        let location = self
            .location(entity)
            .ok_or(EcsError::InvalidHandle(entity))?;
        let frame = self.frame;

        // Overwrite in place when the component already exists. The channel
        // still sees an add (consumers re-validate, e.g. re-parenting); the
        // delta feed records it as a value change.
        if let Some(arch) = self.archetypes.get_mut(location.archetype) {
            if arch.has_type(type_id) {
                let col = arch.column_mut(type_id).expect("has_type checked");
                col.replace(location.row as usize, value, frame)?;
                self.added.push(ComponentEvent {
                    entity,
                    type_id,
                    payload: None,
                });
                self.delta.notify(DeltaKind::Changed, entity, type_id);
                return Ok(());
            }
        }

        let target = match self
            .transitions
            .get(&(location.archetype, type_id, true))
            .copied()
        {
            Some(target) => target,
            None => {
                let old_sig = self
                    .archetypes
                    .get(location.archetype)
                    .expect("location archetype exists")
                    .signature()
                    .clone();
                let mut new_sig = old_sig;
                new_sig.set(type_id.bit());
                let target = self.archetypes.get_or_create(&new_sig)?;
                self.transitions
                    .insert((location.archetype, type_id, true), target);
                target
            }
        };

        let (old_arch, new_arch) = self.archetypes.pair_mut(location.archetype, target);
        let old_types: smallvec::SmallVec<[ComponentTypeId; 8]> =
            old_arch.types().iter().copied().collect();

        let new_row = new_arch.allocate_row(entity);
        let (moved, swapped) = old_arch.swap_remove_row(location.row as usize);
        for (old_type, moved_value) in old_types.into_iter().zip(moved) {
            new_arch
                .column_mut(old_type)
                .expect("target signature superset")
                .push_moved(moved_value)?;
        }
        new_arch
            .column_mut(type_id)
            .expect("target contains added type")
            .push(value, frame)?;

        if let Some(swapped) = swapped {
            self.set_location(swapped, location.archetype, location.row);
        }
        self.set_location(entity, target, new_row as u32);

        self.added.push(ComponentEvent {
            entity,
            type_id,
            payload: None,
        });
        self.delta.notify(DeltaKind::Added, entity, type_id);
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T> {
        let type_id =
            component::lookup::<T>().ok_or(EcsError::ComponentNotFound)?;
        let value = self.remove_component_inner(entity, type_id)?;
        let value = value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        self.removed.push(ComponentEvent {
            entity,
            type_id,
            payload: None,
        });
        self.delta.notify(DeltaKind::Removed, entity, type_id);
        Ok(*value)
    }

    /// Id-based removal; the removed value rides on the event.
    pub fn remove_component_dyn(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<()> {
        let value = self.remove_component_inner(entity, type_id)?;
        self.removed.push(ComponentEvent {
            entity,
            type_id,
            payload: Some(value),
        });
        self.delta.notify(DeltaKind::Removed, entity, type_id);
        Ok(())
    }

    fn remove_component_inner(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<BoxedValue> {
        self.guard_structural()?;
        if !self.entities.is_alive(entity) {
            return Err(EcsError::InvalidHandle(entity));
        }

        if let Some(store) = self.sparse.get_mut(&type_id) {
            if let Some(value) = store.remove(entity.index()) {
                return Ok(value);
            }
        }

        let location = self
            .location(entity)
            .ok_or(EcsError::InvalidHandle(entity))?;
        let has = self
            .archetypes
            .get(location.archetype)
            .is_some_and(|a| a.has_type(type_id));
        if !has {
            return Err(EcsError::ComponentNotFound);
        }

        let target = match self
            .transitions
            .get(&(location.archetype, type_id, false))
            .copied()
        {
            Some(target) => target,
            None => {
                let mut new_sig = self
                    .archetypes
                    .get(location.archetype)
                    .expect("location archetype exists")
                    .signature()
                    .clone();
                new_sig.clear(type_id.bit());
                let target = self.archetypes.get_or_create(&new_sig)?;
                self.transitions
                    .insert((location.archetype, type_id, false), target);
                target
            }
        };

        let (old_arch, new_arch) = self.archetypes.pair_mut(location.archetype, target);
        let old_types: smallvec::SmallVec<[ComponentTypeId; 8]> =
            old_arch.types().iter().copied().collect();

        let new_row = new_arch.allocate_row(entity);
        let (moved, swapped) = old_arch.swap_remove_row(location.row as usize);
        let mut removed_value = None;
        for (old_type, moved_value) in old_types.into_iter().zip(moved) {
            if old_type == type_id {
                removed_value = Some(moved_value.value);
            } else {
                new_arch
                    .column_mut(old_type)
                    .expect("target signature minus removed type")
                    .push_moved(moved_value)?;
            }
        }

        if let Some(swapped) = swapped {
            self.set_location(swapped, location.archetype, location.row);
        }
        self.set_location(entity, target, new_row as u32);

        Ok(removed_value.expect("removed type was in the old signature"))
    }

    /// Batch-spawn fast path: create an entity directly inside `arch_id`,
    /// filling every column from `values` (one per archetype type) with an
    /// explicit write epoch. Prefab spawns use this for one-hop placement.
    pub(crate) fn spawn_row(
        &mut self,
        arch_id: u32,
        values: &mut Vec<(ComponentTypeId, BoxedValue)>,
        epoch: u32,
    ) -> Result<Entity> {
        let entity = self.entities.create(true);
        let arch = self
            .archetypes
            .get_mut(arch_id)
            .ok_or(EcsError::ComponentNotFound)?;
        let types: smallvec::SmallVec<[ComponentTypeId; 8]> =
            arch.types().iter().copied().collect();
        let row = arch.allocate_row(entity);
        for type_id in &types {
            let position = values
                .iter()
                .position(|(t, _)| t == type_id)
                .ok_or(EcsError::ComponentNotFound)?;
            let (_, value) = values.swap_remove(position);
            arch.column_mut(*type_id)
                .ok_or(EcsError::ComponentNotFound)?
                .push(value, epoch)?;
        }
        self.set_location(entity, arch_id, row as u32);
        for type_id in types {
            self.push_added_event(entity, type_id);
        }
        Ok(entity)
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let type_id = component::lookup::<T>()?;
        if let Some(location) = self.location(entity) {
            if let Some(arch) = self.archetypes.get(location.archetype) {
                if let Some(col) = arch.typed::<T>(type_id) {
                    return col.get(location.row as usize);
                }
            }
        }
        self.sparse
            .get(&type_id)?
            .row_any(entity.index())?
            .downcast_ref::<T>()
    }

    /// Mutable component access. Stamps the write epoch and mask and feeds
    /// delta subscribers.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let type_id = component::lookup::<T>()?;
        if !self.entities.is_alive(entity) {
            return None;
        }
        let frame = self.frame;
        if let Some(location) = self.location(entity) {
            let in_archetype = self
                .archetypes
                .get(location.archetype)
                .is_some_and(|a| a.has_type(type_id));
            if in_archetype {
                self.delta.notify(DeltaKind::Changed, entity, type_id);
                let arch = self.archetypes.get_mut(location.archetype)?;
                let col = arch.typed_mut::<T>(type_id)?;
                return col.get_mut(location.row as usize, frame);
            }
        }
        let store = self.sparse.get_mut(&type_id)?;
        if !store.has(entity.index()) {
            return None;
        }
        store.mark_written(entity.index(), frame);
        self.delta.notify(DeltaKind::Changed, entity, type_id);
        store.row_any_mut(entity.index())?.downcast_mut::<T>()
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        component::lookup::<T>().is_some_and(|id| self.has_component_id(entity, id))
    }

    pub fn has_component_id(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        if let Some(location) = self.location(entity) {
            if self
                .archetypes
                .get(location.archetype)
                .is_some_and(|a| a.has_type(type_id))
            {
                return true;
            }
        }
        self.sparse
            .get(&type_id)
            .is_some_and(|store| store.has(entity.index()))
    }

    /// Stamp a component written this frame without touching its value.
    pub fn mark_changed<T: Component>(&mut self, entity: Entity) -> bool {
        match component::lookup::<T>() {
            Some(type_id) => self.mark_changed_id(entity, type_id),
            None => false,
        }
    }

    pub fn mark_changed_id(&mut self, entity: Entity, type_id: ComponentTypeId) -> bool {
        if !self.has_component_id(entity, type_id) {
            return false;
        }
        let frame = self.frame;
        if let Some(location) = self.location(entity) {
            if let Some(arch) = self.archetypes.get_mut(location.archetype) {
                if let Some(col) = arch.column_mut(type_id) {
                    col.mark_written(location.row as usize, frame);
                    self.delta.notify(DeltaKind::Changed, entity, type_id);
                    return true;
                }
            }
        }
        if let Some(store) = self.sparse.get_mut(&type_id) {
            store.mark_written(entity.index(), frame);
            self.delta.notify(DeltaKind::Changed, entity, type_id);
            return true;
        }
        false
    }

    /// True if the component was written in `frame`, per whichever tracking
    /// facility its storage exposes.
    pub(crate) fn component_changed_at(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
        frame: u32,
    ) -> bool {
        if let Some(location) = self.location(entity) {
            if let Some(arch) = self.archetypes.get(location.archetype) {
                if let Some(col) = arch.column(type_id) {
                    return col.changed_at(location.row as usize, frame);
                }
            }
        }
        self.sparse
            .get(&type_id)
            .and_then(|store| store.write_frame(entity.index()))
            == Some(frame)
    }

    /// Component ids on an entity: archetype types plus sparse stores.
    pub fn component_types_of(&self, entity: Entity) -> Vec<ComponentTypeId> {
        let mut types = Vec::new();
        if let Some(location) = self.location(entity) {
            if let Some(arch) = self.archetypes.get(location.archetype) {
                types.extend_from_slice(arch.types());
            }
        }
        for (&type_id, store) in &self.sparse {
            if store.has(entity.index()) {
                types.push(type_id);
            }
        }
        types.sort_unstable();
        types
    }

    /// Untyped read access by type id, for codec and host paths.
    pub fn component_any(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<&dyn Any> {
        if let Some(location) = self.location(entity) {
            if let Some(arch) = self.archetypes.get(location.archetype) {
                if let Some(col) = arch.column(type_id) {
                    return col.row_any(location.row as usize);
                }
            }
        }
        self.sparse.get(&type_id)?.row_any(entity.index())
    }

    // ---- tags ------------------------------------------------------------

    pub fn add_tag(&mut self, entity: Entity, tag: &str) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        self.tags.add(entity, tag);
        true
    }

    pub fn remove_tag(&mut self, entity: Entity, tag: &str) {
        self.tags.remove(entity, tag);
    }

    pub fn has_tag(&self, entity: Entity, tag: &str) -> bool {
        self.entities.is_alive(entity) && self.tags.has(entity, tag)
    }

    pub fn tag_store(&self) -> &TagStore {
        &self.tags
    }

    pub fn tag_store_mut(&mut self) -> &mut TagStore {
        &mut self.tags
    }

    /// Bit mask over tag names, interning unknown ones.
    pub fn create_tag_mask(&mut self, tags: &[&str]) -> BitSet {
        self.tags.create_mask(tags)
    }

    // ---- resources -------------------------------------------------------

    pub fn set_resource<R: Any + Send + Sync>(&mut self, resource: R) {
        self.resources.insert(TypeId::of::<R>(), Box::new(resource));
    }

    pub fn get_resource<R: Any + Send + Sync>(&self) -> Option<&R> {
        self.resources
            .get(&TypeId::of::<R>())
            .and_then(|r| r.downcast_ref::<R>())
    }

    pub fn get_resource_mut<R: Any + Send + Sync>(&mut self) -> Option<&mut R> {
        self.resources
            .get_mut(&TypeId::of::<R>())
            .and_then(|r| r.downcast_mut::<R>())
    }

    pub fn get_or_create_resource<R: Any + Send + Sync + Default>(&mut self) -> &mut R {
        self.resources
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(R::default()))
            .downcast_mut::<R>()
            .expect("resource entry keyed by its own TypeId")
    }

    pub fn remove_resource<R: Any + Send + Sync>(&mut self) -> Option<R> {
        self.resources
            .remove(&TypeId::of::<R>())
            .and_then(|r| r.downcast::<R>().ok())
            .map(|r| *r)
    }

    // ---- events / delta / diagnostics -------------------------------------

    pub fn added_channel(&self) -> &EventChannel {
        &self.added
    }

    pub fn added_channel_mut(&mut self) -> &mut EventChannel {
        &mut self.added
    }

    pub fn removed_channel(&self) -> &EventChannel {
        &self.removed
    }

    pub fn removed_channel_mut(&mut self) -> &mut EventChannel {
        &mut self.removed
    }

    pub(crate) fn delta_bus_mut(&mut self) -> &mut DeltaBus {
        &mut self.delta
    }

    pub(crate) fn push_added_event(&mut self, entity: Entity, type_id: ComponentTypeId) {
        self.added.push(ComponentEvent {
            entity,
            type_id,
            payload: None,
        });
        self.delta.notify(DeltaKind::Added, entity, type_id);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    // ---- archetypes / sparse access ---------------------------------------

    pub fn archetypes(&self) -> &ArchetypeIndex {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut ArchetypeIndex {
        &mut self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.count()
    }

    pub(crate) fn sparse_store(&self, type_id: ComponentTypeId) -> Option<&dyn SparseColumn> {
        self.sparse.get(&type_id).map(|s| s.as_ref())
    }

    /// Garbage-collect empty archetypes and drop stale transition edges.
    pub fn cleanup(&mut self) -> Result<usize> {
        self.guard_structural()?;
        let removed = self.archetypes.cleanup();
        if removed > 0 {
            self.transitions.clear();
        }
        Ok(removed)
    }

    /// Remove every entity and all component data. Resources, prefabs,
    /// codecs and the tag dictionary survive.
    pub fn clear(&mut self) -> Result<()> {
        self.guard_structural()?;
        self.entities.clear();
        self.locations.clear();
        self.archetypes.clear();
        self.sparse.clear();
        self.transitions.clear();
        self.tags.clear_slots();
        self.added.clear();
        self.removed.clear();
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    struct SparseMarker(#[allow(dead_code)] u8);

    #[test]
    fn add_get_remove_component() {
        let mut world = World::new();
        let e = world.create_entity(true);
        world.add_component(e, Pos { x: 1.0, y: 2.0 }).unwrap();
        assert!(world.has_component::<Pos>(e));
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));

        let removed = world.remove_component::<Pos>(e).unwrap();
        assert_eq!(removed, Pos { x: 1.0, y: 2.0 });
        assert!(!world.has_component::<Pos>(e));
        assert!(matches!(
            world.remove_component::<Pos>(e),
            Err(EcsError::ComponentNotFound)
        ));
    }

    #[test]
    fn transitions_keep_other_components() {
        let mut world = World::new();
        let e = world.create_entity(true);
        world.add_component(e, Pos { x: 1.0, y: 2.0 }).unwrap();
        world.add_component(e, Vel { dx: 3.0, dy: 4.0 }).unwrap();
        world.remove_component::<Pos>(e).unwrap();
        assert_eq!(
            world.get_component::<Vel>(e),
            Some(&Vel { dx: 3.0, dy: 4.0 })
        );
    }

    #[test]
    fn swap_remove_fixes_moved_entity_location() {
        let mut world = World::new();
        let a = world.create_entity(true);
        let b = world.create_entity(true);
        let c = world.create_entity(true);
        for (i, e) in [a, b, c].into_iter().enumerate() {
            world
                .add_component(e, Pos { x: i as f32, y: 0.0 })
                .unwrap();
        }
        // Removing a's row swaps c into it.
        world.destroy_entity(a).unwrap();
        assert_eq!(world.get_component::<Pos>(c), Some(&Pos { x: 2.0, y: 0.0 }));
        assert_eq!(world.get_component::<Pos>(b), Some(&Pos { x: 1.0, y: 0.0 }));
    }

    #[test]
    fn stale_handles_never_panic() {
        let mut world = World::new();
        let e = world.create_entity(true);
        world.add_component(e, Pos { x: 0.0, y: 0.0 }).unwrap();
        assert!(world.destroy_entity(e).unwrap());
        assert!(!world.destroy_entity(e).unwrap());
        assert!(world.get_component::<Pos>(e).is_none());
        assert!(matches!(
            world.add_component(e, Pos { x: 1.0, y: 1.0 }),
            Err(EcsError::InvalidHandle(_))
        ));
    }

    #[test]
    fn structural_guard_blocks_mutation_mid_iteration() {
        let mut world = World::new();
        let e = world.create_entity(true);
        world.begin_iteration();
        assert!(matches!(
            world.add_component(e, Pos { x: 0.0, y: 0.0 }),
            Err(EcsError::StructuralChangeDuringIteration)
        ));
        assert!(matches!(
            world.destroy_entity(e),
            Err(EcsError::StructuralChangeDuringIteration)
        ));
        world.end_iteration();
        assert!(world.add_component(e, Pos { x: 0.0, y: 0.0 }).is_ok());
    }

    #[test]
    fn sparse_storage_types_skip_archetypes() {
        component::register_sparse::<SparseMarker>();
        let mut world = World::new();
        let e = world.create_entity(true);
        let before = world.archetype_count();
        world.add_component(e, SparseMarker(1)).unwrap();
        assert_eq!(world.archetype_count(), before);
        assert!(world.has_component::<SparseMarker>(e));
        world.remove_component::<SparseMarker>(e).unwrap();
        assert!(!world.has_component::<SparseMarker>(e));
    }

    #[test]
    fn resources_are_typed_singletons() {
        #[derive(Default, PartialEq, Debug)]
        struct Gravity(f32);
        let mut world = World::new();
        assert!(world.get_resource::<Gravity>().is_none());
        world.get_or_create_resource::<Gravity>().0 = 9.8;
        assert_eq!(world.get_resource::<Gravity>(), Some(&Gravity(9.8)));
        assert_eq!(world.remove_resource::<Gravity>(), Some(Gravity(9.8)));
        assert!(world.get_resource::<Gravity>().is_none());
    }

    #[test]
    fn destroy_emits_removed_events_with_payload() {
        let mut world = World::new();
        let e = world.create_entity(true);
        world.add_component(e, Pos { x: 5.0, y: 6.0 }).unwrap();
        world.added_channel_mut().clear();
        world.destroy_entity(e).unwrap();

        let events = world.removed_channel_mut().drain();
        assert_eq!(events.len(), 1);
        let payload = events[0].payload.as_ref().unwrap();
        assert_eq!(
            payload.downcast_ref::<Pos>(),
            Some(&Pos { x: 5.0, y: 6.0 })
        );
    }
}
