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

//! Query engine: builders, plans, iteration, chunking, delta feeds.
//!
//! A [`Query`] is a standalone builder; its plan (the matched archetypes and
//! per-archetype column indices) is rebuilt lazily whenever the builder
//! changed, the archetype index's structural version moved, or the tag
//! dictionary grew. Row and value changes never invalidate a plan.
//!
//! Iteration is strictly synchronous. Structural mutation while any
//! iteration is in flight fails with `StructuralChangeDuringIteration`;
//! deferred changes go through [`CommandBuffer`](crate::command::CommandBuffer).

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::bitset::BitSet;
use crate::component::{self, Component, ComponentTypeId, StorageKind};
use crate::delta::{DeltaSink, QueryDelta, DEFAULT_DELTA_CAPACITY};
use crate::entity::Entity;
use crate::error::Result;
use crate::world::World;

/// Resolved per-archetype plan entry.
struct PlanEntry {
    arch: u32,
    /// Column indices for changed-watched types, aligned with
    /// `Query::changed`. `None` falls back to the world-level check.
    changed_cols: SmallVec<[Option<u32>; 4]>,
}

enum TagMask {
    /// No tag filter requested.
    Unfiltered,
    Mask(BitSet),
    /// A required tag is not even in the dictionary; nothing matches.
    Unmatchable,
}

struct Plan {
    arch_version: u64,
    tag_version: usize,
    entries: Vec<PlanEntry>,
    require_tags: TagMask,
    forbid_tags: Option<BitSet>,
    /// Excluded types that archetype signatures cannot rule out.
    excluded_sparse: SmallVec<[ComponentTypeId; 2]>,
    sparse_path: bool,
}

/// Runtime query builder over component type ids.
pub struct Query {
    required: SmallVec<[ComponentTypeId; 8]>,
    excluded: SmallVec<[ComponentTypeId; 4]>,
    optional: SmallVec<[ComponentTypeId; 4]>,
    changed: SmallVec<[ComponentTypeId; 4]>,
    require_tags: Vec<String>,
    forbid_tags: Vec<String>,
    use_archetypes: bool,
    delta_capacity: usize,
    delta: Option<Arc<DeltaSink>>,
    plan: Option<Plan>,
    dirty: bool,
}

impl Query {
    pub fn new() -> Self {
        Self {
            required: SmallVec::new(),
            excluded: SmallVec::new(),
            optional: SmallVec::new(),
            changed: SmallVec::new(),
            require_tags: Vec::new(),
            forbid_tags: Vec::new(),
            use_archetypes: true,
            delta_capacity: DEFAULT_DELTA_CAPACITY,
            delta: None,
            plan: None,
            dirty: true,
        }
    }

    // ---- builder ----------------------------------------------------------

    /// Require component `T` on every matched row.
    pub fn require<T: Component>(self) -> Self {
        self.require_id(component::type_id::<T>())
    }

    pub fn require_id(mut self, type_id: ComponentTypeId) -> Self {
        if !self.required.contains(&type_id) {
            self.required.push(type_id);
        }
        self.dirty = true;
        self
    }

    /// Exclude archetypes/rows carrying `T`.
    pub fn without<T: Component>(self) -> Self {
        self.without_id(component::type_id::<T>())
    }

    pub fn without_id(mut self, type_id: ComponentTypeId) -> Self {
        if !self.excluded.contains(&type_id) {
            self.excluded.push(type_id);
        }
        self.dirty = true;
        self
    }

    /// Include `T` in row access without constraining matching.
    pub fn optional<T: Component>(mut self) -> Self {
        let type_id = component::type_id::<T>();
        if !self.optional.contains(&type_id) {
            self.optional.push(type_id);
        }
        self.dirty = true;
        self
    }

    /// Only admit rows whose `T` was written in the current frame.
    pub fn changed<T: Component>(self) -> Self {
        self.changed_id(component::type_id::<T>())
    }

    pub fn changed_id(mut self, type_id: ComponentTypeId) -> Self {
        if !self.changed.contains(&type_id) {
            self.changed.push(type_id);
        }
        self.dirty = true;
        self
    }

    /// Per-row string-tag filter: require all of `require`, reject any of
    /// `forbid`.
    pub fn where_tags(mut self, require: &[&str], forbid: &[&str]) -> Self {
        self.require_tags
            .extend(require.iter().map(|t| t.to_string()));
        self.forbid_tags.extend(forbid.iter().map(|t| t.to_string()));
        self.dirty = true;
        self
    }

    /// Force the archetype path (default) or the sparse-store scan path.
    pub fn use_archetype_optimization(mut self, enabled: bool) -> Self {
        self.use_archetypes = enabled;
        self.dirty = true;
        self
    }

    /// Combined cap over the delta sets. Takes effect at `enable_delta`.
    pub fn delta_capacity(mut self, capacity: usize) -> Self {
        self.delta_capacity = capacity;
        self
    }

    /// Register for incremental added/removed/changed notifications.
    pub fn enable_delta(mut self, world: &mut World) -> Self {
        if self.delta.is_none() {
            let mask: BitSet = self.required.iter().map(|t| t.bit()).collect();
            let sink = DeltaSink::new(mask, self.delta_capacity);
            world.delta_bus_mut().register(&sink);
            self.delta = Some(sink);
        }
        self
    }

    /// Atomically drain the accumulated delta sets and the overflow flag.
    pub fn consume_delta(&self) -> QueryDelta {
        self.delta
            .as_ref()
            .map(|sink| sink.consume())
            .unwrap_or_default()
    }

    pub fn required_types(&self) -> &[ComponentTypeId] {
        &self.required
    }

    pub fn excluded_types(&self) -> &[ComponentTypeId] {
        &self.excluded
    }

    pub fn optional_types(&self) -> &[ComponentTypeId] {
        &self.optional
    }

    pub fn changed_types(&self) -> &[ComponentTypeId] {
        &self.changed
    }

    // ---- plan -------------------------------------------------------------

    fn refresh_plan(&mut self, world: &World) {
        let arch_version = world.archetypes().version();
        let tag_version = world.tag_store().dictionary_len();
        if !self.dirty {
            if let Some(plan) = &self.plan {
                if plan.arch_version == arch_version && plan.tag_version == tag_version {
                    return;
                }
            }
        }

        let storage_of = |type_id: ComponentTypeId| {
            component::info(type_id)
                .map(|info| info.storage)
                .unwrap_or(StorageKind::Archetype)
        };

        let sparse_path = !self.use_archetypes
            || self
                .required
                .iter()
                .any(|&t| storage_of(t) == StorageKind::Sparse);

        let require_tags = if self.require_tags.is_empty() {
            TagMask::Unfiltered
        } else {
            let names: Vec<&str> = self.require_tags.iter().map(|s| s.as_str()).collect();
            match world.tag_store().mask_of(&names) {
                Some(mask) => TagMask::Mask(mask),
                None => TagMask::Unmatchable,
            }
        };
        let forbid_tags = if self.forbid_tags.is_empty() {
            None
        } else {
            // Unknown forbidden tags cannot be carried by anyone; drop them.
            let mut mask = BitSet::new();
            for tag in &self.forbid_tags {
                if let Some(bit) = world.tag_store().bit_of(tag) {
                    mask.set(bit);
                }
            }
            Some(mask)
        };

        let mut entries = Vec::new();
        let mut excluded_sparse = SmallVec::new();
        if !sparse_path {
            let required_mask: BitSet = self.required.iter().map(|t| t.bit()).collect();
            let mut forbidden_mask = BitSet::new();
            for &excluded in &self.excluded {
                match storage_of(excluded) {
                    StorageKind::Archetype => forbidden_mask.set(excluded.bit()),
                    StorageKind::Sparse => excluded_sparse.push(excluded),
                }
            }
            let forbidden = (!forbidden_mask.is_empty()).then_some(&forbidden_mask);
            for arch_id in world.archetypes().matching(&required_mask, forbidden) {
                let arch = world
                    .archetypes()
                    .get(arch_id)
                    .expect("matching returned a live id");
                let changed_cols = self
                    .changed
                    .iter()
                    .map(|&t| arch.column_index(t).map(|i| i as u32))
                    .collect();
                entries.push(PlanEntry {
                    arch: arch_id,
                    changed_cols,
                });
            }
        } else {
            excluded_sparse.extend_from_slice(&self.excluded);
        }

        self.plan = Some(Plan {
            arch_version,
            tag_version,
            entries,
            require_tags,
            forbid_tags,
            excluded_sparse,
            sparse_path,
        });
        self.dirty = false;
    }

    fn tags_admit(plan: &Plan, world: &World, entity: Entity) -> bool {
        match &plan.require_tags {
            TagMask::Unmatchable => return false,
            TagMask::Unfiltered => {}
            TagMask::Mask(mask) => {
                let ok = world
                    .tag_store()
                    .bits(entity)
                    .is_some_and(|bits| bits.contains_all(mask));
                if !ok {
                    return false;
                }
            }
        }
        if let Some(forbid) = &plan.forbid_tags {
            if world
                .tag_store()
                .bits(entity)
                .is_some_and(|bits| bits.intersects(forbid))
            {
                return false;
            }
        }
        true
    }

    fn archetype_row_admits(
        &self,
        plan: &Plan,
        entry: &PlanEntry,
        world: &World,
        arch: &Archetype,
        row: usize,
    ) -> Option<Entity> {
        let entity = arch.entity_at(row)?;
        if !world.entities().is_enabled(entity) {
            return None;
        }
        if !Self::tags_admit(plan, world, entity) {
            return None;
        }
        for &excluded in &plan.excluded_sparse {
            if world.has_component_id(entity, excluded) {
                return None;
            }
        }
        if !self.changed.is_empty() {
            let frame = world.frame();
            let mut any = false;
            for (watched, col_idx) in self.changed.iter().zip(&entry.changed_cols) {
                let hit = match col_idx {
                    Some(idx) => arch
                        .column_by_index(*idx as usize)
                        .is_some_and(|col| col.changed_at(row, frame)),
                    None => world.component_changed_at(entity, *watched, frame),
                };
                if hit {
                    any = true;
                    break;
                }
            }
            if !any {
                return None;
            }
        }
        Some(entity)
    }

    fn entity_admits(&self, plan: &Plan, world: &World, entity: Entity) -> bool {
        if !world.entities().is_enabled(entity) {
            return false;
        }
        if !self
            .required
            .iter()
            .all(|&t| world.has_component_id(entity, t))
        {
            return false;
        }
        if plan
            .excluded_sparse
            .iter()
            .any(|&t| world.has_component_id(entity, t))
        {
            return false;
        }
        if !Self::tags_admit(plan, world, entity) {
            return false;
        }
        if !self.changed.is_empty() {
            let frame = world.frame();
            if !self
                .changed
                .iter()
                .any(|&t| world.component_changed_at(entity, t, frame))
            {
                return false;
            }
        }
        true
    }

    /// Candidate entities for the sparse scan path: the smallest sparse
    /// store among the required types, or every live slot when none of the
    /// required types is sparse-backed.
    fn sparse_candidates(&self, world: &World) -> Vec<Entity> {
        let mut driver: Option<(usize, &[u32])> = None;
        for &required in &self.required {
            if let Some(store) = world.sparse_store(required) {
                let len = store.len();
                if driver.is_none_or(|(best, _)| len < best) {
                    driver = Some((len, store.slots()));
                }
            }
        }
        match driver {
            Some((_, slots)) => slots
                .iter()
                .filter_map(|&slot| world.entities().entity_at(slot))
                .collect(),
            None => (1..world.entities().slot_bound())
                .filter_map(|slot| world.entities().entity_at(slot))
                .collect(),
        }
    }

    // ---- iteration --------------------------------------------------------

    fn run<F>(&mut self, world: &mut World, mut f: F) -> Result<()>
    where
        F: FnMut(Entity, &mut Row<'_>) -> ControlFlow<()>,
    {
        self.refresh_plan(world);
        let world_ptr: *mut World = world;
        // SAFETY: single-threaded; every reborrow below is transient and the
        // original `&mut World` is not touched until `run` returns.
        unsafe { (*world_ptr).begin_iteration() };
        let _guard = DepthGuard(world_ptr);

        let plan = self.plan.as_ref().expect("refreshed above");
        if plan.sparse_path {
            // SAFETY: shared reborrow, no outstanding exclusive borrows.
            let candidates = unsafe { self.sparse_candidates(&*world_ptr) };
            for entity in candidates {
                // SAFETY: as above; admission only reads.
                let admitted = unsafe { self.entity_admits(plan, &*world_ptr, entity) };
                if !admitted {
                    continue;
                }
                let mut row = Row {
                    world: world_ptr,
                    entity,
                    _marker: PhantomData,
                };
                if f(entity, &mut row).is_break() {
                    return Ok(());
                }
            }
            return Ok(());
        }

        for entry in &plan.entries {
            // Structural change is rejected mid-iteration, so the row count
            // is fixed for the whole entry.
            // SAFETY: shared reborrow for plan metadata only.
            let len = unsafe {
                (*world_ptr)
                    .archetypes()
                    .get(entry.arch)
                    .map(|a| a.len())
                    .unwrap_or(0)
            };
            for row_index in 0..len {
                // SAFETY: shared reborrow; admission only reads.
                let admitted = unsafe {
                    let w = &*world_ptr;
                    let arch = w
                        .archetypes()
                        .get(entry.arch)
                        .expect("plan entry stays live during iteration");
                    self.archetype_row_admits(plan, entry, w, arch, row_index)
                };
                let Some(entity) = admitted else { continue };
                let mut row = Row {
                    world: world_ptr,
                    entity,
                    _marker: PhantomData,
                };
                if f(entity, &mut row).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Visit every admitted row.
    pub fn for_each<F>(&mut self, world: &mut World, mut f: F) -> Result<()>
    where
        F: FnMut(Entity, &mut Row<'_>),
    {
        self.run(world, |entity, row| {
            f(entity, row);
            ControlFlow::Continue(())
        })
    }

    /// First admitted entity, if any.
    pub fn first(&mut self, world: &mut World) -> Option<Entity> {
        let mut found = None;
        self.run(world, |entity, _| {
            found = Some(entity);
            ControlFlow::Break(())
        })
        .ok()?;
        found
    }

    /// True if any admitted row satisfies `pred`.
    pub fn some<F>(&mut self, world: &mut World, mut pred: F) -> bool
    where
        F: FnMut(Entity, &mut Row<'_>) -> bool,
    {
        let mut hit = false;
        let _ = self.run(world, |entity, row| {
            if pred(entity, row) {
                hit = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        hit
    }

    /// Number of admitted rows.
    pub fn count(&mut self, world: &mut World) -> usize {
        let mut count = 0;
        let _ = self.run(world, |_, _| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }

    /// Admitted entities, in iteration order.
    pub fn entities(&mut self, world: &mut World) -> Vec<Entity> {
        let mut out = Vec::new();
        let _ = self.run(world, |entity, _| {
            out.push(entity);
            ControlFlow::Continue(())
        });
        out
    }

    /// Map every admitted row.
    pub fn map<R, F>(&mut self, world: &mut World, mut f: F) -> Vec<R>
    where
        F: FnMut(Entity, &mut Row<'_>) -> R,
    {
        let mut out = Vec::new();
        let _ = self.run(world, |entity, row| {
            out.push(f(entity, row));
            ControlFlow::Continue(())
        });
        out
    }

    // ---- chunks -----------------------------------------------------------

    /// Contiguous read-only views over admitted rows, each at most `target`
    /// rows long. Admitted rows are compressed into maximal runs before
    /// splitting. Views borrow the world, so they cannot outlive the next
    /// structural mutation. The sparse scan path has no columnar backing and
    /// yields no chunks.
    pub fn chunks<'w>(&mut self, world: &'w World, target: usize) -> Vec<ChunkView<'w>> {
        self.refresh_plan(world);
        let plan = self.plan.as_ref().expect("refreshed above");
        let target = target.max(1);
        let mut chunks = Vec::new();
        if plan.sparse_path {
            return chunks;
        }

        for entry in &plan.entries {
            let Some(arch) = world.archetypes().get(entry.arch) else {
                continue;
            };
            let mut run_start: Option<usize> = None;
            for row in 0..=arch.len() {
                let admitted = row < arch.len()
                    && self
                        .archetype_row_admits(plan, entry, world, arch, row)
                        .is_some();
                match (admitted, run_start) {
                    (true, None) => run_start = Some(row),
                    (false, Some(start)) => {
                        Self::split_run(&mut chunks, arch, start, row, target);
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }
        chunks
    }

    fn split_run<'w>(
        chunks: &mut Vec<ChunkView<'w>>,
        arch: &'w Archetype,
        start: usize,
        end: usize,
        target: usize,
    ) {
        let mut cursor = start;
        while cursor < end {
            let stop = (cursor + target).min(end);
            chunks.push(ChunkView {
                arch,
                start: cursor,
                end: stop,
            });
            cursor = stop;
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII decrement of the world's iteration depth.
struct DepthGuard(*mut World);

impl Drop for DepthGuard {
    fn drop(&mut self) {
        // SAFETY: the world outlives the iteration call that created us.
        unsafe { (*self.0).end_iteration() };
    }
}

/// Access to one admitted row during iteration.
///
/// Component reads resolve through the world, so both storage backends look
/// alike. Mutable access stamps the write epoch and feeds delta
/// subscribers; structural mutation is not reachable from here.
pub struct Row<'w> {
    world: *mut World,
    entity: Entity,
    _marker: PhantomData<&'w mut World>,
}

impl Row<'_> {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        // SAFETY: shared access derived from the iteration's world pointer;
        // no exclusive borrow is live while `self` is shared.
        unsafe { (*self.world).get_component::<T>(self.entity) }
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        // SAFETY: exclusive access is serialized through `&mut self`; the
        // iteration loop holds no world borrow across the callback.
        unsafe { (*self.world).get_component_mut::<T>(self.entity) }
    }

    pub fn has<T: Component>(&self) -> bool {
        // SAFETY: as in `get`.
        unsafe { (*self.world).has_component::<T>(self.entity) }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        // SAFETY: as in `get`.
        unsafe { (*self.world).has_tag(self.entity, tag) }
    }

    /// Entity-manager access, e.g. for
    /// [`CommandBuffer::create`](crate::command::CommandBuffer::create)
    /// from inside an iteration.
    pub fn entities(&self) -> &crate::entity::EntityManager {
        // SAFETY: shared access; reservation is interior-locked and
        // non-structural.
        unsafe { (*self.world).entities() }
    }
}

/// Read-only view of one contiguous run of admitted rows.
pub struct ChunkView<'w> {
    arch: &'w Archetype,
    start: usize,
    end: usize,
}

impl<'w> ChunkView<'w> {
    /// Canonical key of the backing archetype's signature.
    pub fn archetype_key(&self) -> String {
        self.arch.key()
    }

    pub fn start_row(&self) -> usize {
        self.start
    }

    pub fn end_row(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn entities(&self) -> &'w [Entity] {
        &self.arch.entities()[self.start..self.end]
    }

    /// Typed slice over this run; `None` when the archetype lacks the
    /// column (optional types included).
    pub fn column<T: Component>(&self) -> Option<&'w [T]> {
        let type_id = component::lookup::<T>()?;
        let col = self.arch.typed::<T>(type_id)?;
        Some(&col.slice()[self.start..self.end])
    }
}
