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

//! Archetype storage and the signature-keyed archetype index.
//!
//! An archetype holds every entity whose component set equals one signature,
//! as Structure-of-Arrays columns. The index maps signatures to archetypes
//! and carries the structural version that query plans cache against.

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bitset::BitSet;
use crate::column::{Column, ColumnVec, MovedValue};
use crate::component::{self, ComponentTypeId};
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Storage bucket for one component signature.
pub struct Archetype {
    signature: BitSet,
    types: SmallVec<[ComponentTypeId; 8]>,
    entities: Vec<Entity>,
    cols: Vec<Box<dyn Column>>,
    col_index: FxHashMap<ComponentTypeId, usize>,
}

impl Archetype {
    /// Materialize an archetype for `signature`, scanning set bits in
    /// ascending order for the type list. Fails if any type id is a shell
    /// with no column constructor.
    pub fn new(signature: BitSet) -> Result<Self> {
        let mut types = SmallVec::new();
        let mut cols = Vec::new();
        let mut col_index = FxHashMap::default();
        for bit in signature.ones() {
            let type_id = ComponentTypeId::from_raw(bit as u32)
                .expect("signature bit 0 is never set");
            let info = component::info(type_id)
                .ok_or_else(|| EcsError::NotRegistered(format!("#{bit}")))?;
            let make = info
                .new_column
                .ok_or_else(|| EcsError::NotRegistered(info.name.clone()))?;
            col_index.insert(type_id, cols.len());
            types.push(type_id);
            cols.push(make());
        }
        Ok(Self {
            signature,
            types,
            entities: Vec::new(),
            cols,
            col_index,
        })
    }

    pub fn signature(&self) -> &BitSet {
        &self.signature
    }

    /// Canonical string of the signature words.
    pub fn key(&self) -> String {
        self.signature.key()
    }

    /// Sorted type-id list.
    pub fn types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_at(&self, row: usize) -> Option<Entity> {
        self.entities.get(row).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn has_type(&self, type_id: ComponentTypeId) -> bool {
        self.col_index.contains_key(&type_id)
    }

    pub fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.col_index.get(&type_id).copied()
    }

    pub fn column(&self, type_id: ComponentTypeId) -> Option<&dyn Column> {
        self.col_index.get(&type_id).map(|&i| self.cols[i].as_ref())
    }

    pub fn column_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut dyn Column> {
        let idx = *self.col_index.get(&type_id)?;
        Some(self.cols[idx].as_mut())
    }

    pub fn column_by_index(&self, index: usize) -> Option<&dyn Column> {
        self.cols.get(index).map(|c| c.as_ref())
    }

    pub fn column_by_index_mut(&mut self, index: usize) -> Option<&mut dyn Column> {
        if index < self.cols.len() {
            Some(self.cols[index].as_mut())
        } else {
            None
        }
    }

    /// Typed view of a column.
    pub fn typed<T: 'static + Send + Sync>(
        &self,
        type_id: ComponentTypeId,
    ) -> Option<&ColumnVec<T>> {
        self.column(type_id)?.as_any().downcast_ref::<ColumnVec<T>>()
    }

    pub fn typed_mut<T: 'static + Send + Sync>(
        &mut self,
        type_id: ComponentTypeId,
    ) -> Option<&mut ColumnVec<T>> {
        self.column_mut(type_id)?
            .as_any_mut()
            .downcast_mut::<ColumnVec<T>>()
    }

    /// Append the entity row. Every column must be filled by the caller
    /// before the next row operation; the world's transition paths do this.
    pub(crate) fn allocate_row(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Remove a row from every column in O(1), returning the moved values in
    /// type order and the entity that was swapped into `row`, if any.
    pub(crate) fn swap_remove_row(
        &mut self,
        row: usize,
    ) -> (SmallVec<[MovedValue; 8]>, Option<Entity>) {
        let mut moved = SmallVec::new();
        for col in &mut self.cols {
            moved.push(col.swap_remove(row));
        }
        self.entities.swap_remove(row);
        (moved, self.entities.get(row).copied())
    }

    pub(crate) fn reset_write_masks(&mut self) {
        for col in &mut self.cols {
            col.reset_write_mask();
        }
    }

    /// Storage-consistency check: every column as long as the entity array.
    pub fn check_columns(&self) -> bool {
        self.cols.iter().all(|c| c.len() == self.entities.len())
    }
}

/// Signature → archetype map with structural versioning.
///
/// Archetype ids are stable for the life of the archetype; cleanup
/// tombstones empty slots for reuse instead of shifting ids.
pub struct ArchetypeIndex {
    archetypes: Vec<Option<Archetype>>,
    by_key: AHashMap<BitSet, u32>,
    free: Vec<u32>,
    version: u64,
}

/// Id of the always-present empty archetype (entities with no components).
pub const EMPTY_ARCHETYPE: u32 = 0;

impl ArchetypeIndex {
    pub fn new() -> Self {
        let empty = Archetype::new(BitSet::new()).expect("empty signature has no types");
        let mut by_key = AHashMap::with_capacity(64);
        by_key.insert(BitSet::new(), EMPTY_ARCHETYPE);
        Self {
            archetypes: vec![Some(empty)],
            by_key,
            free: Vec::new(),
            version: 1,
        }
    }

    /// Archetype for `signature`, creating it if new. Creation increments
    /// the structural version.
    pub fn get_or_create(&mut self, signature: &BitSet) -> Result<u32> {
        if let Some(&id) = self.by_key.get(signature) {
            return Ok(id);
        }
        let archetype = Archetype::new(signature.clone())?;
        let id = match self.free.pop() {
            Some(id) => {
                self.archetypes[id as usize] = Some(archetype);
                id
            }
            None => {
                self.archetypes.push(Some(archetype));
                (self.archetypes.len() - 1) as u32
            }
        };
        self.by_key.insert(signature.clone(), id);
        self.version += 1;
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Option<&Archetype> {
        self.archetypes.get(id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id as usize)?.as_mut()
    }

    pub fn id_of(&self, signature: &BitSet) -> Option<u32> {
        self.by_key.get(signature).copied()
    }

    /// Two distinct archetypes mutably at once, for row moves.
    pub(crate) fn pair_mut(&mut self, a: u32, b: u32) -> (&mut Archetype, &mut Archetype) {
        debug_assert_ne!(a, b);
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (
                left[a].as_mut().expect("live archetype"),
                right[0].as_mut().expect("live archetype"),
            )
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (
                right[0].as_mut().expect("live archetype"),
                left[b].as_mut().expect("live archetype"),
            )
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Archetype)> {
        self.archetypes
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|a| (id as u32, a)))
    }

    /// Ids of archetypes whose signature contains all of `required` and none
    /// of `forbidden`, in ascending id order.
    pub fn matching(&self, required: &BitSet, forbidden: Option<&BitSet>) -> Vec<u32> {
        self.iter()
            .filter(|(_, arch)| {
                arch.signature().contains_all(required)
                    && forbidden.is_none_or(|f| !arch.signature().intersects(f))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of live archetypes.
    pub fn count(&self) -> usize {
        self.archetypes.iter().filter(|a| a.is_some()).count()
    }

    /// Structural version; bumps on archetype create/destroy. Row and value
    /// changes leave it untouched.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Garbage-collect empty archetypes (the empty archetype stays). Bumps
    /// the version when anything was removed.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for id in 1..self.archetypes.len() as u32 {
            let empty = self
                .archetypes[id as usize]
                .as_ref()
                .is_some_and(|a| a.is_empty());
            if empty {
                let arch = self.archetypes[id as usize].take().expect("checked above");
                self.by_key.remove(arch.signature());
                self.free.push(id);
                removed += 1;
            }
        }
        if removed > 0 {
            self.version += 1;
        }
        removed
    }

    /// Drop every archetype but keep the version monotonic, so query plans
    /// cached before the clear still rebuild.
    pub fn clear(&mut self) {
        let version = self.version;
        *self = Self::new();
        self.version = version + 1;
    }

    pub(crate) fn reset_write_masks(&mut self) {
        for slot in self.archetypes.iter_mut().flatten() {
            slot.reset_write_masks();
        }
    }
}

impl Default for ArchetypeIndex {
    fn default() -> Self {
        Self::new()
    }
}
