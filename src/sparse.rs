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

//! Sparse-set component store.
//!
//! Fallback per-type storage for component types registered with
//! [`StorageKind::Sparse`](crate::component::StorageKind). A sparse array
//! maps entity slots to dense rows; dense arrays hold the slot, the value,
//! and the frame of the last write. All of add/remove/has/get are O(1) and
//! removal swap-packs the dense arrays.

use std::any::Any;

use crate::column::BoxedValue;
use crate::error::{EcsError, Result};

const NONE: u32 = u32::MAX;

/// Type-erased view of one sparse store, for the dynamic world paths.
pub trait SparseColumn: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has(&self, slot: u32) -> bool;

    fn insert(&mut self, slot: u32, value: BoxedValue, frame: u32) -> Result<()>;

    fn remove(&mut self, slot: u32) -> Option<BoxedValue>;

    fn row_any(&self, slot: u32) -> Option<&dyn Any>;

    fn row_any_mut(&mut self, slot: u32) -> Option<&mut dyn Any>;

    /// Frame of the slot's last write.
    fn write_frame(&self, slot: u32) -> Option<u32>;

    fn mark_written(&mut self, slot: u32, frame: u32);

    /// Dense slot list, insertion order as modified by swap-removes.
    fn slots(&self) -> &[u32];

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense+sparse array pair for one component type.
pub struct SparseSet<T> {
    sparse: Vec<u32>,
    slots: Vec<u32>,
    values: Vec<T>,
    write_frames: Vec<u32>,
}

impl<T: 'static + Send + Sync> SparseSet<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            slots: Vec::new(),
            values: Vec::new(),
            write_frames: Vec::new(),
        }
    }

    fn dense_index(&self, slot: u32) -> Option<usize> {
        match self.sparse.get(slot as usize) {
            Some(&idx) if idx != NONE => Some(idx as usize),
            _ => None,
        }
    }

    /// Insert or overwrite. Overwrite keeps the dense position.
    pub fn insert_value(&mut self, slot: u32, value: T, frame: u32) {
        if let Some(idx) = self.dense_index(slot) {
            self.values[idx] = value;
            self.write_frames[idx] = frame;
            return;
        }
        if self.sparse.len() <= slot as usize {
            self.sparse.resize(slot as usize + 1, NONE);
        }
        self.sparse[slot as usize] = self.slots.len() as u32;
        self.slots.push(slot);
        self.values.push(value);
        self.write_frames.push(frame);
    }

    pub fn remove_value(&mut self, slot: u32) -> Option<T> {
        let idx = self.dense_index(slot)?;
        let last = self.slots.len() - 1;
        let value = self.values.swap_remove(idx);
        self.slots.swap_remove(idx);
        self.write_frames.swap_remove(idx);
        if idx < last {
            let moved_slot = self.slots[idx];
            self.sparse[moved_slot as usize] = idx as u32;
        }
        self.sparse[slot as usize] = NONE;
        Some(value)
    }

    pub fn get(&self, slot: u32) -> Option<&T> {
        self.dense_index(slot).map(|idx| &self.values[idx])
    }

    pub fn get_mut(&mut self, slot: u32, frame: u32) -> Option<&mut T> {
        let idx = self.dense_index(slot)?;
        self.write_frames[idx] = frame;
        Some(&mut self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots.iter().copied().zip(self.values.iter())
    }
}

impl<T: 'static + Send + Sync> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static + Send + Sync> SparseColumn for SparseSet<T> {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn has(&self, slot: u32) -> bool {
        self.dense_index(slot).is_some()
    }

    fn insert(&mut self, slot: u32, value: BoxedValue, frame: u32) -> Result<()> {
        let value = value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        self.insert_value(slot, *value, frame);
        Ok(())
    }

    fn remove(&mut self, slot: u32) -> Option<BoxedValue> {
        self.remove_value(slot).map(|v| Box::new(v) as BoxedValue)
    }

    fn row_any(&self, slot: u32) -> Option<&dyn Any> {
        self.get(slot).map(|v| v as &dyn Any)
    }

    fn row_any_mut(&mut self, slot: u32) -> Option<&mut dyn Any> {
        let idx = self.dense_index(slot)?;
        Some(&mut self.values[idx] as &mut dyn Any)
    }

    fn write_frame(&self, slot: u32) -> Option<u32> {
        self.dense_index(slot).map(|idx| self.write_frames[idx])
    }

    fn mark_written(&mut self, slot: u32, frame: u32) {
        if let Some(idx) = self.dense_index(slot) {
            self.write_frames[idx] = frame;
        }
    }

    fn slots(&self) -> &[u32] {
        &self.slots
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut set = SparseSet::<&'static str>::new();
        set.insert_value(4, "a", 1);
        set.insert_value(9, "b", 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(4), Some(&"a"));
        assert!(set.has(9));
        assert!(!set.has(5));

        assert_eq!(set.remove_value(4), Some("a"));
        assert!(!set.has(4));
        assert_eq!(set.get(9), Some(&"b"));
        assert_eq!(set.remove_value(4), None);
    }

    #[test]
    fn swap_remove_keeps_dense_packing() {
        let mut set = SparseSet::<u32>::new();
        for slot in [2, 7, 11, 30] {
            set.insert_value(slot, slot * 10, 1);
        }
        set.remove_value(2);
        assert_eq!(set.len(), 3);
        // The last dense entry moved into the hole.
        assert_eq!(set.slots()[0], 30);
        assert_eq!(set.get(30), Some(&300));
        assert_eq!(set.get(7), Some(&70));
    }

    #[test]
    fn overwrite_updates_write_frame() {
        let mut set = SparseSet::<u32>::new();
        set.insert_value(1, 5, 3);
        assert_eq!(set.write_frame(1), Some(3));
        set.insert_value(1, 6, 8);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(1), Some(&6));
        assert_eq!(set.write_frame(1), Some(8));
        set.get_mut(1, 9);
        assert_eq!(set.write_frame(1), Some(9));
    }
}
