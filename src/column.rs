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

//! Type-erased component columns.
//!
//! An archetype stores one column per component type. The [`Column`] trait
//! is the capability surface the dynamic paths dispatch through: boxed
//! push/remove for command buffers and archetype transitions, per-row write
//! epochs and a per-frame write mask for change detection, and `Any`
//! downcasts to the concrete [`ColumnVec`] for typed row and slice access.

use std::any::Any;

use crate::bitset::BitSet;
use crate::error::{EcsError, Result};

/// Boxed component value moving through a dynamic path.
pub type BoxedValue = Box<dyn Any + Send + Sync>;

/// A value pulled out of a column, with its change-tracking state, so a
/// transition to another archetype does not forge or lose a write.
pub struct MovedValue {
    pub value: BoxedValue,
    pub epoch: u32,
    pub written: bool,
}

/// Capability surface of one archetype column.
pub trait Column: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a freshly added value; stamps the current frame.
    fn push(&mut self, value: BoxedValue, frame: u32) -> Result<()>;

    /// Append a value moved from another archetype, preserving its epoch and
    /// write-mask state.
    fn push_moved(&mut self, moved: MovedValue) -> Result<()>;

    /// Overwrite the row's value; stamps the current frame.
    fn replace(&mut self, row: usize, value: BoxedValue, frame: u32) -> Result<()>;

    /// Remove the row in O(1) by swapping the last row into its place.
    fn swap_remove(&mut self, row: usize) -> MovedValue;

    /// Fresh column of the same concrete type.
    fn clone_empty(&self) -> Box<dyn Column>;

    fn row_any(&self, row: usize) -> Option<&dyn Any>;

    /// Untracked mutable access; callers stamp via [`Column::mark_written`].
    fn row_any_mut(&mut self, row: usize) -> Option<&mut dyn Any>;

    /// Frame of the row's last mutation.
    fn epoch(&self, row: usize) -> u32;

    fn mark_written(&mut self, row: usize, frame: u32);

    /// True if the row was written in `frame` per either facility.
    fn changed_at(&self, row: usize, frame: u32) -> bool;

    /// Reset the per-frame write mask. Epochs are monotonic and survive.
    fn reset_write_mask(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense typed column: values, row epochs, and the frame's write mask.
pub struct ColumnVec<T> {
    values: Vec<T>,
    epochs: Vec<u32>,
    written: BitSet,
}

impl<T: 'static + Send + Sync> ColumnVec<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            epochs: Vec::new(),
            written: BitSet::new(),
        }
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    /// Mutable row access; stamps the epoch and write mask.
    pub fn get_mut(&mut self, row: usize, frame: u32) -> Option<&mut T> {
        if row < self.values.len() {
            self.epochs[row] = frame;
            self.written.set(row);
        }
        self.values.get_mut(row)
    }

    pub fn push_value(&mut self, value: T, frame: u32) {
        self.values.push(value);
        self.epochs.push(frame);
        self.written.set(self.values.len() - 1);
    }

    pub fn slice(&self) -> &[T] {
        &self.values
    }

    pub fn epochs(&self) -> &[u32] {
        &self.epochs
    }
}

impl<T: 'static + Send + Sync> Default for ColumnVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static + Send + Sync> Column for ColumnVec<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn push(&mut self, value: BoxedValue, frame: u32) -> Result<()> {
        self.push_moved(MovedValue {
            value,
            epoch: frame,
            written: true,
        })
    }

    fn push_moved(&mut self, moved: MovedValue) -> Result<()> {
        let value = moved.value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        self.values.push(*value);
        self.epochs.push(moved.epoch);
        if moved.written {
            self.written.set(self.values.len() - 1);
        }
        Ok(())
    }

    fn replace(&mut self, row: usize, value: BoxedValue, frame: u32) -> Result<()> {
        let value = value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        match self.values.get_mut(row) {
            Some(slot) => {
                *slot = *value;
                self.epochs[row] = frame;
                self.written.set(row);
                Ok(())
            }
            None => Err(EcsError::ComponentNotFound),
        }
    }

    fn swap_remove(&mut self, row: usize) -> MovedValue {
        let last = self.values.len() - 1;
        let value = self.values.swap_remove(row);
        let epoch = self.epochs.swap_remove(row);
        let written = self.written.contains(row);
        // Carry the swapped-in row's mask bit down, then drop the tail bit.
        if row < last {
            if self.written.contains(last) {
                self.written.set(row);
            } else {
                self.written.clear(row);
            }
        }
        self.written.clear(last);
        MovedValue {
            value: Box::new(value),
            epoch,
            written,
        }
    }

    fn clone_empty(&self) -> Box<dyn Column> {
        Box::new(ColumnVec::<T>::new())
    }

    fn row_any(&self, row: usize) -> Option<&dyn Any> {
        self.values.get(row).map(|v| v as &dyn Any)
    }

    fn row_any_mut(&mut self, row: usize) -> Option<&mut dyn Any> {
        self.values.get_mut(row).map(|v| v as &mut dyn Any)
    }

    fn epoch(&self, row: usize) -> u32 {
        self.epochs.get(row).copied().unwrap_or(0)
    }

    fn mark_written(&mut self, row: usize, frame: u32) {
        if row < self.epochs.len() {
            self.epochs[row] = frame;
            self.written.set(row);
        }
    }

    fn changed_at(&self, row: usize, frame: u32) -> bool {
        self.written.contains(row) || self.epochs.get(row).copied() == Some(frame)
    }

    fn reset_write_mask(&mut self) {
        self.written.clear_all();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
