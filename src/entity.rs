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

//! Entity handles and the slot allocator.
//!
//! An [`Entity`] packs a 28-bit slot index and a 20-bit generation into one
//! 48-bit value. A handle is alive only while its slot is live and the stored
//! generation matches; destroying a slot bumps the generation, so every
//! outstanding copy of the old handle goes stale at once.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const INDEX_BITS: u32 = 28;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << 20) - 1;

/// Packed entity handle. Value `0` is the null / root sentinel.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Entity(u64);

impl Entity {
    /// The reserved "no entity" handle.
    pub const NULL: Entity = Entity(0);

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        debug_assert!(u64::from(index) <= INDEX_MASK);
        Entity(u64::from(index) | (u64::from(generation & GENERATION_MASK) << INDEX_BITS))
    }

    /// Slot index (low 28 bits).
    pub fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    /// Generation counter (high 20 bits).
    pub fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) as u32 & GENERATION_MASK
    }

    /// Raw 48-bit value.
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from its raw value. Does not validate liveness.
    pub fn from_bits(bits: u64) -> Self {
        Entity(bits)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Slot states and the free list.
///
/// Three parallel arrays indexed by slot: generation, alive flag, enabled
/// flag. Freed slots are recycled LIFO. Slot 0 is never handed out so that
/// the zero handle stays a sentinel.
pub struct EntityManager {
    generations: Vec<u32>,
    alive: Vec<u8>,
    enabled: Vec<u8>,
    cursor: Mutex<AllocCursor>,
    alive_count: u32,
}

struct AllocCursor {
    free: Vec<u32>,
    next_index: u32,
}

impl EntityManager {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            enabled: Vec::new(),
            cursor: Mutex::new(AllocCursor {
                free: Vec::new(),
                next_index: 1,
            }),
            alive_count: 0,
        }
    }

    fn ensure_slot(&mut self, index: u32) {
        let needed = index as usize + 1;
        if self.generations.len() < needed {
            // Double to amortize growth; existing contents are untouched.
            let target = needed.max(self.generations.len() * 2).max(64);
            self.generations.resize(target, 0);
            self.alive.resize(target, 0);
            self.enabled.resize(target, 0);
        }
    }

    fn alloc_slot(&self) -> u32 {
        let mut cursor = self.cursor.lock();
        cursor.free.pop().unwrap_or_else(|| {
            let index = cursor.next_index;
            cursor.next_index += 1;
            index
        })
    }

    /// Allocate and activate a fresh handle.
    pub fn create(&mut self, enabled: bool) -> Entity {
        let index = self.alloc_slot();
        self.activate_slot(index, enabled)
    }

    fn activate_slot(&mut self, index: u32, enabled: bool) -> Entity {
        self.ensure_slot(index);
        let generation = self.generations[index as usize];
        self.alive[index as usize] = 1;
        self.enabled[index as usize] = u8::from(enabled);
        self.alive_count += 1;
        Entity::new(index, generation)
    }

    /// Hand out a real handle without activating it.
    ///
    /// The slot is taken off the free list immediately so nothing else can
    /// claim it, but the handle is not alive until
    /// [`EntityManager::activate`] runs. Command buffers use this so a
    /// deferred create can be referenced before its flush. A reservation
    /// that is never activated leaks its slot.
    pub fn reserve(&self) -> Entity {
        let mut cursor = self.cursor.lock();
        let index = cursor.free.pop().unwrap_or_else(|| {
            let index = cursor.next_index;
            cursor.next_index += 1;
            index
        });
        let generation = self.generations.get(index as usize).copied().unwrap_or(0);
        Entity::new(index, generation)
    }

    /// Activate a reserved handle. Returns `false` if the handle went stale
    /// or was already activated.
    pub fn activate(&mut self, entity: Entity, enabled: bool) -> bool {
        self.ensure_slot(entity.index());
        let index = entity.index() as usize;
        if self.alive[index] == 1 || self.generations[index] != entity.generation() {
            return false;
        }
        self.alive[index] = 1;
        self.enabled[index] = u8::from(enabled);
        self.alive_count += 1;
        true
    }

    /// Destroy a handle. Returns `false` on a stale or dead handle.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let index = entity.index() as usize;
        self.alive[index] = 0;
        self.enabled[index] = 0;
        self.generations[index] = (self.generations[index] + 1) & GENERATION_MASK;
        self.alive_count -= 1;
        self.cursor.get_mut().free.push(entity.index());
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        let index = entity.index() as usize;
        index < self.generations.len()
            && self.alive[index] == 1
            && self.generations[index] == entity.generation()
    }

    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.is_alive(entity) && self.enabled[entity.index() as usize] == 1
    }

    /// Flip the enabled flag. Returns `false` on a stale handle.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        self.enabled[entity.index() as usize] = u8::from(enabled);
        true
    }

    pub fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Live handle occupying `slot`, if any.
    pub fn entity_at(&self, slot: u32) -> Option<Entity> {
        let index = slot as usize;
        (index < self.alive.len() && self.alive[index] == 1)
            .then(|| Entity::new(slot, self.generations[index]))
    }

    /// Upper bound (exclusive) over slot indices in use.
    pub fn slot_bound(&self) -> u32 {
        self.cursor.lock().next_index
    }

    pub fn clear(&mut self) {
        self.generations.clear();
        self.alive.clear();
        self.enabled.clear();
        let cursor = self.cursor.get_mut();
        cursor.free.clear();
        cursor.next_index = 1;
        self.alive_count = 0;
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}
