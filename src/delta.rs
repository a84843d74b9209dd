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

//! Incremental added/removed/changed notifications for queries.
//!
//! A query that enables its delta feed registers a sink with the world. The
//! world notifies sinks on every add/remove/change whose type is relevant to
//! the sink; the sink accumulates three deduplicated entity sets under a
//! combined cap. On overflow everything is dropped and a flag is raised —
//! the consumer must fall back to a full scan.

use std::sync::{Arc, Weak};

use ahash::AHashSet;
use parking_lot::Mutex;

use crate::bitset::BitSet;
use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// Combined default cap over the three delta sets.
pub const DEFAULT_DELTA_CAPACITY: usize = 10_000;

/// Drained delta feed. Entity lists are sorted for reproducible consumption.
#[derive(Debug, Default)]
pub struct QueryDelta {
    pub added: Vec<Entity>,
    pub removed: Vec<Entity>,
    pub changed: Vec<Entity>,
    /// True when the cap was hit since the last consume; the sets are empty
    /// and the consumer must perform a full scan.
    pub overflowed: bool,
}

#[derive(Clone, Copy)]
pub(crate) enum DeltaKind {
    Added,
    Removed,
    Changed,
}

#[derive(Default)]
struct DeltaState {
    added: AHashSet<Entity>,
    removed: AHashSet<Entity>,
    changed: AHashSet<Entity>,
    overflowed: bool,
}

impl DeltaState {
    fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Accumulator shared between one query and the world.
pub(crate) struct DeltaSink {
    mask: BitSet,
    capacity: usize,
    state: Mutex<DeltaState>,
}

impl DeltaSink {
    pub(crate) fn new(mask: BitSet, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            mask,
            capacity: capacity.max(1),
            state: Mutex::new(DeltaState::default()),
        })
    }

    fn notify(&self, kind: DeltaKind, entity: Entity, type_id: ComponentTypeId) {
        if !self.mask.is_empty() && !self.mask.contains(type_id.bit()) {
            return;
        }
        let mut state = self.state.lock();
        if state.overflowed {
            // Nothing accumulates past an overflow until the consumer drains.
            return;
        }
        match kind {
            DeltaKind::Added => state.added.insert(entity),
            DeltaKind::Removed => state.removed.insert(entity),
            DeltaKind::Changed => state.changed.insert(entity),
        };
        if state.total() > self.capacity {
            state.added.clear();
            state.removed.clear();
            state.changed.clear();
            state.overflowed = true;
            tracing::debug!(capacity = self.capacity, "query delta overflowed");
        }
    }

    pub(crate) fn consume(&self) -> QueryDelta {
        let mut state = self.state.lock();
        let mut sorted = |set: &mut AHashSet<Entity>| {
            let mut v: Vec<Entity> = set.drain().collect();
            v.sort_unstable();
            v
        };
        let delta = QueryDelta {
            added: sorted(&mut state.added),
            removed: sorted(&mut state.removed),
            changed: sorted(&mut state.changed),
            overflowed: state.overflowed,
        };
        state.overflowed = false;
        delta
    }
}

/// World-side fan-out of component events to registered sinks.
#[derive(Default)]
pub(crate) struct DeltaBus {
    sinks: Vec<Weak<DeltaSink>>,
}

impl DeltaBus {
    pub(crate) fn register(&mut self, sink: &Arc<DeltaSink>) {
        self.sinks.retain(|s| s.strong_count() > 0);
        self.sinks.push(Arc::downgrade(sink));
    }

    pub(crate) fn notify(&self, kind: DeltaKind, entity: Entity, type_id: ComponentTypeId) {
        for weak in &self.sinks {
            if let Some(sink) = weak.upgrade() {
                sink.notify(kind, entity, type_id);
            }
        }
    }
}
