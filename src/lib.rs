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

//! NovaECS - Entity Component System runtime
//!
//! Archetype-based columnar storage with change tracking, deferred command
//! buffers, prefab batch instantiation, a parent/child hierarchy index, and
//! a deterministic fixed-timestep scheduler.

pub mod archetype;
pub mod bitset;
pub mod column;
pub mod command;
pub mod component;
pub mod debug;
pub mod delta;
pub mod diagnostics;
pub mod entity;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod hierarchy_system;
pub mod prefab;
pub mod query;
pub mod rng;
pub mod schedule;
pub mod serialization;
pub mod sparse;
pub mod system;
pub mod tag;
pub mod time;
pub mod world;

pub mod prelude;

// Re-exports for convenience
pub use archetype::{Archetype, ArchetypeIndex};
pub use bitset::BitSet;
pub use command::CommandBuffer;
pub use component::{Component, ComponentTypeId, StorageKind};
pub use debug::WorldStats;
pub use delta::{QueryDelta, DEFAULT_DELTA_CAPACITY};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use entity::{Entity, EntityManager};
pub use error::{EcsError, Result};
pub use event::{ComponentEvent, EventChannel};
pub use hierarchy::{ChildrenIndex, HierarchyPolicy, Parent};
pub use hierarchy_system::HierarchySync;
pub use prefab::{Prefab, PrefabSpec, SpawnOptions};
pub use query::{ChunkView, Query, Row};
pub use rng::Pcg32;
pub use schedule::{Schedule, Stage};
pub use serialization::{Guid, LoadOptions, SerdeRegistry, WorldSave, SAVE_VERSION};
pub use system::{system, BoxedSystem, System, SystemContext};
pub use time::FixedTimestep;
pub use world::World;

#[cfg(test)]
mod tests;
