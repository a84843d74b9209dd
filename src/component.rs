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

//! Component trait and the process-wide type registry.
//!
//! Components are plain data attached to entities. Every component type gets
//! a stable small integer [`ComponentTypeId`] on first registration; ids are
//! assigned in registration order, id `0` is reserved, and explicit ids may
//! be claimed for persistence stability. Lookup is bidirectional.

use std::any::TypeId;
use std::sync::LazyLock;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnVec};
use crate::error::{EcsError, Result};
use crate::sparse::{SparseColumn, SparseSet};

/// Marker trait for components.
///
/// Components must be `'static` (no borrowed data).
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Small integer id of a registered component type. Id `0` is reserved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Bit index used in signature bitsets.
    pub fn bit(self) -> usize {
        self.0 as usize
    }

    /// Rebuild from a raw id. Returns `None` for the reserved id `0`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(ComponentTypeId(raw))
    }
}

/// Where values of a component type are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Columnar, inside the archetype matching the entity's signature.
    #[default]
    Archetype,
    /// Per-type sparse set, outside archetypes.
    Sparse,
}

/// Registered component type record.
#[derive(Clone)]
pub struct TypeInfo {
    pub id: ComponentTypeId,
    pub name: String,
    /// Absent for shell types registered by id only.
    pub rust_id: Option<TypeId>,
    pub storage: StorageKind,
    pub(crate) new_column: Option<fn() -> Box<dyn Column>>,
    pub(crate) new_sparse: Option<fn() -> Box<dyn SparseColumn>>,
}

impl TypeInfo {
    /// A shell type carries an id but no constructor; it can only be used
    /// for id-based reference in deferred operations.
    pub fn is_shell(&self) -> bool {
        self.rust_id.is_none()
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("shell", &self.is_shell())
            .finish()
    }
}

struct RegistryInner {
    by_rust: AHashMap<TypeId, ComponentTypeId>,
    by_name: AHashMap<String, ComponentTypeId>,
    infos: AHashMap<u32, TypeInfo>,
    next_id: u32,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            by_rust: AHashMap::new(),
            by_name: AHashMap::new(),
            infos: AHashMap::new(),
            next_id: 1,
        }
    }

    fn take_next_id(&mut self) -> u32 {
        while self.infos.contains_key(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

static REGISTRY: LazyLock<RwLock<RegistryInner>> =
    LazyLock::new(|| RwLock::new(RegistryInner::new()));

fn make_column<T: Component>() -> Box<dyn Column> {
    Box::new(ColumnVec::<T>::new())
}

fn make_sparse<T: Component>() -> Box<dyn SparseColumn> {
    Box::new(SparseSet::<T>::new())
}

/// Short type name without the module path.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn register_inner<T: Component>(
    explicit_id: Option<u32>,
    storage: StorageKind,
) -> Result<ComponentTypeId> {
    let rust_id = TypeId::of::<T>();
    let mut reg = REGISTRY.write();

    if let Some(&existing) = reg.by_rust.get(&rust_id) {
        // Idempotent per constructor, but an explicit id must agree.
        if let Some(id) = explicit_id {
            if id != existing.get() {
                let name = reg
                    .infos
                    .get(&existing.get())
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                return Err(EcsError::IdCollision { id, existing: name });
            }
        }
        return Ok(existing);
    }

    let raw = match explicit_id {
        Some(id) => {
            if id == 0 {
                return Err(EcsError::IdCollision {
                    id,
                    existing: "reserved".to_string(),
                });
            }
            if let Some(taken) = reg.infos.get(&id) {
                return Err(EcsError::IdCollision {
                    id,
                    existing: taken.name.clone(),
                });
            }
            id
        }
        None => reg.take_next_id(),
    };

    let id = ComponentTypeId(raw);
    let info = TypeInfo {
        id,
        name: short_type_name::<T>().to_string(),
        rust_id: Some(rust_id),
        storage,
        new_column: Some(make_column::<T>),
        new_sparse: Some(make_sparse::<T>),
    };
    reg.by_rust.insert(rust_id, id);
    reg.by_name.insert(info.name.clone(), id);
    reg.infos.insert(raw, info);
    Ok(id)
}

/// Register a component type, assigning the next free id. Idempotent.
pub fn register<T: Component>() -> ComponentTypeId {
    register_inner::<T>(None, StorageKind::Archetype)
        .expect("auto-id registration cannot collide")
}

/// Register with an explicit id for persistence stability.
pub fn register_with_id<T: Component>(id: u32) -> Result<ComponentTypeId> {
    register_inner::<T>(Some(id), StorageKind::Archetype)
}

/// Register a type whose values live in the sparse-set store instead of
/// archetype columns.
pub fn register_sparse<T: Component>() -> ComponentTypeId {
    register_inner::<T>(None, StorageKind::Sparse)
        .expect("auto-id registration cannot collide")
}

/// Id of `T`, auto-registering on first use.
pub fn type_id<T: Component>() -> ComponentTypeId {
    if let Some(id) = lookup::<T>() {
        return id;
    }
    register::<T>()
}

/// Id of `T` if already registered.
pub fn lookup<T: Component>() -> Option<ComponentTypeId> {
    REGISTRY.read().by_rust.get(&TypeId::of::<T>()).copied()
}

/// Full record for an id.
pub fn info(id: ComponentTypeId) -> Option<TypeInfo> {
    REGISTRY.read().infos.get(&id.get()).cloned()
}

/// Registered name for an id.
pub fn name_of(id: ComponentTypeId) -> Option<String> {
    REGISTRY.read().infos.get(&id.get()).map(|i| i.name.clone())
}

/// Id registered under `name`.
pub fn by_name(name: &str) -> Option<ComponentTypeId> {
    REGISTRY.read().by_name.get(name).copied()
}

/// Resolve an id to a type record, creating a shell entry if the id was
/// never registered. Shell types have no constructor and can only be used
/// for id-based reference in deferred operations.
pub fn type_from_id(raw: u32) -> Option<ComponentTypeId> {
    let id = ComponentTypeId::from_raw(raw)?;
    {
        let reg = REGISTRY.read();
        if reg.infos.contains_key(&raw) {
            return Some(id);
        }
    }
    let mut reg = REGISTRY.write();
    reg.infos.entry(raw).or_insert_with(|| TypeInfo {
        id,
        name: format!("#{raw}"),
        rust_id: None,
        storage: StorageKind::Archetype,
        new_column: None,
        new_sparse: None,
    });
    Some(id)
}

/// Wipe the registry. Test-only escape hatch; production callers never
/// reset, and concurrently running worlds would be corrupted by it.
#[doc(hidden)]
pub fn reset_registry() {
    *REGISTRY.write() = RegistryInner::new();
}
