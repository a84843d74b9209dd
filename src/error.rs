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

//! Error types

use std::fmt;

use crate::entity::Entity;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Operation on a handle whose generation no longer matches or whose slot is dead
    InvalidHandle(Entity),

    /// Structural mutation attempted while a query iteration is in progress
    StructuralChangeDuringIteration,

    /// Explicit component type id conflicts with an existing registration
    IdCollision { id: u32, existing: String },

    /// Component type used before registration, or a shell type with no constructor
    NotRegistered(String),

    /// Value handed to a column does not match the column's component type
    TypeMismatch { expected: &'static str },

    /// Component not present on the entity
    ComponentNotFound,

    /// Spawn requested for an unknown prefab id
    PrefabNotFound(String),

    /// Link would create a cycle, or the entity would parent itself
    CycleInHierarchy { child: Entity, parent: Entity },

    /// Parent walk exceeded the depth cap; the index is malformed
    HierarchyCorrupt(Entity),

    /// Save/load touched a component type without a registered codec
    SerdeMissing(String),

    /// Save format version unknown to the loader
    VersionMismatch { found: u32, expected: u32 },

    /// Codec failure during save or load
    Serialization(String),

    /// Invariant violation caught by `verify()`; the world is corrupt
    Corrupt(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidHandle(e) => write!(f, "Invalid entity handle {e}"),
            EcsError::StructuralChangeDuringIteration => {
                write!(f, "Structural change attempted during query iteration")
            }
            EcsError::IdCollision { id, existing } => {
                write!(f, "Component type id {id} already registered for {existing}")
            }
            EcsError::NotRegistered(name) => write!(f, "Component type not registered: {name}"),
            EcsError::TypeMismatch { expected } => {
                write!(f, "Value does not match column type {expected}")
            }
            EcsError::ComponentNotFound => write!(f, "Component not found"),
            EcsError::PrefabNotFound(id) => write!(f, "Prefab not found: {id}"),
            EcsError::CycleInHierarchy { child, parent } => {
                write!(f, "Linking {child} under {parent} would create a cycle")
            }
            EcsError::HierarchyCorrupt(e) => {
                write!(f, "Parent walk from {e} exceeded the depth cap")
            }
            EcsError::SerdeMissing(name) => write!(f, "No codec registered for {name}"),
            EcsError::VersionMismatch { found, expected } => {
                write!(f, "Save format version {found} (loader expects {expected})")
            }
            EcsError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            EcsError::Corrupt(msg) => write!(f, "World corrupt: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
