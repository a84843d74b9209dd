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

//! Parent/child hierarchy index.
//!
//! The index is a world resource external to the entities: `children` maps a
//! parent to its child list, `parent_of` maps a child to its parent, and the
//! null entity is the root. Links reject self-parenting and cycles; parent
//! walks are capped so malformed data fails loudly instead of spinning.

use ahash::AHashMap;

use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::world::World;

/// Hard cap on parent-walk depth.
pub const MAX_HIERARCHY_DEPTH: usize = 1000;

/// Parent relationship component. The null entity parents to the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Parent(pub Entity);

/// Dead-parent reconciliation policy, applied by the sync system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HierarchyPolicy {
    /// Rebind orphaned children to the root.
    #[default]
    DetachToRoot,
    /// Destroy orphaned children.
    DestroyChildren,
}

/// Parent ↔ children map resource.
#[derive(Default)]
pub struct ChildrenIndex {
    children: AHashMap<Entity, Vec<Entity>>,
    parent_of: AHashMap<Entity, Entity>,
}

impl ChildrenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexed parent of `child`. `Some(NULL)` means bound to root; `None`
    /// means not indexed at all.
    pub fn parent_of(&self, child: Entity) -> Option<Entity> {
        self.parent_of.get(&child).copied()
    }

    pub fn children_of(&self, parent: Entity) -> &[Entity] {
        self.children
            .get(&parent)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Bind `child` under `parent` (null = root), unlinking any previous
    /// binding. Rejects self-links and cycles before mutating anything.
    pub fn link(&mut self, child: Entity, parent: Entity) -> Result<()> {
        if child == parent {
            return Err(EcsError::CycleInHierarchy { child, parent });
        }
        if !parent.is_null() {
            let mut cursor = parent;
            let mut depth = 0usize;
            while !cursor.is_null() {
                if cursor == child {
                    return Err(EcsError::CycleInHierarchy { child, parent });
                }
                cursor = self.parent_of.get(&cursor).copied().unwrap_or(Entity::NULL);
                depth += 1;
                if depth > MAX_HIERARCHY_DEPTH {
                    return Err(EcsError::HierarchyCorrupt(child));
                }
            }
        }
        self.unlink(child);
        self.children.entry(parent).or_default().push(child);
        self.parent_of.insert(child, parent);
        Ok(())
    }

    /// Detach `child` from its parent. Returns the old parent, if any.
    pub fn unlink(&mut self, child: Entity) -> Option<Entity> {
        let parent = self.parent_of.remove(&child)?;
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|&c| c != child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
        Some(parent)
    }

    /// Atomically detach and return every child of `parent`.
    pub fn take_children_of(&mut self, parent: Entity) -> Vec<Entity> {
        let children = self.children.remove(&parent).unwrap_or_default();
        for child in &children {
            self.parent_of.remove(child);
        }
        children
    }

    /// Depth of `child` above the root. Errors past the cap.
    pub fn depth_of(&self, child: Entity) -> Result<usize> {
        let mut cursor = child;
        let mut depth = 0usize;
        while let Some(&parent) = self.parent_of.get(&cursor) {
            if parent.is_null() {
                return Ok(depth + 1);
            }
            cursor = parent;
            depth += 1;
            if depth > MAX_HIERARCHY_DEPTH {
                return Err(EcsError::HierarchyCorrupt(child));
            }
        }
        Ok(depth)
    }

    /// Parents currently holding children (root excluded).
    pub fn parents(&self) -> impl Iterator<Item = Entity> + '_ {
        self.children.keys().copied().filter(|p| !p.is_null())
    }

    pub fn len(&self) -> usize {
        self.parent_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent_of.is_empty()
    }

    pub fn clear(&mut self) {
        self.children.clear();
        self.parent_of.clear();
    }

    /// Both maps must mirror each other.
    pub fn check_consistency(&self) -> bool {
        self.parent_of.iter().all(|(child, parent)| {
            self.children
                .get(parent)
                .is_some_and(|siblings| siblings.contains(child))
        }) && self
            .children
            .iter()
            .all(|(parent, siblings)| {
                siblings
                    .iter()
                    .all(|child| self.parent_of.get(child) == Some(parent))
            })
    }
}

impl World {
    /// Bind `child` under `parent` immediately: updates the index resource
    /// and the `Parent` component. A dead or null parent binds to root.
    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> Result<()> {
        if !self.is_alive(child) {
            return Err(EcsError::InvalidHandle(child));
        }
        let parent = if parent.is_null() || !self.is_alive(parent) {
            Entity::NULL
        } else {
            parent
        };
        self.get_or_create_resource::<ChildrenIndex>()
            .link(child, parent)?;
        self.add_component(child, Parent(parent))
    }

    /// Indexed parent of `child`; root is the null entity.
    pub fn parent_of(&self, child: Entity) -> Entity {
        self.get_resource::<ChildrenIndex>()
            .and_then(|index| index.parent_of(child))
            .unwrap_or(Entity::NULL)
    }

    pub fn children_of(&self, parent: Entity) -> Vec<Entity> {
        self.get_resource::<ChildrenIndex>()
            .map(|index| index.children_of(parent).to_vec())
            .unwrap_or_default()
    }
}
