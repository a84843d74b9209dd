//! Convenience re-exports for host code.

pub use crate::command::CommandBuffer;
pub use crate::component::{self, Component, ComponentTypeId, StorageKind};
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::hierarchy::{ChildrenIndex, HierarchyPolicy, Parent};
pub use crate::hierarchy_system::HierarchySync;
pub use crate::prefab::{PrefabSpec, SpawnOptions};
pub use crate::query::Query;
pub use crate::rng::Pcg32;
pub use crate::schedule::{Schedule, Stage};
pub use crate::serialization::{Guid, LoadOptions, SerdeRegistry, WorldSave, SAVE_VERSION};
pub use crate::system::{system, System, SystemContext};
pub use crate::time::FixedTimestep;
pub use crate::world::World;
