//! Introspection, invariant checks, and the deterministic frame hash.

use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use rustc_hash::FxHasher;

use crate::error::{EcsError, Result};
use crate::world::World;

/// Point-in-time counters for hosts and debug overlays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldStats {
    pub frame: u32,
    pub entities: u32,
    pub archetypes: usize,
    pub archetype_version: u64,
    pub pending_added_events: usize,
    pub pending_removed_events: usize,
    pub diagnostics: usize,
}

impl World {
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            frame: self.frame(),
            entities: self.alive_count(),
            archetypes: self.archetype_count(),
            archetype_version: self.archetypes().version(),
            pending_added_events: self.added_channel().len(),
            pending_removed_events: self.removed_channel().len(),
            diagnostics: self.diagnostics().len(),
        }
    }

    /// Debug invariant check over the storage: column lengths, location
    /// round-trips, and single-archetype membership. An `Err` means the
    /// world is corrupt and the current tick must not continue.
    pub fn verify(&self) -> Result<()> {
        let mut seen: AHashMap<u64, u32> = AHashMap::new();
        for (arch_id, arch) in self.archetypes().iter() {
            if !arch.check_columns() {
                return Err(EcsError::Corrupt(format!(
                    "archetype {arch_id}: column length != entity count"
                )));
            }
            for (row, &entity) in arch.entities().iter().enumerate() {
                if !self.is_alive(entity) {
                    return Err(EcsError::Corrupt(format!(
                        "archetype {arch_id} row {row} holds dead entity {entity}"
                    )));
                }
                if let Some(previous) = seen.insert(entity.to_bits(), arch_id) {
                    return Err(EcsError::Corrupt(format!(
                        "entity {entity} in archetypes {previous} and {arch_id}"
                    )));
                }
                let location = self.location(entity).ok_or_else(|| {
                    EcsError::Corrupt(format!("entity {entity} has no location"))
                })?;
                if location.archetype != arch_id || location.row as usize != row {
                    return Err(EcsError::Corrupt(format!(
                        "entity {entity} location ({}, {}) != actual ({arch_id}, {row})",
                        location.archetype, location.row
                    )));
                }
            }
        }
        Ok(())
    }

    /// Deterministic hash of the world's observable state: live entities in
    /// slot order, their component type sets, serde-registered component
    /// payloads, and tags. Bit-identical across replays of the same inputs.
    pub fn frame_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.frame().hash(&mut hasher);
        for slot in 1..self.entities().slot_bound() {
            let Some(entity) = self.entities().entity_at(slot) else {
                continue;
            };
            entity.to_bits().hash(&mut hasher);
            self.entities().is_enabled(entity).hash(&mut hasher);
            for type_id in self.component_types_of(entity) {
                type_id.get().hash(&mut hasher);
                if let Some(value) = self.component_any(entity, type_id) {
                    if let Some(Ok(encoded)) =
                        self.serde_registry().serialize_value(type_id, value)
                    {
                        // serde_json maps are ordered, so the string form is
                        // canonical.
                        encoded.to_string().hash(&mut hasher);
                    }
                }
            }
            let mut tags = self.tag_store().tags_of(entity);
            tags.sort_unstable();
            for tag in tags {
                tag.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}
