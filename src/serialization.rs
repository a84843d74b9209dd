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

//! World save/load and the component-serde registry.
//!
//! A save is `{ version, entities: [{ guid, components }], metadata }` with
//! component payloads encoded as JSON values. The serde registry maps type
//! ids to codecs; components without a codec are skipped with a warning.
//! Unknown save versions fail with `VersionMismatch` — migrations live
//! outside the core.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use rustc_hash::FxHasher;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::column::BoxedValue;
use crate::component::{self, Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::rng::Pcg32;
use crate::world::World;

/// Save format version this loader understands.
pub const SAVE_VERSION: u32 = 1;

/// Persistent 128-bit entity identity, serialized as 32 hex digits.
/// Uniqueness is probabilistic; no global index is kept.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(pub u128);

impl Guid {
    /// Deterministic guid from a seeded spawn RNG.
    pub fn from_rng(rng: &mut Pcg32) -> Self {
        Guid((u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64()))
    }

    /// Non-deterministic guid for host use.
    pub fn random() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut hasher = FxHasher::default();
        (nanos, count, std::process::id()).hash(&mut hasher);
        let hi = hasher.finish();
        (hi, nanos, count).hash(&mut hasher);
        let lo = hasher.finish();
        Guid((u128::from(hi) << 64) | u128::from(lo))
    }

    pub fn to_hex(self) -> String {
        format!("{:032x}", self.0)
    }

    pub fn parse_hex(s: &str) -> Option<Self> {
        (s.len() == 32)
            .then(|| u128::from_str_radix(s, 16).ok())
            .flatten()
            .map(Guid)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.to_hex())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Guid::parse_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid guid '{s}'")))
    }
}

type SerializeFn = Box<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(&Value) -> Result<BoxedValue> + Send + Sync>;

struct Codec {
    name: String,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// Type id → codec mapping, with name lookup for load.
#[derive(Default)]
pub struct SerdeRegistry {
    by_type: AHashMap<ComponentTypeId, Codec>,
    by_name: AHashMap<String, ComponentTypeId>,
}

impl SerdeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self)
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let type_id = component::type_id::<T>();
        let name = component::short_type_name::<T>().to_string();
        self.by_name.insert(name.clone(), type_id);
        self.by_type.insert(
            type_id,
            Codec {
                name,
                serialize: Box::new(|value| {
                    let concrete = value.downcast_ref::<T>().ok_or_else(|| {
                        EcsError::Serialization("codec/value type mismatch".to_string())
                    })?;
                    serde_json::to_value(concrete)
                        .map_err(|e| EcsError::Serialization(e.to_string()))
                }),
                deserialize: Box::new(|value| {
                    let concrete: T = serde_json::from_value(value.clone())
                        .map_err(|e| EcsError::Serialization(e.to_string()))?;
                    Ok(Box::new(concrete) as BoxedValue)
                }),
            },
        );
    }

    pub fn has(&self, type_id: ComponentTypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    pub fn type_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, type_id: ComponentTypeId) -> Option<&str> {
        self.by_type.get(&type_id).map(|c| c.name.as_str())
    }

    pub(crate) fn serialize_value(
        &self,
        type_id: ComponentTypeId,
        value: &dyn Any,
    ) -> Option<Result<Value>> {
        self.by_type
            .get(&type_id)
            .map(|codec| (codec.serialize)(value))
    }

    pub(crate) fn deserialize_value(
        &self,
        type_id: ComponentTypeId,
        value: &Value,
    ) -> Option<Result<BoxedValue>> {
        self.by_type
            .get(&type_id)
            .map(|codec| (codec.deserialize)(value))
    }
}

/// Serialized entity with its components, keyed by component name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEntity {
    pub guid: String,
    pub components: BTreeMap<String, Value>,
}

/// A serializable snapshot of world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSave {
    pub version: u32,
    pub entities: Vec<SavedEntity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// Load behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Drop every existing entity before loading.
    pub clear_world: bool,
    /// Merge into existing entities by guid instead of always creating.
    pub merge_entities: bool,
}

fn synthetic_guid(entity: Entity) -> String {
    format!("ent-{:012x}", entity.to_bits())
}

impl World {
    /// Register a codec for `T` in this world's serde registry.
    pub fn register_serde<T>(&mut self)
    where
        T: Component + Serialize + DeserializeOwned,
    {
        self.serde.register::<T>();
    }

    pub fn serde_registry(&self) -> &SerdeRegistry {
        &self.serde
    }

    /// Snapshot every live entity. Components without a codec are skipped
    /// with a warning; entity identity is the `Guid` component when present,
    /// else a synthetic non-persistent id.
    pub fn save(&mut self) -> Result<WorldSave> {
        let guid_type = component::type_id::<Guid>();
        let mut entities = Vec::new();
        for slot in 1..self.entities().slot_bound() {
            let Some(entity) = self.entities().entity_at(slot) else {
                continue;
            };
            let guid = self
                .get_component::<Guid>(entity)
                .map(|g| g.to_hex())
                .unwrap_or_else(|| synthetic_guid(entity));

            let mut components = BTreeMap::new();
            let mut skipped: Vec<ComponentTypeId> = Vec::new();
            for type_id in self.component_types_of(entity) {
                if type_id == guid_type {
                    continue;
                }
                let Some(value) = self.component_any(entity, type_id) else {
                    continue;
                };
                match self.serde.serialize_value(type_id, value) {
                    Some(Ok(encoded)) => {
                        let name = self
                            .serde
                            .name_of(type_id)
                            .expect("codec present implies name")
                            .to_string();
                        components.insert(name, encoded);
                    }
                    Some(Err(error)) => return Err(error),
                    None => skipped.push(type_id),
                }
            }
            for type_id in skipped {
                let name = component::name_of(type_id)
                    .unwrap_or_else(|| format!("#{}", type_id.get()));
                self.diagnostics_mut().report_error(
                    EcsError::SerdeMissing(name.clone()),
                    Some(entity),
                    Some(type_id),
                    format!("component '{name}' skipped during save"),
                );
            }
            entities.push(SavedEntity {
                guid,
                components,
            });
        }
        Ok(WorldSave {
            version: SAVE_VERSION,
            entities,
            metadata: BTreeMap::new(),
        })
    }

    /// Rebuild entities from a save. Returns the touched entities in save
    /// order.
    pub fn load(&mut self, save: &WorldSave, options: LoadOptions) -> Result<Vec<Entity>> {
        if save.version != SAVE_VERSION {
            return Err(EcsError::VersionMismatch {
                found: save.version,
                expected: SAVE_VERSION,
            });
        }
        if options.clear_world {
            self.clear()?;
        }

        // Guid → live entity map, for merge loads.
        let mut by_guid: AHashMap<u128, Entity> = AHashMap::new();
        if options.merge_entities {
            for slot in 1..self.entities().slot_bound() {
                if let Some(entity) = self.entities().entity_at(slot) {
                    if let Some(guid) = self.get_component::<Guid>(entity) {
                        by_guid.insert(guid.0, entity);
                    }
                }
            }
        }

        let mut touched = Vec::with_capacity(save.entities.len());
        for saved in &save.entities {
            let parsed_guid = Guid::parse_hex(&saved.guid);
            let entity = parsed_guid
                .and_then(|guid| {
                    options
                        .merge_entities
                        .then(|| by_guid.get(&guid.0).copied())
                        .flatten()
                })
                .unwrap_or_else(|| {
                    let entity = self.create_entity(true);
                    if let Some(guid) = parsed_guid {
                        // Persistent identity survives the round trip.
                        let _ = self.add_component(entity, guid);
                    }
                    entity
                });

            for (name, encoded) in &saved.components {
                let Some(type_id) = self.serde.type_by_name(name) else {
                    self.diagnostics_mut().report_error(
                        EcsError::SerdeMissing(name.clone()),
                        Some(entity),
                        None,
                        format!("component '{name}' skipped during load"),
                    );
                    continue;
                };
                match self.serde.deserialize_value(type_id, encoded) {
                    Some(Ok(value)) => {
                        self.add_component_dyn(entity, type_id, value)?;
                    }
                    Some(Err(error)) => {
                        self.diagnostics_mut().report_error(
                            error,
                            Some(entity),
                            Some(type_id),
                            format!("component '{name}' failed to decode"),
                        );
                    }
                    None => {}
                }
            }
            touched.push(entity);
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    struct SPos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Opaque(#[allow(dead_code)] u32);

    #[test]
    fn guid_hex_round_trip() {
        let guid = Guid(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(Guid::parse_hex(&guid.to_hex()), Some(guid));
        assert_eq!(Guid::parse_hex("nope"), None);
    }

    #[test]
    fn save_load_round_trip() {
        let mut world = World::new();
        world.register_serde::<SPos>();
        let e = world.create_entity(true);
        world.add_component(e, SPos { x: 3.0, y: 4.0 }).unwrap();
        world.add_component(e, Guid::random()).unwrap();
        let original_guid = *world.get_component::<Guid>(e).unwrap();

        let save = world.save().unwrap();
        assert_eq!(save.version, SAVE_VERSION);

        let mut restored = World::new();
        restored.register_serde::<SPos>();
        let loaded = restored.load(&save, LoadOptions::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            restored.get_component::<SPos>(loaded[0]),
            Some(&SPos { x: 3.0, y: 4.0 })
        );
        assert_eq!(restored.get_component::<Guid>(loaded[0]), Some(&original_guid));
    }

    #[test]
    fn unregistered_components_are_skipped_with_warning() {
        let mut world = World::new();
        world.register_serde::<SPos>();
        let e = world.create_entity(true);
        world.add_component(e, SPos { x: 0.0, y: 0.0 }).unwrap();
        world.add_component(e, Opaque(5)).unwrap();

        let save = world.save().unwrap();
        assert_eq!(save.entities.len(), 1);
        assert_eq!(save.entities[0].components.len(), 1);
        assert!(world
            .diagnostics()
            .entries()
            .iter()
            .any(|d| matches!(d.error, EcsError::SerdeMissing(_))));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut world = World::new();
        let save = WorldSave {
            version: 99,
            entities: Vec::new(),
            metadata: BTreeMap::new(),
        };
        assert!(matches!(
            world.load(&save, LoadOptions::default()),
            Err(EcsError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn merge_by_guid_updates_existing_entity() {
        let mut world = World::new();
        world.register_serde::<SPos>();
        let guid = Guid(42);
        let e = world.create_entity(true);
        world.add_component(e, guid).unwrap();
        world.add_component(e, SPos { x: 1.0, y: 1.0 }).unwrap();

        let mut save = world.save().unwrap();
        save.entities[0]
            .components
            .insert("SPos".to_string(), serde_json::json!({"x": 9.0, "y": 9.0}));

        let loaded = world
            .load(
                &save,
                LoadOptions {
                    clear_world: false,
                    merge_entities: true,
                },
            )
            .unwrap();
        assert_eq!(loaded, vec![e]);
        assert_eq!(world.get_component::<SPos>(e), Some(&SPos { x: 9.0, y: 9.0 }));
        assert_eq!(world.alive_count(), 1);
    }

    #[test]
    fn clear_world_replaces_contents() {
        let mut world = World::new();
        world.register_serde::<SPos>();
        let stale = world.create_entity(true);
        world.add_component(stale, SPos { x: 0.0, y: 0.0 }).unwrap();

        let save = WorldSave {
            version: SAVE_VERSION,
            entities: vec![SavedEntity {
                guid: Guid(7).to_hex(),
                components: BTreeMap::from([(
                    "SPos".to_string(),
                    serde_json::json!({"x": 2.0, "y": 3.0}),
                )]),
            }],
            metadata: BTreeMap::new(),
        };
        let loaded = world
            .load(
                &save,
                LoadOptions {
                    clear_world: true,
                    merge_entities: false,
                },
            )
            .unwrap();
        assert!(!world.is_alive(stale));
        assert_eq!(world.alive_count(), 1);
        assert_eq!(
            world.get_component::<SPos>(loaded[0]),
            Some(&SPos { x: 2.0, y: 3.0 })
        );
    }
}
