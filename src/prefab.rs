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

//! Prefab templates and deterministic batch instantiation.
//!
//! A prefab declares component defaults (a serde value captured at
//! definition time, or a per-row factory), tags and an optional init hook.
//! The sorted type-id list and signature are precomputed at definition so a
//! batch spawn finds its target archetype in one hop. Spawns are
//! deterministic given `(prefab, count, seed)`: overrides merge shallowly
//! (defaults, then shared, then per-entity), write epochs are stamped
//! explicitly, and guids are drawn from the spawn's seeded RNG.

use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use rustc_hash::FxHasher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

use crate::bitset::BitSet;
use crate::column::BoxedValue;
use crate::component::{self, Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::rng::Pcg32;
use crate::serialization::Guid;
use crate::world::World;

type InitHook = Box<dyn Fn(&mut World, Entity, usize, &mut Pcg32) + Send + Sync>;
type DecodeFn = Box<dyn Fn(&Value) -> Result<BoxedValue> + Send + Sync>;
type ValueFn = Box<dyn Fn() -> Result<Value> + Send + Sync>;
type FactoryFn = Box<dyn Fn(usize, &mut Pcg32) -> Result<Value> + Send + Sync>;

enum CompSource {
    Static(ValueFn),
    Factory(FactoryFn),
}

struct CompEntry {
    type_id: ComponentTypeId,
    name: String,
    source: CompSource,
    decode: DecodeFn,
}

/// Builder for a prefab definition.
#[derive(Default)]
pub struct PrefabSpec {
    comps: Vec<CompEntry>,
    tags: Vec<String>,
    init: Option<InitHook>,
}

fn decoder_for<T: Component + DeserializeOwned>() -> DecodeFn {
    Box::new(|value| {
        let concrete: T = serde_json::from_value(value.clone())
            .map_err(|e| EcsError::Serialization(e.to_string()))?;
        Ok(Box::new(concrete) as BoxedValue)
    })
}

impl PrefabSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component with fixed defaults; each spawned row gets a copy, merged
    /// with any overrides.
    pub fn comp<T>(mut self, defaults: T) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        self.comps.push(CompEntry {
            type_id: component::type_id::<T>(),
            name: component::short_type_name::<T>().to_string(),
            source: CompSource::Static(Box::new(move || {
                serde_json::to_value(&defaults)
                    .map_err(|e| EcsError::Serialization(e.to_string()))
            })),
            decode: decoder_for::<T>(),
        });
        self
    }

    /// Component whose defaults come from a factory called once per row,
    /// with the row index and the spawn RNG.
    pub fn comp_with<T, F>(mut self, factory: F) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
        F: Fn(usize, &mut Pcg32) -> T + Send + Sync + 'static,
    {
        self.comps.push(CompEntry {
            type_id: component::type_id::<T>(),
            name: component::short_type_name::<T>().to_string(),
            source: CompSource::Factory(Box::new(move |index, rng| {
                serde_json::to_value(factory(index, rng))
                    .map_err(|e| EcsError::Serialization(e.to_string()))
            })),
            decode: decoder_for::<T>(),
        });
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Hook called for each spawned entity in index order, after components
    /// and tags are in place.
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut World, Entity, usize, &mut Pcg32) + Send + Sync + 'static,
    {
        self.init = Some(Box::new(hook));
        self
    }
}

enum ResolvedSource {
    /// Serialized once at definition; copied per row.
    Value(Value),
    Factory(FactoryFn),
}

struct PrefabComponent {
    type_id: ComponentTypeId,
    name: String,
    source: ResolvedSource,
    decode: DecodeFn,
}

/// A registered prefab with its precompiled type list.
pub struct Prefab {
    id: String,
    comps: Vec<PrefabComponent>,
    tags: Vec<String>,
    init: Option<InitHook>,
    types: SmallVec<[ComponentTypeId; 8]>,
    signature: BitSet,
}

impl Prefab {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sorted type-id list, precompiled at definition.
    pub fn types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// Prefab registry, world-scoped.
#[derive(Default)]
pub struct PrefabRegistry {
    prefabs: AHashMap<String, Prefab>,
}

impl PrefabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, id: impl Into<String>, spec: PrefabSpec) -> Result<()> {
        let id = id.into();
        let mut comps = Vec::with_capacity(spec.comps.len());
        for entry in spec.comps {
            let source = match entry.source {
                CompSource::Static(value_fn) => ResolvedSource::Value(value_fn()?),
                CompSource::Factory(factory) => ResolvedSource::Factory(factory),
            };
            // A later entry for the same type replaces the earlier one.
            comps.retain(|c: &PrefabComponent| c.type_id != entry.type_id);
            comps.push(PrefabComponent {
                type_id: entry.type_id,
                name: entry.name,
                source,
                decode: entry.decode,
            });
        }

        let mut types: SmallVec<[ComponentTypeId; 8]> =
            comps.iter().map(|c| c.type_id).collect();
        types.sort_unstable();
        let signature: BitSet = types.iter().map(|t| t.bit()).collect();

        self.prefabs.insert(
            id.clone(),
            Prefab {
                id,
                comps,
                tags: spec.tags,
                init: spec.init,
                types,
                signature,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Prefab> {
        self.prefabs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.prefabs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }

    fn take(&mut self, id: &str) -> Option<Prefab> {
        self.prefabs.remove(id)
    }

    fn restore(&mut self, prefab: Prefab) {
        self.prefabs.insert(prefab.id.clone(), prefab);
    }
}

type PerEntityFn = Box<dyn Fn(usize) -> AHashMap<String, Value> + Send + Sync>;

/// Batch spawn parameters.
pub struct SpawnOptions {
    pub count: usize,
    pub seed: Option<u64>,
    pub tags: Vec<String>,
    /// Write epoch stamped on spawned components; defaults to the current
    /// frame.
    pub epoch: Option<u32>,
    /// Attach a [`Guid`] drawn from the spawn RNG.
    pub with_guid: bool,
    shared: AHashMap<String, Value>,
    per_entity: Option<PerEntityFn>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            count: 1,
            seed: None,
            tags: Vec::new(),
            epoch: None,
            with_guid: false,
            shared: AHashMap::new(),
            per_entity: None,
        }
    }
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn epoch(mut self, epoch: u32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_guid(mut self) -> Self {
        self.with_guid = true;
        self
    }

    /// Field-level override applied to every spawned row, keyed by
    /// component name.
    pub fn override_shared(mut self, component: impl Into<String>, fields: Value) -> Self {
        self.shared.insert(component.into(), fields);
        self
    }

    /// Per-row overrides; the map is keyed by component name.
    pub fn override_per_entity<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> AHashMap<String, Value> + Send + Sync + 'static,
    {
        self.per_entity = Some(Box::new(f));
        self
    }
}

/// Shallow field merge: object keys of `overlay` overwrite `base`;
/// non-objects replace wholesale.
fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn default_seed(prefab_id: &str) -> u64 {
    let mut hasher = FxHasher::default();
    prefab_id.hash(&mut hasher);
    hasher.finish()
}

fn spawn_batch(world: &mut World, prefab: &Prefab, options: &SpawnOptions) -> Result<Vec<Entity>> {
    let count = options.count.max(1);
    let mut rng = Pcg32::new(options.seed.unwrap_or_else(|| default_seed(&prefab.id)));
    let epoch = options.epoch.unwrap_or_else(|| world.frame());

    let mut signature = prefab.signature.clone();
    let guid_type = options.with_guid.then(|| {
        let type_id = component::type_id::<Guid>();
        signature.set(type_id.bit());
        type_id
    });
    let arch_id = world.archetypes_mut().get_or_create(&signature)?;

    let mut spawned = Vec::with_capacity(count);
    let mut values: Vec<(ComponentTypeId, BoxedValue)> =
        Vec::with_capacity(prefab.comps.len() + 1);
    for index in 0..count {
        values.clear();
        let row_overrides = options.per_entity.as_ref().map(|f| f(index));
        for comp in &prefab.comps {
            let mut base = match &comp.source {
                ResolvedSource::Value(value) => value.clone(),
                ResolvedSource::Factory(factory) => factory(index, &mut rng)?,
            };
            if let Some(shared) = options.shared.get(&comp.name) {
                merge_values(&mut base, shared);
            }
            if let Some(per_row) = row_overrides.as_ref().and_then(|m| m.get(&comp.name)) {
                merge_values(&mut base, per_row);
            }
            values.push((comp.type_id, (comp.decode)(&base)?));
        }
        if let Some(guid_type) = guid_type {
            values.push((guid_type, Box::new(Guid::from_rng(&mut rng))));
        }
        spawned.push(world.spawn_row(arch_id, &mut values, epoch)?);
    }

    for &entity in &spawned {
        for tag in prefab.tags.iter().chain(options.tags.iter()) {
            world.add_tag(entity, tag);
        }
    }

    if let Some(init) = &prefab.init {
        for (index, &entity) in spawned.iter().enumerate() {
            init(world, entity, index, &mut rng);
        }
    }

    Ok(spawned)
}

impl World {
    /// Register a prefab under `id`. Redefinition replaces.
    pub fn define_prefab(&mut self, id: impl Into<String>, spec: PrefabSpec) -> Result<()> {
        self.prefabs.define(id, spec)
    }

    pub fn prefab(&self, id: &str) -> Option<&Prefab> {
        self.prefabs.get(id)
    }

    /// Batch-instantiate a prefab. Deterministic given
    /// `(prefab, count, seed)`.
    pub fn spawn_prefab(&mut self, id: &str, options: SpawnOptions) -> Result<Vec<Entity>> {
        self.guard_structural()?;
        // The prefab leaves the registry for the duration so init hooks can
        // take `&mut World`.
        let Some(prefab) = self.prefabs.take(id) else {
            return Err(EcsError::PrefabNotFound(id.to_string()));
        };
        let result = spawn_batch(self, &prefab, &options);
        self.prefabs.restore(prefab);
        result
    }
}
