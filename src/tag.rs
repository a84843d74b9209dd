//! Per-entity string tags.
//!
//! Tags are interned into a world-level dictionary; each entity carries a
//! bitset over tag indices. Entities in the same archetype may carry
//! different tags, so queries check tags per row.

use ahash::AHashMap;

use crate::bitset::BitSet;
use crate::entity::Entity;

/// World-level tag dictionary plus per-slot tag bits.
#[derive(Default)]
pub struct TagStore {
    ids: AHashMap<String, usize>,
    names: Vec<String>,
    by_slot: AHashMap<u32, BitSet>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a tag name, returning its bit index.
    pub fn intern(&mut self, tag: &str) -> usize {
        if let Some(&bit) = self.ids.get(tag) {
            return bit;
        }
        let bit = self.names.len();
        self.ids.insert(tag.to_string(), bit);
        self.names.push(tag.to_string());
        bit
    }

    pub fn bit_of(&self, tag: &str) -> Option<usize> {
        self.ids.get(tag).copied()
    }

    pub fn name_of(&self, bit: usize) -> Option<&str> {
        self.names.get(bit).map(|s| s.as_str())
    }

    pub fn add(&mut self, entity: Entity, tag: &str) {
        let bit = self.intern(tag);
        self.by_slot.entry(entity.index()).or_default().set(bit);
    }

    pub fn remove(&mut self, entity: Entity, tag: &str) {
        if let Some(bit) = self.bit_of(tag) {
            if let Some(bits) = self.by_slot.get_mut(&entity.index()) {
                bits.clear(bit);
            }
        }
    }

    pub fn has(&self, entity: Entity, tag: &str) -> bool {
        match (self.bit_of(tag), self.by_slot.get(&entity.index())) {
            (Some(bit), Some(bits)) => bits.contains(bit),
            _ => false,
        }
    }

    /// Tag bits of an entity, if it carries any.
    pub fn bits(&self, entity: Entity) -> Option<&BitSet> {
        self.by_slot.get(&entity.index())
    }

    /// Tag names of an entity, for introspection.
    pub fn tags_of(&self, entity: Entity) -> Vec<&str> {
        self.bits(entity)
            .map(|bits| bits.ones().filter_map(|b| self.name_of(b)).collect())
            .unwrap_or_default()
    }

    /// Mask over already-interned tags. `None` when any name is unknown —
    /// for a required mask that means "matches nothing".
    pub fn mask_of(&self, tags: &[&str]) -> Option<BitSet> {
        let mut mask = BitSet::new();
        for tag in tags {
            mask.set(self.bit_of(tag)?);
        }
        Some(mask)
    }

    /// Mask like [`TagStore::mask_of`], but interning unknown names.
    pub fn create_mask(&mut self, tags: &[&str]) -> BitSet {
        tags.iter().map(|t| self.intern(t)).collect()
    }

    /// Drop all tags of a destroyed entity's slot.
    pub fn clear_slot(&mut self, entity: Entity) {
        self.by_slot.remove(&entity.index());
    }

    /// Drop every entity's tags but keep the interned dictionary.
    pub fn clear_slots(&mut self) {
        self.by_slot.clear();
    }

    /// Number of interned tag names. Query plans cache against this.
    pub fn dictionary_len(&self) -> usize {
        self.names.len()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.names.clear();
        self.by_slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_has_remove() {
        let mut tags = TagStore::new();
        let e = Entity::new(3, 0);
        tags.add(e, "enemy");
        tags.add(e, "flying");
        assert!(tags.has(e, "enemy"));
        assert!(tags.has(e, "flying"));
        assert!(!tags.has(e, "boss"));

        tags.remove(e, "enemy");
        assert!(!tags.has(e, "enemy"));
        assert_eq!(tags.tags_of(e), vec!["flying"]);
    }

    #[test]
    fn masks_over_unknown_tags() {
        let mut tags = TagStore::new();
        tags.intern("a");
        assert!(tags.mask_of(&["a"]).is_some());
        assert!(tags.mask_of(&["a", "nope"]).is_none());
        let mask = tags.create_mask(&["a", "nope"]);
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn slot_reuse_does_not_leak_tags() {
        let mut tags = TagStore::new();
        let e = Entity::new(5, 0);
        tags.add(e, "enemy");
        tags.clear_slot(e);
        let recycled = Entity::new(5, 1);
        assert!(!tags.has(recycled, "enemy"));
    }
}
