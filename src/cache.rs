//! Deduplicated superset of every level fetched from the service

use crate::types::{LevelMetadata, WorldId};
use std::collections::HashMap;

/// Insertion-ordered store of level records, unique by world id.
///
/// Records are never replaced once added; callers mutate them in place via
/// [`MetadataCache::get_mut`].
#[derive(Default)]
pub struct MetadataCache {
    order: Vec<WorldId>,
    levels: HashMap<WorldId, LevelMetadata>,
    /// Arrival serial of every record, monotonic across removals
    sequence: HashMap<WorldId, u64>,
    next_sequence: u64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &WorldId) -> bool {
        self.levels.contains_key(id)
    }

    /// Position of `id` in insertion order
    pub fn index_of(&self, id: &WorldId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.order.iter().position(|w| w == id)
    }

    /// Add a record. Returns `false` and drops `level` if its id is already cached.
    pub fn insert(&mut self, level: LevelMetadata) -> bool {
        if self.contains(&level.world_id) {
            return false;
        }
        self.order.push(level.world_id);
        self.sequence.insert(level.world_id, self.next_sequence);
        self.next_sequence += 1;
        self.levels.insert(level.world_id, level);
        true
    }

    pub fn remove(&mut self, id: &WorldId) -> Option<LevelMetadata> {
        let level = self.levels.remove(id)?;
        self.order.retain(|w| w != id);
        self.sequence.remove(id);
        Some(level)
    }

    /// Arrival serial of `id`; orders records the same way [`MetadataCache::iter`] does
    pub fn sequence(&self, id: &WorldId) -> Option<u64> {
        self.sequence.get(id).copied()
    }

    pub fn get(&self, id: &WorldId) -> Option<&LevelMetadata> {
        self.levels.get(id)
    }

    pub fn get_mut(&mut self, id: &WorldId) -> Option<&mut LevelMetadata> {
        self.levels.get_mut(id)
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &LevelMetadata> + '_ {
        self.order.iter().filter_map(|id| self.levels.get(id))
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.levels.clear();
        self.sequence.clear();
    }
}
