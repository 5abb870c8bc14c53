// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty set: keys waiting for a stage, accumulated between passes.

use core::hash::Hash;

use hashbrown::HashSet;

use crate::modes::{InvalidateModes, Stage};

/// Accumulated dirty keys per stage with generation tracking.
///
/// `DirtySet` is the scheduler's index of "who needs what": it holds every key
/// marked for Measure, Arrange, or Render since the last pass, so a pass can
/// tell in O(1) whether there is anything to do and visit only the keys that
/// were marked. The generation counter increments on every mutation and can
/// be used to detect that new work arrived.
///
/// # Type Parameters
///
/// - `K`: The key type, typically a node identifier. Must be `Copy + Eq + Hash`.
///
/// # Example
///
/// ```
/// use understory_invalidation::{DirtySet, InvalidateModes, Stage};
///
/// let mut dirty = DirtySet::<u32>::new();
///
/// dirty.mark_modes(1, InvalidateModes::MEASURE);
/// dirty.mark(2, Stage::Render);
///
/// // Measure subsumes Arrange and Render.
/// assert!(dirty.is_dirty(1, Stage::Arrange));
/// assert!(dirty.is_dirty(2, Stage::Render));
/// assert!(!dirty.is_dirty(2, Stage::Measure));
///
/// let keys = dirty.take_all();
/// assert_eq!(keys.len(), 2);
/// assert!(dirty.is_empty());
/// ```
#[derive(Debug)]
pub struct DirtySet<K>
where
    K: Copy + Eq + Hash,
{
    /// Per-stage dirty key sets, indexed by [`Stage::index`].
    stages: [HashSet<K>; 3],
    /// Generation counter, incremented on each mutation.
    generation: u64,
}

impl<K> Default for DirtySet<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DirtySet<K>
where
    K: Copy + Eq + Hash,
{
    /// Creates a new empty dirty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: core::array::from_fn(|_| HashSet::new()),
            generation: 0,
        }
    }

    /// Returns the current generation.
    ///
    /// The generation is incremented on every mutation (mark, remove, take).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks a key dirty for one stage.
    ///
    /// Returns `true` if the key was newly inserted, `false` if it was already dirty.
    pub fn mark(&mut self, key: K, stage: Stage) -> bool {
        self.generation = self.generation.wrapping_add(1);
        self.stages[stage.index()].insert(key)
    }

    /// Marks a key dirty for every local stage in `modes`, after normalization.
    ///
    /// Returns the stages that were newly marked.
    pub fn mark_modes(&mut self, key: K, modes: InvalidateModes) -> InvalidateModes {
        let mut newly = InvalidateModes::NONE;
        for stage in modes.stages() {
            if self.mark(key, stage) {
                newly |= stage.local();
            }
        }
        newly
    }

    /// Returns `true` if the key is dirty for the given stage.
    #[must_use]
    pub fn is_dirty(&self, key: K, stage: Stage) -> bool {
        self.stages[stage.index()].contains(&key)
    }

    /// Returns `true` if any key is dirty for the given stage.
    #[must_use]
    pub fn has_dirty(&self, stage: Stage) -> bool {
        !self.stages[stage.index()].is_empty()
    }

    /// Returns `true` if there are no dirty keys in any stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(HashSet::is_empty)
    }

    /// Returns the number of dirty keys for the given stage.
    #[must_use]
    pub fn len(&self, stage: Stage) -> usize {
        self.stages[stage.index()].len()
    }

    /// Returns an iterator over the dirty keys for the given stage.
    pub fn iter(&self, stage: Stage) -> impl Iterator<Item = K> + '_ {
        self.stages[stage.index()].iter().copied()
    }

    /// Removes every key from every stage and returns the distinct keys.
    ///
    /// The order of the returned keys is unspecified; callers that need a
    /// deterministic order sort them afterwards.
    pub fn take_all(&mut self) -> HashSet<K> {
        self.generation = self.generation.wrapping_add(1);
        let mut keys = HashSet::new();
        for set in &mut self.stages {
            keys.extend(set.drain());
        }
        keys
    }

    /// Removes a specific key from all stages.
    ///
    /// This is used when a node is removed from the tree entirely.
    pub fn remove_key(&mut self, key: K) {
        let mut removed = false;
        for set in &mut self.stages {
            removed |= set.remove(&key);
        }
        if removed {
            self.generation = self.generation.wrapping_add(1);
        }
    }
}

impl<K> Clone for DirtySet<K>
where
    K: Copy + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            generation: self.generation,
        }
    }
}
