//! Per-iteration cache of structure-derived row data.

use std::collections::HashMap;

use crate::data::ViewId;

/// Leaf bins of the current iteration's structure, one entry per view.
///
/// Created empty at the start of an iteration, filled once per view by
/// [`WeakLearner::cache_structure`](super::WeakLearner::cache_structure) and
/// dropped at the end of the iteration.
#[derive(Debug, Default)]
pub struct ScopedCache {
    bins: HashMap<ViewId, Vec<u32>>,
}

impl ScopedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, view: ViewId) -> bool {
        self.bins.contains_key(&view)
    }

    /// Store bins for `view` unless they are already cached.
    pub fn get_or_insert_with(&mut self, view: ViewId, f: impl FnOnce() -> Vec<u32>) -> &[u32] {
        self.bins.entry(view).or_insert_with(f)
    }

    pub fn get(&self, view: ViewId) -> Option<&[u32]> {
        self.bins.get(&view).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
