//! Weak learner lifecycle driven by the boosting loop.
//!
//! Every iteration the loop asks the learner for a structure searcher, caches
//! the chosen structure's leaf bins per view, estimates leaf values for every
//! (permutation, fold) and the estimation permutation, and finally adds the
//! estimated models into the cursors.

use crate::data::{DataSetView, ViewId};
use crate::device::DeviceExecutor;
use crate::error::{ensure_invariant, TrainError};
use crate::slice::Slice;

use super::cache::ScopedCache;
use super::objectives::ObjectiveFn;
use super::rng::TrainingRng;
use super::storage::ModelSlot;
use super::target::{ShiftedTarget, TargetSlice};

/// A structure that maps every row to a leaf.
pub trait StructureBins: Send + Sync {
    fn leaf_count(&self) -> usize;

    /// Leaf of the row at view position `pos`.
    fn leaf_of(&self, view: &DataSetView<'_>, pos: usize) -> u32;

    /// Leaves of the positions in `slice`.
    fn compute_bins(&self, view: &DataSetView<'_>, slice: Slice) -> Vec<u32> {
        slice.range().map(|pos| self.leaf_of(view, pos)).collect()
    }
}

/// Leaf-id to value mapping produced once per (permutation, fold) and iteration.
pub trait WeakModel: Clone + Send + Sync {
    type Structure;

    /// A model with all leaf values zero.
    fn from_structure(structure: &Self::Structure) -> Self;

    /// Multiply every leaf value by `factor`.
    fn rescale(&mut self, factor: f64);

    fn value(&self, leaf: u32) -> f32;
}

/// Searches one weak-model structure per iteration.
pub trait StructureSearcher {
    type Structure;

    /// Scale of the score noise, annealed by the boosting loop.
    fn set_random_strength(&mut self, model_length_mult: f64);

    /// Plain boosting: learn and score on the same rows.
    fn set_target(&mut self, target: ShiftedTarget);

    /// Ordered boosting: fit leaf values on `learn`, score them on `validate`.
    fn add_task(&mut self, learn: ShiftedTarget, validate: ShiftedTarget);

    fn fit(self, rng: &mut TrainingRng) -> Result<Self::Structure, TrainError>;
}

/// Batch leaf-value estimation.
pub trait LeavesEstimator {
    type Structure;
    type Model;

    /// Register one task: the rows `target.slice` of `view`, currently
    /// predicted as `current` (aligned with the slice), written to `slot`.
    fn add_estimation_task<O: ObjectiveFn + 'static>(
        &mut self,
        cache: &ScopedCache,
        structure: &Self::Structure,
        target: TargetSlice<'_, O>,
        view: &DataSetView<'_>,
        current: &[f32],
        slot: ModelSlot,
    ) -> Result<(), TrainError>;

    /// Estimate every registered task and clear the task list.
    fn estimate(
        &mut self,
        executor: &DeviceExecutor,
    ) -> Result<Vec<(ModelSlot, Self::Model)>, TrainError>;
}

/// A family of weak models.
pub trait WeakLearner: Send + Sync {
    type Structure: StructureBins + Clone + std::fmt::Debug;
    type Model: WeakModel<Structure = Self::Structure>;
    type Searcher<'a>: StructureSearcher<Structure = Self::Structure>
    where
        Self: 'a;
    type Estimator: LeavesEstimator<Structure = Self::Structure, Model = Self::Model>;

    fn create_structure_searcher<'a>(&'a self, view: DataSetView<'a>) -> Self::Searcher<'a>;

    /// Cache the leaf of every row of `view`. A view is computed at most once.
    fn cache_structure(
        &self,
        cache: &mut ScopedCache,
        structure: &Self::Structure,
        view: &DataSetView<'_>,
    ) {
        cache.get_or_insert_with(view.id(), || {
            structure.compute_bins(view, Slice::full(view.sample_count()))
        });
    }

    fn create_estimator(&self) -> Self::Estimator;

    fn create_add_model_value<'c>(&self, cache: &'c ScopedCache) -> AddModelValue<'c, Self::Model> {
        AddModelValue::new(cache)
    }
}

/// Batch of "cursor += model(leaf)" updates over cached leaf bins.
pub struct AddModelValue<'a, M> {
    cache: &'a ScopedCache,
    tasks: Vec<(&'a M, &'a [u32], &'a mut [f32])>,
}

impl<'a, M: WeakModel> AddModelValue<'a, M> {
    pub fn new(cache: &'a ScopedCache) -> Self {
        Self {
            cache,
            tasks: Vec::new(),
        }
    }

    /// Add `model` to the prefix of `view` covered by `cursor`.
    pub fn add_task(
        &mut self,
        model: &'a M,
        view: ViewId,
        cursor: &'a mut [f32],
    ) -> Result<(), TrainError> {
        let cache: &'a ScopedCache = self.cache;
        let Some(bins) = cache.get(view) else {
            return Err(TrainError::invariant(format!("structure not cached for {view:?}")));
        };
        ensure_invariant!(
            cursor.len() <= bins.len(),
            "cursor of {} rows exceeds {} cached bins for {:?}",
            cursor.len(),
            bins.len(),
            view
        );
        let bins = &bins[..cursor.len()];
        self.tasks.push((model, bins, cursor));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Apply every task as one batch.
    pub fn proceed(self, executor: &DeviceExecutor) {
        executor.run_batch(self.tasks, |(model, bins, cursor)| {
            for (c, &leaf) in cursor.iter_mut().zip(bins) {
                *c += model.value(leaf);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Table(Vec<f32>);

    impl WeakModel for Table {
        type Structure = usize;
        fn from_structure(leaves: &usize) -> Self {
            Table(vec![0.0; *leaves])
        }
        fn rescale(&mut self, factor: f64) {
            self.0.iter_mut().for_each(|v| *v = (f64::from(*v) * factor) as f32);
        }
        fn value(&self, leaf: u32) -> f32 {
            self.0[leaf as usize]
        }
    }

    #[test]
    fn test_add_model_value_updates_prefix() {
        let mut cache = ScopedCache::new();
        cache.get_or_insert_with(ViewId::Learn(0), || vec![0, 1, 1, 0]);
        let model = Table(vec![1.0, 10.0]);
        let mut full = vec![0.0f32; 4];
        let mut prefix = vec![0.5f32; 3];
        let mut add = AddModelValue::new(&cache);
        add.add_task(&model, ViewId::Learn(0), &mut full).unwrap();
        add.add_task(&model, ViewId::Learn(0), &mut prefix).unwrap();
        assert!(add.add_task(&model, ViewId::Test, &mut []).is_err());
        add.proceed(&DeviceExecutor::single());
        assert_eq!(full, vec![1.0, 10.0, 10.0, 1.0]);
        assert_eq!(prefix, vec![1.5, 10.5, 10.5]);
    }

    #[test]
    fn test_rescale_scales_every_leaf() {
        let mut model = Table::from_structure(&2);
        model.0 = vec![2.0, -4.0];
        model.rescale(0.5);
        assert_eq!(model.0, vec![1.0, -2.0]);
    }
}
