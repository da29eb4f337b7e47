//! The result model and the high-level training entry point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BoostingConfig;
use crate::data::Dataset;
use crate::device::DeviceExecutor;
use crate::error::TrainError;
use crate::training::oblivious::{ObliviousTreeLearner, ObliviousTreeModel};
use crate::training::{
    BoostingProgressTracker, DynamicBoosting, InterruptFlag, ObjectiveFn, TrainingSummary,
};
use crate::utils::run_with_threads;

/// Additive ensemble of weak models. Append-only during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveModel<M> {
    models: Vec<M>,
}

impl<M> AdditiveModel<M> {
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    pub fn push(&mut self, model: M) {
        self.models.push(model);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[M] {
        &self.models
    }

    /// Keep only the first `n` models.
    pub fn truncate(&mut self, n: usize) {
        self.models.truncate(n);
    }
}

impl<M> Default for AdditiveModel<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl AdditiveModel<ObliviousTreeModel> {
    /// Raw prediction of original row `row`, including the dataset baseline.
    pub fn predict_row(&self, dataset: &Dataset, row: usize) -> f32 {
        let base = dataset.baseline().map_or(0.0, |b| b[row]);
        self.models
            .iter()
            .fold(base, |acc, tree| acc + tree.predict_row(dataset, row))
    }

    /// Raw predictions of every row of `dataset`.
    pub fn predict(&self, dataset: &Dataset) -> Vec<f32> {
        (0..dataset.n_rows()).map(|row| self.predict_row(dataset, row)).collect()
    }
}

/// Train oblivious trees on `learn`, tracking `test` when given.
///
/// Sets up the thread pool, the device executor and the default progress
/// tracker. With `use_best_model` and a test set, the returned model is
/// truncated to the best test iteration.
pub fn train<O: ObjectiveFn + 'static>(
    config: &BoostingConfig,
    objective: O,
    learn: &Dataset,
    test: Option<&Dataset>,
) -> Result<(AdditiveModel<ObliviousTreeModel>, TrainingSummary), TrainError> {
    train_with_interrupt(config, objective, learn, test, InterruptFlag::new())
}

/// [`train`] with an externally controlled interrupt flag.
pub fn train_with_interrupt<O: ObjectiveFn + 'static>(
    config: &BoostingConfig,
    objective: O,
    learn: &Dataset,
    test: Option<&Dataset>,
    interrupt: InterruptFlag,
) -> Result<(AdditiveModel<ObliviousTreeModel>, TrainingSummary), TrainError> {
    let objective = Arc::new(objective);
    run_with_threads(config.n_threads, |parallelism| {
        let executor = DeviceExecutor::new(config.device_count, parallelism);
        let learner = ObliviousTreeLearner::from_config(config, parallelism);
        let mut tracker = BoostingProgressTracker::new(config);

        let mut boosting = DynamicBoosting::new(config, objective, &learner, &executor);
        boosting
            .set_data_provider(learn, test)
            .set_progress_tracker(&mut tracker);
        let mut model = boosting.with_interrupt(interrupt).run()?;

        let summary = tracker.into_summary();
        if config.use_best_model && test.is_some() {
            if let Some(best) = summary.best_iteration {
                model.truncate(best as usize + 1);
            }
        }
        Ok((model, summary))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::oblivious::{BinarySplit, ObliviousTreeStructure};
    use ndarray::array;

    #[test]
    fn test_prediction_is_sum_of_trees_plus_baseline() {
        let ds = Dataset::new(array![[0u8, 1, 2]], vec![0.0; 3])
            .unwrap()
            .with_baseline(vec![0.5, 0.5, 0.5])
            .unwrap();
        let structure = ObliviousTreeStructure::new(vec![BinarySplit { feature: 0, border: 0 }]);
        let tree = ObliviousTreeModel::with_values(structure, vec![1.0, 2.0], vec![1.0, 2.0]);
        let mut model = AdditiveModel::new();
        model.push(tree.clone());
        model.push(tree);
        assert_eq!(model.predict(&ds), vec![2.5, 4.5, 4.5]);
        model.truncate(1);
        assert_eq!(model.len(), 1);
    }
}
