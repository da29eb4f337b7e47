//! The oblivious tree weak learner.

use crate::config::{BoostingConfig, DataPartition, LeavesEstimationParams, TreeParams};
use crate::data::DataSetView;
use crate::training::cache::ScopedCache;
use crate::training::leaves::ObliviousTreeLeavesEstimator;
use crate::training::weak::{StructureBins, WeakLearner};
use crate::utils::Parallelism;

use super::searcher::ObliviousTreeSearcher;
use super::structure::{ObliviousTreeModel, ObliviousTreeStructure};

/// Symmetric (oblivious) decision trees of fixed depth.
#[derive(Debug, Clone)]
pub struct ObliviousTreeLearner {
    tree: TreeParams,
    leaves: LeavesEstimationParams,
    partition: DataPartition,
    parallelism: Parallelism,
}

impl ObliviousTreeLearner {
    pub fn new(
        tree: TreeParams,
        leaves: LeavesEstimationParams,
        partition: DataPartition,
        parallelism: Parallelism,
    ) -> Self {
        Self {
            tree,
            leaves,
            partition,
            parallelism,
        }
    }

    pub fn from_config(config: &BoostingConfig, parallelism: Parallelism) -> Self {
        Self::new(
            config.tree.clone(),
            config.leaves_estimation.clone(),
            config.data_partition,
            parallelism,
        )
    }

    pub fn tree_params(&self) -> &TreeParams {
        &self.tree
    }
}

impl WeakLearner for ObliviousTreeLearner {
    type Structure = ObliviousTreeStructure;
    type Model = ObliviousTreeModel;
    type Searcher<'a> = ObliviousTreeSearcher<'a>;
    type Estimator = ObliviousTreeLeavesEstimator;

    fn create_structure_searcher<'a>(&'a self, view: DataSetView<'a>) -> ObliviousTreeSearcher<'a> {
        ObliviousTreeSearcher::new(view, &self.tree, self.parallelism)
    }

    fn cache_structure(
        &self,
        cache: &mut ScopedCache,
        structure: &ObliviousTreeStructure,
        view: &DataSetView<'_>,
    ) {
        let parallelism = self.parallelism;
        cache.get_or_insert_with(view.id(), || {
            parallelism.maybe_par_map(0..view.sample_count() as usize, |pos| structure.leaf_of(view, pos))
        });
    }

    fn create_estimator(&self) -> ObliviousTreeLeavesEstimator {
        ObliviousTreeLeavesEstimator::new(self.leaves.clone(), self.tree.l2_leaf_reg, self.partition)
    }
}
