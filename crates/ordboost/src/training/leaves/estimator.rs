//! Batch leaf-value estimation for oblivious trees.
//!
//! Every registered task is laid out on the devices as a stripe of rows. Each
//! device part is stably reordered by leaf so that per-leaf reduction is a
//! contiguous scan:
//!
//! ```text
//! device 0: [leaf0 rows | leaf1 rows | ...]   offsets0[0..=L]
//! device 1: [leaf0 rows | leaf1 rows | ...]   offsets1[0..=L]
//! ```
//!
//! Partial sums are combined in device order, so results do not depend on the
//! execution schedule.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use crate::config::{DataPartition, LeavesEstimationParams};
use crate::data::DataSetView;
use crate::device::{DeviceExecutor, Mapping, StripeBuffer};
use crate::error::{ensure_invariant, TrainError};
use crate::training::cache::ScopedCache;
use crate::training::objectives::ObjectiveFn;
use crate::training::oblivious::{ObliviousTreeModel, ObliviousTreeStructure};
use crate::training::storage::ModelSlot;
use crate::training::target::TargetSlice;
use crate::training::weak::{LeavesEstimator, StructureBins};

use super::oracle::{LeavesEstimationOracle, NewtonWalker};

// =============================================================================
// Derivative calculator
// =============================================================================

/// Per-leaf sums of loss and derivatives.
#[derive(Debug, Clone, Default, PartialEq)]
struct LeafStats {
    value: f64,
    ders: Vec<f64>,
    ders2: Vec<f64>,
}

impl LeafStats {
    fn zeros(leaf_count: usize) -> Self {
        Self {
            value: 0.0,
            ders: vec![0.0; leaf_count],
            ders2: vec![0.0; leaf_count],
        }
    }

    fn merge(&mut self, other: &LeafStats) {
        self.value += other.value;
        self.ders.iter_mut().zip(&other.ders).for_each(|(a, b)| *a += b);
        self.ders2.iter_mut().zip(&other.ders2).for_each(|(a, b)| *a += b);
    }

    fn scale(&mut self, factor: f64) {
        self.value *= factor;
        self.ders.iter_mut().for_each(|d| *d *= factor);
        self.ders2.iter_mut().for_each(|d| *d *= factor);
    }
}

/// Per-row derivatives of a permutation's objective.
#[derive(Clone)]
pub struct PermutationDerCalcer {
    objective: Arc<dyn ObjectiveFn>,
}

impl std::fmt::Debug for PermutationDerCalcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermutationDerCalcer")
            .field("objective", &self.objective.name())
            .finish()
    }
}

impl PermutationDerCalcer {
    pub fn new(objective: Arc<dyn ObjectiveFn>) -> Self {
        Self { objective }
    }

    /// Reduce one leaf-ordered device part at `point` (one value per leaf).
    fn reduce_part(&self, part: DevicePart<'_>, point: &[f64]) -> LeafStats {
        let mut stats = LeafStats::zeros(point.len());
        for (leaf, &shift) in point.iter().enumerate() {
            let rows = part.offsets[leaf] as usize..part.offsets[leaf + 1] as usize;
            for i in rows {
                let prediction = f64::from(part.baseline[i]) + shift;
                let target = part.targets[i];
                let weight = f64::from(part.weights[i]);
                let (g, h) = self.objective.derivatives(prediction, target);
                stats.value += weight * self.objective.loss(prediction, target);
                stats.ders[leaf] += weight * g;
                stats.ders2[leaf] += weight * h;
            }
        }
        stats
    }
}

// =============================================================================
// Tasks
// =============================================================================

#[derive(Debug)]
struct PendingTask {
    slot: ModelSlot,
    calcer: PermutationDerCalcer,
    bins: Vec<u32>,
    current: Vec<f32>,
    targets: Vec<f32>,
    weights: Vec<f32>,
}

#[derive(Clone, Copy)]
struct DevicePart<'a> {
    baseline: &'a [f32],
    targets: &'a [f32],
    weights: &'a [f32],
    offsets: &'a [u32],
}

/// One device part reordered by leaf.
struct SortedPart {
    baseline: Vec<f32>,
    targets: Vec<f32>,
    weights: Vec<f32>,
    offsets: Vec<u32>,
    leaf_weights: Vec<f64>,
}

/// Stable counting sort of one part's rows by leaf.
fn sort_part(task: &PendingTask, range: Range<usize>, leaf_count: usize) -> SortedPart {
    let bins = &task.bins[range.clone()];
    let mut offsets = vec![0u32; leaf_count + 1];
    for &bin in bins {
        offsets[bin as usize + 1] += 1;
    }
    for leaf in 0..leaf_count {
        offsets[leaf + 1] += offsets[leaf];
    }
    let mut next = offsets[..leaf_count].to_vec();
    let mut order = vec![0usize; bins.len()];
    for (i, &bin) in bins.iter().enumerate() {
        let slot = &mut next[bin as usize];
        order[*slot as usize] = range.start + i;
        *slot += 1;
    }
    let mut leaf_weights = vec![0.0; leaf_count];
    for (&bin, &w) in bins.iter().zip(&task.weights[range]) {
        leaf_weights[bin as usize] += f64::from(w);
    }
    SortedPart {
        baseline: order.iter().map(|&i| task.current[i]).collect(),
        targets: order.iter().map(|&i| task.targets[i]).collect(),
        weights: order.iter().map(|&i| task.weights[i]).collect(),
        offsets,
        leaf_weights,
    }
}

#[derive(Debug)]
struct EstimationTask {
    slot: ModelSlot,
    calcer: PermutationDerCalcer,
    leaf_count: usize,
    baseline: StripeBuffer<f32>,
    targets: StripeBuffer<f32>,
    weights: StripeBuffer<f32>,
    /// `leaf_count + 1` offsets per device, relative to the device part.
    offsets: StripeBuffer<u32>,
    leaf_weights: Vec<f64>,
    total_weight: f64,
    stats: LeafStats,
}

impl EstimationTask {
    fn build(
        pending: PendingTask,
        leaf_count: usize,
        executor: &DeviceExecutor,
    ) -> Result<Self, TrainError> {
        let n = pending.bins.len();
        let mapping = executor.stripe(n);
        let parts = executor.run_on_devices(mapping.parts(), |_, range| {
            sort_part(&pending, range, leaf_count)
        });

        let mut baseline = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        let mut offsets = Vec::with_capacity(parts.len() * (leaf_count + 1));
        let mut leaf_weights = vec![0.0; leaf_count];
        for part in parts {
            baseline.extend(part.baseline);
            targets.extend(part.targets);
            weights.extend(part.weights);
            offsets.extend(part.offsets);
            leaf_weights.iter_mut().zip(&part.leaf_weights).for_each(|(a, b)| *a += b);
        }
        let offsets_mapping = Mapping::repeat_on_all_devices(leaf_count + 1, executor.device_count());
        Ok(Self {
            slot: pending.slot,
            calcer: pending.calcer,
            leaf_count,
            baseline: StripeBuffer::from_vec(mapping.clone(), baseline)?,
            targets: StripeBuffer::from_vec(mapping.clone(), targets)?,
            weights: StripeBuffer::from_vec(mapping, weights)?,
            offsets: StripeBuffer::from_vec(offsets_mapping, offsets)?,
            total_weight: leaf_weights.iter().sum(),
            leaf_weights,
            stats: LeafStats::zeros(leaf_count),
        })
    }

    fn evaluate(&self, point: &[f64], normalize: bool, executor: &DeviceExecutor) -> LeafStats {
        let parts: Vec<DevicePart<'_>> = self
            .baseline
            .parts()
            .into_iter()
            .zip(self.targets.parts())
            .zip(self.weights.parts())
            .zip(self.offsets.parts())
            .map(|(((baseline, targets), weights), offsets)| DevicePart {
                baseline,
                targets,
                weights,
                offsets,
            })
            .collect();
        let partials = executor.run_on_devices(parts, |_, part| self.calcer.reduce_part(part, point));

        let mut stats = LeafStats::zeros(self.leaf_count);
        for partial in &partials {
            stats.merge(partial);
        }
        if normalize && self.total_weight > 0.0 {
            stats.scale(1.0 / self.total_weight);
        }
        stats
    }
}

// =============================================================================
// Estimator
// =============================================================================

/// Leaves estimator for [`ObliviousTreeStructure`].
///
/// Tasks are collected with [`add_estimation_task`](LeavesEstimator::add_estimation_task)
/// and estimated together. Each task only depends on its own block of leaf
/// values, so the result for a task does not depend on which other tasks
/// were submitted or in which order.
#[derive(Debug)]
pub struct ObliviousTreeLeavesEstimator {
    params: LeavesEstimationParams,
    l2: f64,
    partition: DataPartition,
    structure: Option<ObliviousTreeStructure>,
    pending: Vec<PendingTask>,
    tasks: Vec<EstimationTask>,
}

impl ObliviousTreeLeavesEstimator {
    pub fn new(params: LeavesEstimationParams, l2: f64, partition: DataPartition) -> Self {
        Self {
            params,
            l2,
            partition,
            structure: None,
            pending: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Number of tasks waiting for [`estimate`](LeavesEstimator::estimate).
    pub fn task_count(&self) -> usize {
        self.pending.len() + self.tasks.len()
    }

    fn upload(&mut self, executor: &DeviceExecutor) -> Result<(), TrainError> {
        let leaf_count = match &self.structure {
            Some(structure) => structure.leaf_count(),
            None => return Err(TrainError::Usage("no leaves estimation task was added".into())),
        };
        let pending = std::mem::take(&mut self.pending);
        let built = executor.run_batch(pending, |task| EstimationTask::build(task, leaf_count, executor));
        self.tasks = built.into_iter().collect::<Result<_, _>>()?;
        Ok(())
    }

    fn push_task<O: ObjectiveFn + 'static>(
        &mut self,
        cache: &ScopedCache,
        structure: &ObliviousTreeStructure,
        target: TargetSlice<'_, O>,
        view: &DataSetView<'_>,
        current: &[f32],
        slot: ModelSlot,
    ) -> Result<(), TrainError> {
        match &self.structure {
            Some(known) => ensure_invariant!(
                known == structure,
                "estimation tasks of one batch must share a structure"
            ),
            None => self.structure = Some(structure.clone()),
        }
        let slice = target.slice;
        ensure_invariant!(
            current.len() == slice.len(),
            "cursor of {} rows for task slice {}",
            current.len(),
            slice
        );
        ensure_invariant!(!slice.is_empty(), "empty estimation slice {} for {:?}", slice, slot);

        let bins: Cow<'_, [u32]> = match self.partition {
            DataPartition::FeatureParallel => {
                let Some(all) = cache.get(view.id()) else {
                    return Err(TrainError::invariant(format!(
                        "structure not cached for {:?}",
                        view.id()
                    )));
                };
                ensure_invariant!(
                    slice.right as usize <= all.len(),
                    "slice {} exceeds {} cached bins",
                    slice,
                    all.len()
                );
                Cow::Borrowed(&all[slice.range()])
            }
            DataPartition::DocParallel => Cow::Owned(structure.compute_bins(view, slice)),
        };

        let objective: Arc<dyn ObjectiveFn> = target.target.objective().clone();
        self.pending.push(PendingTask {
            slot,
            calcer: PermutationDerCalcer::new(objective),
            bins: bins.into_owned(),
            current: current.to_vec(),
            targets: target.targets().to_vec(),
            weights: target.weights().to_vec(),
        });
        Ok(())
    }
}

impl LeavesEstimationOracle for ObliviousTreeLeavesEstimator {
    fn point_dim(&self) -> Result<usize, TrainError> {
        if self.task_count() == 0 {
            return Err(TrainError::Usage(
                "point dimension requested before any task was added".into(),
            ));
        }
        let pending = self
            .structure
            .as_ref()
            .map_or(0, |s| s.leaf_count() * self.pending.len());
        Ok(pending + self.tasks.iter().map(|t| t.leaf_count).sum::<usize>())
    }

    fn blocks(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.tasks
            .iter()
            .map(|t| {
                let block = start..start + t.leaf_count;
                start = block.end;
                block
            })
            .collect()
    }

    fn move_to(&mut self, point: &[f64], executor: &DeviceExecutor) -> Result<(), TrainError> {
        let blocks = self.blocks();
        ensure_invariant!(
            blocks.last().map_or(0, |b| b.end) == point.len(),
            "point of {} coordinates for {} tasks",
            point.len(),
            self.tasks.len()
        );
        let normalize = self.params.normalize;
        let tasks = &self.tasks;
        let work: Vec<_> = tasks.iter().zip(blocks).collect();
        let stats = executor.run_batch(work, |(task, block)| {
            task.evaluate(&point[block], normalize, executor)
        });
        for (task, stats) in self.tasks.iter_mut().zip(stats) {
            task.stats = stats;
        }
        Ok(())
    }

    fn regularize(&self, point: &mut [f64]) {
        for (task, block) in self.tasks.iter().zip(self.blocks()) {
            let values = &mut point[block];
            for (v, &w) in values.iter_mut().zip(&task.leaf_weights) {
                if w <= 0.0 {
                    *v = 0.0;
                }
            }
            if self.params.zero_average && task.total_weight > 0.0 {
                let mean = values
                    .iter()
                    .zip(&task.leaf_weights)
                    .map(|(v, w)| v * w)
                    .sum::<f64>()
                    / task.total_weight;
                for (v, &w) in values.iter_mut().zip(&task.leaf_weights) {
                    if w > 0.0 {
                        *v -= mean;
                    }
                }
            }
        }
    }

    fn write_value_and_first_derivatives(&self, values: &mut [f64], ders: &mut [f64]) {
        for ((task, block), value) in self.tasks.iter().zip(self.blocks()).zip(values.iter_mut()) {
            *value = task.stats.value;
            ders[block].copy_from_slice(&task.stats.ders);
        }
    }

    fn write_second_derivatives(&self, ders2: &mut [f64]) {
        for (task, block) in self.tasks.iter().zip(self.blocks()) {
            ders2[block].copy_from_slice(&task.stats.ders2);
        }
    }

    fn write_weights(&self, weights: &mut [f64]) {
        let normalize = self.params.normalize;
        for (task, block) in self.tasks.iter().zip(self.blocks()) {
            let scale = if normalize && task.total_weight > 0.0 {
                1.0 / task.total_weight
            } else {
                1.0
            };
            for (dst, &w) in weights[block].iter_mut().zip(&task.leaf_weights) {
                *dst = w * scale;
            }
        }
    }
}

impl LeavesEstimator for ObliviousTreeLeavesEstimator {
    type Structure = ObliviousTreeStructure;
    type Model = ObliviousTreeModel;

    fn add_estimation_task<O: ObjectiveFn + 'static>(
        &mut self,
        cache: &ScopedCache,
        structure: &ObliviousTreeStructure,
        target: TargetSlice<'_, O>,
        view: &DataSetView<'_>,
        current: &[f32],
        slot: ModelSlot,
    ) -> Result<(), TrainError> {
        let result = self.push_task(cache, structure, target, view, current, slot);
        if result.is_err() {
            self.pending.clear();
            self.structure = None;
        }
        result
    }

    fn estimate(
        &mut self,
        executor: &DeviceExecutor,
    ) -> Result<Vec<(ModelSlot, ObliviousTreeModel)>, TrainError> {
        self.upload(executor)?;
        let walker = NewtonWalker::new(&self.params, self.l2);
        let point = walker.estimate(self, executor);
        let structure = self.structure.take();
        let blocks = self.blocks();
        let tasks = std::mem::take(&mut self.tasks);
        let point = point?;
        let Some(structure) = structure else {
            return Err(TrainError::invariant("estimation without a structure"));
        };

        Ok(tasks
            .into_iter()
            .zip(blocks)
            .map(|(task, block)| {
                let values = point[block].iter().map(|&v| v as f32).collect();
                let weights = task.leaf_weights.iter().map(|&w| w as f32).collect();
                (
                    task.slot,
                    ObliviousTreeModel::with_values(structure.clone(), values, weights),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeavesEstimationMethod;
    use crate::data::{DataSetsHolder, Dataset};
    use crate::slice::Slice;
    use crate::training::objectives::{LogisticLoss, SquaredLoss};
    use crate::training::oblivious::BinarySplit;
    use crate::training::target::PermutationTarget;
    use crate::training::weak::WeakLearner;
    use crate::training::oblivious::ObliviousTreeLearner;
    use crate::config::TreeParams;
    use crate::utils::Parallelism;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn structure() -> ObliviousTreeStructure {
        ObliviousTreeStructure::new(vec![BinarySplit { feature: 0, border: 0 }])
    }

    fn dataset() -> Dataset {
        let features = Array2::from_shape_fn((1, 10), |(_, j)| u8::from(j >= 6));
        let targets = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 10.0, 20.0, 30.0, 40.0];
        Dataset::new(features, targets)
            .unwrap()
            .with_weights(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 1.0, 1.0])
            .unwrap()
    }

    fn cached(holder: &DataSetsHolder<'_>, structure: &ObliviousTreeStructure) -> ScopedCache {
        let learner = ObliviousTreeLearner::new(
            TreeParams::default(),
            LeavesEstimationParams::default(),
            DataPartition::FeatureParallel,
            Parallelism::Sequential,
        );
        let mut cache = ScopedCache::new();
        learner.cache_structure(&mut cache, structure, &holder.view(0));
        cache
    }

    #[test]
    fn test_newton_squared_loss_is_shrunk_weighted_mean() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let structure = structure();
        let cache = cached(&holder, &structure);
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        let current = vec![1.0f32; 10];

        for devices in [1, 3] {
            let executor = DeviceExecutor::new(devices, Parallelism::Parallel);
            let mut estimator =
                ObliviousTreeLeavesEstimator::new(LeavesEstimationParams::default(), 2.0, DataPartition::FeatureParallel);
            estimator
                .add_estimation_task(
                    &cache,
                    &structure,
                    TargetSlice::new(&target, Slice::full(10)),
                    &holder.view(0),
                    &current,
                    ModelSlot::Estimation,
                )
                .unwrap();
            let models = estimator.estimate(&executor).unwrap();
            assert_eq!(models.len(), 1);
            let model = &models[0].1;
            // leaf 0: residuals 0..=5, weight 6; leaf 1: 2*9 + 2*19 + 29 + 39, weight 6
            assert_relative_eq!(model.values[0], 15.0 / 8.0, epsilon = 1e-5);
            assert_relative_eq!(model.values[1], 124.0 / 8.0, epsilon = 1e-5);
            assert_eq!(model.weights, vec![6.0, 6.0]);
            assert_eq!(estimator.task_count(), 0);
        }
    }

    #[test]
    fn test_task_order_does_not_change_results() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let structure = structure();
        let cache = cached(&holder, &structure);
        let target = PermutationTarget::new(Arc::new(LogisticLoss), &holder.view(0)).unwrap();
        let slices = [Slice::new(0, 4), Slice::new(0, 8), Slice::full(10)];
        let params = LeavesEstimationParams {
            iterations: 5,
            ..Default::default()
        };
        let executor = DeviceExecutor::new(2, Parallelism::Parallel);

        let run = |order: &[usize]| {
            let mut estimator = ObliviousTreeLeavesEstimator::new(params.clone(), 1.0, DataPartition::DocParallel);
            for &i in order {
                let slice = slices[i];
                let current = vec![0.0f32; slice.len()];
                estimator
                    .add_estimation_task(
                        &cache,
                        &structure,
                        TargetSlice::new(&target, slice),
                        &holder.view(0),
                        &current,
                        ModelSlot::Fold { permutation: 0, fold: i as u32 },
                    )
                    .unwrap();
            }
            let mut models = estimator.estimate(&executor).unwrap();
            models.sort_by_key(|(slot, _)| *slot);
            models
        };
        let forward = run(&[0, 1, 2]);
        let backward = run(&[2, 0, 1]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_empty_leaf_is_zero_and_zero_average() {
        let features = Array2::from_shape_fn((1, 6), |(_, j)| if j < 3 { 0 } else { 2 });
        let ds = Dataset::new(features, vec![1.0, 1.0, 1.0, 3.0, 3.0, 3.0]).unwrap();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let structure = ObliviousTreeStructure::new(vec![
            BinarySplit { feature: 0, border: 0 },
            BinarySplit { feature: 0, border: 1 },
        ]);
        let cache = cached(&holder, &structure);
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        let params = LeavesEstimationParams {
            method: LeavesEstimationMethod::Newton,
            zero_average: true,
            ..Default::default()
        };
        let mut estimator = ObliviousTreeLeavesEstimator::new(params, 0.0, DataPartition::FeatureParallel);
        estimator
            .add_estimation_task(
                &cache,
                &structure,
                TargetSlice::new(&target, Slice::full(6)),
                &holder.view(0),
                &[0.0; 6],
                ModelSlot::Estimation,
            )
            .unwrap();
        let (_, model) = estimator.estimate(&DeviceExecutor::single()).unwrap().remove(0);
        // leaves 1 and 2 are empty
        assert_eq!(model.values[1], 0.0);
        assert_eq!(model.values[2], 0.0);
        assert_relative_eq!(model.values[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(model.values[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_estimate_without_tasks_is_usage_error() {
        let mut estimator =
            ObliviousTreeLeavesEstimator::new(LeavesEstimationParams::default(), 1.0, DataPartition::FeatureParallel);
        assert!(matches!(
            estimator.estimate(&DeviceExecutor::single()),
            Err(TrainError::Usage(_))
        ));
        assert!(matches!(estimator.point_dim(), Err(TrainError::Usage(_))));
    }

    #[test]
    fn test_point_dim_counts_registered_tasks() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let structure = structure();
        let cache = cached(&holder, &structure);
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        let mut estimator =
            ObliviousTreeLeavesEstimator::new(LeavesEstimationParams::default(), 1.0, DataPartition::FeatureParallel);
        for (fold, slice) in [Slice::new(0, 4), Slice::full(10)].into_iter().enumerate() {
            estimator
                .add_estimation_task(
                    &cache,
                    &structure,
                    TargetSlice::new(&target, slice),
                    &holder.view(0),
                    &vec![0.0; slice.len()],
                    ModelSlot::Fold { permutation: 0, fold: fold as u32 },
                )
                .unwrap();
            assert_eq!(estimator.point_dim().unwrap(), 2 * (fold + 1));
        }
        assert_eq!(estimator.estimate(&DeviceExecutor::single()).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_registration_discards_the_batch() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let structure = structure();
        let cache = cached(&holder, &structure);
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        let mut estimator =
            ObliviousTreeLeavesEstimator::new(LeavesEstimationParams::default(), 1.0, DataPartition::DocParallel);
        estimator
            .add_estimation_task(
                &cache,
                &structure,
                TargetSlice::new(&target, Slice::full(10)),
                &holder.view(0),
                &[0.0; 10],
                ModelSlot::Estimation,
            )
            .unwrap();

        let other = ObliviousTreeStructure::new(vec![BinarySplit { feature: 0, border: 1 }]);
        let result = estimator.add_estimation_task(
            &cache,
            &other,
            TargetSlice::new(&target, Slice::full(10)),
            &holder.view(0),
            &[0.0; 10],
            ModelSlot::Fold { permutation: 0, fold: 0 },
        );
        assert!(matches!(result, Err(TrainError::Invariant(_))));
        assert_eq!(estimator.task_count(), 0);
        assert!(matches!(estimator.point_dim(), Err(TrainError::Usage(_))));

        // a fresh batch with the other structure is accepted
        estimator
            .add_estimation_task(
                &cache,
                &other,
                TargetSlice::new(&target, Slice::new(0, 6)),
                &holder.view(0),
                &[0.0; 6],
                ModelSlot::Fold { permutation: 0, fold: 0 },
            )
            .unwrap();
        let models = estimator.estimate(&DeviceExecutor::single()).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].0, ModelSlot::Fold { permutation: 0, fold: 0 });
    }

    #[test]
    fn test_missing_cache_is_invariant_error() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        let mut estimator =
            ObliviousTreeLeavesEstimator::new(LeavesEstimationParams::default(), 1.0, DataPartition::FeatureParallel);
        let result = estimator.add_estimation_task(
            &ScopedCache::new(),
            &structure(),
            TargetSlice::new(&target, Slice::full(10)),
            &holder.view(0),
            &[0.0; 10],
            ModelSlot::Estimation,
        );
        assert!(matches!(result, Err(TrainError::Invariant(_))));
    }
}
