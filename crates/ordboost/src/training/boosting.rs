//! The dynamic (ordered) boosting loop.
//!
//! Per iteration:
//!
//! 1. poll the interrupt flag, offer the tracker a snapshot
//! 2. search a structure on one random learn permutation
//! 3. cache the structure's leaf bins for every view
//! 4. estimate leaf values for every (permutation, fold) and the estimation permutation
//! 5. scale by the learning rate and add every model into its cursor
//! 6. append the estimation model, report metrics
//!
//! Fold cursors only ever see models estimated on rows before their
//! evaluate range, which keeps the targets of those rows out of their own
//! predictions.

use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{BoostingConfig, BoostingType};
use crate::data::{DataSetsHolder, Dataset, ViewId};
use crate::device::{DeviceExecutor, MirrorBuffer};
use crate::error::{ensure_invariant, ConfigError, TrainError};
use crate::model::AdditiveModel;
use crate::slice::Slice;

use super::cache::ScopedCache;
use super::folds::{create_folds, Fold, FoldPlan};
use super::metrics::MetricCalcer;
use super::objectives::ObjectiveFn;
use super::progress::{InterruptFlag, ProgressTracker};
use super::rng::TrainingRng;
use super::snapshot::DynamicBoostingProgress;
use super::storage::{Cursor, FoldStorage, ModelSlot};
use super::target::{PermutationTarget, PermutationTargets, ShiftedTarget, TargetSlice};
use super::weak::{LeavesEstimator, StructureSearcher, WeakLearner, WeakModel};

/// Scale of the structure-search noise after `model_size` units of learning
/// rate over `sample_count` rows: `e / (1 + e)` with `e = n · exp(-s)`.
pub fn model_length_mult(sample_count: u32, model_size: f64) -> f64 {
    let e = ((sample_count.max(1) as f64).ln() - model_size).exp();
    e / (1.0 + e)
}

/// Read-only per-run state: permutations, targets and folds.
#[derive(Debug)]
pub struct BoostingState<'d, O: ?Sized> {
    holder: DataSetsHolder<'d>,
    targets: PermutationTargets<O>,
    /// Folds of every learn permutation.
    folds: Vec<Vec<Fold>>,
    test_targets: Option<(Vec<f32>, Vec<f32>)>,
}

impl<'d, O: ObjectiveFn + ?Sized> BoostingState<'d, O> {
    pub fn holder(&self) -> &DataSetsHolder<'d> {
        &self.holder
    }

    pub fn folds(&self, permutation: u32) -> &[Fold] {
        &self.folds[permutation as usize]
    }

    pub fn estimation_permutation(&self) -> u32 {
        self.holder.estimation_permutation()
    }

    /// Permutations used for structure search and fold cursors.
    pub fn learn_permutation_count(&self) -> u32 {
        self.folds.len() as u32
    }

    /// Fresh progress: cursors from baselines, empty model.
    fn initial_progress<M>(
        &self,
        seed: u64,
        executor: &DeviceExecutor,
    ) -> Result<DynamicBoostingProgress<M>, TrainError> {
        let est = self.estimation_permutation();
        let fold_counts: Vec<usize> = self.folds.iter().map(Vec::len).collect();
        let baselines: Vec<Vec<f32>> = (0..self.learn_permutation_count())
            .map(|p| self.holder.view(p).baseline())
            .collect();
        let mirrored = |values: &[f32]| Cursor::new(executor.mirror(values.len()), values);
        let cursors = FoldStorage::try_create(
            &fold_counts,
            |p, f| {
                let span = self.folds[p as usize][f as usize].all_samples();
                mirrored(&baselines[p as usize][span.range()])
            },
            mirrored(&self.holder.view(est).baseline())?,
        )?;
        let test_cursor = self
            .holder
            .test_view()
            .map(|view| mirrored(&view.baseline()))
            .transpose()?;
        Ok(DynamicBoostingProgress {
            model: AdditiveModel::new(),
            cursors,
            test_cursor,
            rng: TrainingRng::new(seed),
        })
    }
}

/// Dynamic boosting over objective `O` and weak learner `W`.
pub struct DynamicBoosting<'a, O: ObjectiveFn + 'static, W: WeakLearner> {
    config: &'a BoostingConfig,
    objective: Arc<O>,
    weak: &'a W,
    executor: &'a DeviceExecutor,
    learn: Option<&'a Dataset>,
    test: Option<&'a Dataset>,
    tracker: Option<&'a mut dyn ProgressTracker>,
    interrupt: InterruptFlag,
}

impl<'a, O, W> DynamicBoosting<'a, O, W>
where
    O: ObjectiveFn + 'static,
    W: WeakLearner,
    W::Model: Serialize + DeserializeOwned,
{
    pub fn new(
        config: &'a BoostingConfig,
        objective: Arc<O>,
        weak: &'a W,
        executor: &'a DeviceExecutor,
    ) -> Self {
        Self {
            config,
            objective,
            weak,
            executor,
            learn: None,
            test: None,
            tracker: None,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Learn data and optional test data.
    pub fn set_data_provider(&mut self, learn: &'a Dataset, test: Option<&'a Dataset>) -> &mut Self {
        self.learn = Some(learn);
        self.test = test;
        self
    }

    pub fn set_progress_tracker(&mut self, tracker: &'a mut dyn ProgressTracker) -> &mut Self {
        self.tracker = Some(tracker);
        self
    }

    /// Share an interrupt flag with the caller.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Build permutations, targets and folds.
    pub fn create_state(&self) -> Result<BoostingState<'a, O>, TrainError> {
        let learn = self.learn.ok_or(ConfigError::MissingDataProvider)?;
        self.objective.validate_targets(learn.targets())?;
        if let Some(test) = self.test {
            self.objective.validate_targets(test.targets())?;
        }
        let config = self.config;
        let holder = DataSetsHolder::new(
            learn,
            self.test,
            config.permutation_count,
            config.permutation_block_size,
            config.seed,
        )?;

        let targets = (0..holder.permutation_count())
            .map(|p| PermutationTarget::new(Arc::clone(&self.objective), &holder.view(p)))
            .collect::<Result<Vec<_>, _>>()?;

        let est = holder.estimation_permutation();
        let learn_count = if est > 0 { est } else { 1 };
        let plan = FoldPlan {
            boosting_type: config.boosting_type,
            fold_len_multiplier: config.fold_len_multiplier,
            min_fold_size: config.min_fold_size,
            device_count: self.executor.device_count(),
        };
        let n = learn.n_rows() as u32;
        let folds = (0..learn_count)
            .map(|p| create_folds(n, holder.view(p).grouping(), &plan))
            .collect::<Result<Vec<_>, _>>()?;

        let test_targets = holder
            .test_view()
            .map(|view| (view.gather(view.dataset().targets()), view.weights()));

        tracing::debug!(
            permutations = holder.permutation_count(),
            folds = folds.first().map_or(0, Vec::len),
            "boosting state created"
        );
        Ok(BoostingState {
            holder,
            targets: PermutationTargets::new(targets),
            folds,
            test_targets,
        })
    }

    /// Train until the tracker stops, the flag is raised or an error occurs.
    pub fn run(mut self) -> Result<AdditiveModel<W::Model>, TrainError> {
        let tracker = self.tracker.take().ok_or(ConfigError::MissingProgressTracker)?;
        let start = Instant::now();
        let state = {
            let _guard = self.executor.profiler().profile("create_state");
            self.create_state()?
        };

        let mut progress: DynamicBoostingProgress<W::Model> =
            state.initial_progress(self.config.seed, self.executor)?;
        let mut best_test_cursor: Option<MirrorBuffer<f32>> = None;
        {
            let fresh = &progress;
            let mut restored = None;
            tracker.maybe_restore_from_snapshot(&mut |reader| {
                let (loaded, best) = DynamicBoostingProgress::<W::Model>::load(reader)?;
                loaded.check_layout(fresh)?;
                restored = Some((loaded, best));
                Ok(())
            })?;
            if let Some((loaded, best)) = restored {
                progress.restore_from(loaded)?;
                if let Some(values) = best {
                    let Some(test_cursor) = &progress.test_cursor else {
                        return Err(TrainError::invariant("snapshot has a best test cursor but no test set"));
                    };
                    let mut buffer = MirrorBuffer::<f32>::copy_mapping(test_cursor.buffer());
                    buffer.write(&values)?;
                    best_test_cursor = Some(buffer);
                }
            }
        }

        let learn_calcer = MetricCalcer::new(Arc::clone(&self.objective), "learn");
        let test_calcer = state
            .test_targets
            .is_some()
            .then(|| MetricCalcer::new(Arc::clone(&self.objective), "test"));

        while !tracker.should_stop() {
            if self.interrupt.is_interrupted() {
                tracker.mark_interrupted();
                break;
            }
            {
                let snapshot = &progress;
                let best = best_test_cursor.as_ref().map(MirrorBuffer::<f32>::as_slice);
                tracker.maybe_save_snapshot(&mut |writer| Ok(snapshot.save(writer, best)?))?;
            }

            let iteration = progress.model.len() as u32;
            self.fit_iteration(&state, &mut progress, iteration)?;

            let est = state.estimation_permutation();
            let target = state.targets.get(est);
            tracker.track_learn_errors(learn_calcer.compute(
                progress.cursors.estimation.values(),
                target.targets(),
                target.weights(),
            ));
            if let (Some(calcer), Some((targets, weights)), Some(cursor)) =
                (&test_calcer, &state.test_targets, &progress.test_cursor)
            {
                tracker.track_test_errors(calcer.compute(cursor.values(), targets, weights));
                if tracker.need_best_test_cursor() && tracker.is_best_test_iteration() {
                    best_test_cursor
                        .get_or_insert_with(|| MirrorBuffer::copy_mapping(cursor.buffer()))
                        .copy_from(cursor.buffer())?;
                }
            }
            tracker.finish_iteration();
        }

        {
            let snapshot = &progress;
            let best = best_test_cursor.as_ref().map(MirrorBuffer::<f32>::as_slice);
            tracker.maybe_save_snapshot(&mut |writer| Ok(snapshot.save(writer, best)?))?;
        }
        if tracker.need_best_test_cursor() {
            if let Some(best) = best_test_cursor {
                let rows = best.len();
                let values = best.into_vec().into_iter().map(f64::from).collect();
                let matrix = Array2::from_shape_vec((1, rows), values)
                    .map_err(|e| TrainError::invariant(e.to_string()))?;
                tracker.set_best_test_cursor(matrix);
            }
        }
        tracing::info!(
            iterations = progress.model.len(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "dynamic boosting finished"
        );
        self.executor.profiler().log_summary();
        Ok(progress.model)
    }

    fn fit_iteration(
        &self,
        state: &BoostingState<'a, O>,
        progress: &mut DynamicBoostingProgress<W::Model>,
        iteration: u32,
    ) -> Result<(), TrainError> {
        let config = self.config;
        let executor = self.executor;
        let profiler = executor.profiler();
        let holder = &state.holder;
        let est = state.estimation_permutation();
        let plain = config.boosting_type == BoostingType::Plain;
        let n = holder.learn().n_rows() as u32;

        // Structure search on one learn permutation.
        let structure = {
            let _guard = profiler.profile("structure_search");
            let perm = progress.rng.next_below(state.learn_permutation_count());
            let target = state.targets.get(perm);
            let mut searcher = self.weak.create_structure_searcher(holder.view(perm));
            searcher.set_random_strength(model_length_mult(
                n,
                f64::from(iteration) * f64::from(config.learning_rate),
            ));
            let folds = state.folds(perm);
            if plain {
                let cursor = progress.cursors.get(perm, 0);
                searcher.set_target(ShiftedTarget::at_point(
                    target,
                    cursor.objects_slice(),
                    cursor.values(),
                )?);
            } else {
                for (f, fold) in folds.iter().enumerate() {
                    let cursor = progress.cursors.get(perm, f as u32);
                    let learn = fold.estimate_samples;
                    let validate = fold.quality_evaluate_samples;
                    searcher.add_task(
                        ShiftedTarget::at_point(target, learn, cursor.slice_view(learn)?)?,
                        ShiftedTarget::at_point(target, validate, cursor.slice_view(validate)?)?,
                    );
                }
            }
            searcher.fit(&mut progress.rng)?
        };
        tracing::trace!(iteration, ?structure, "structure selected");

        let mut cache = ScopedCache::new();
        {
            let _guard = profiler.profile("cache_structure");
            if let Some(test_view) = holder.test_view() {
                self.weak.cache_structure(&mut cache, &structure, &test_view);
            }
            self.weak.cache_structure(&mut cache, &structure, &holder.view(est));
            for p in 0..state.learn_permutation_count() {
                self.weak.cache_structure(&mut cache, &structure, &holder.view(p));
            }
        }

        let models = {
            let _guard = profiler.profile("leaves_estimation");
            let mut estimator = self.weak.create_estimator();
            for p in 0..state.learn_permutation_count() {
                let view = holder.view(p);
                let target = state.targets.get(p);
                for (f, fold) in state.folds(p).iter().enumerate() {
                    let slice = fold.estimate_samples;
                    estimator.add_estimation_task(
                        &cache,
                        &structure,
                        TargetSlice::new(target, slice),
                        &view,
                        progress.cursors.get(p, f as u32).slice_view(slice)?,
                        ModelSlot::Fold {
                            permutation: p,
                            fold: f as u32,
                        },
                    )?;
                }
            }
            let fallback = plain && est == 0;
            if !fallback {
                estimator.add_estimation_task(
                    &cache,
                    &structure,
                    TargetSlice::new(state.targets.get(est), Slice::full(n)),
                    &holder.view(est),
                    progress.cursors.estimation.values(),
                    ModelSlot::Estimation,
                )?;
            }

            let empty = W::Model::from_structure(&structure);
            let shape = progress.cursors.shape();
            let mut models = FoldStorage::create(&shape, |_, _| empty.clone(), empty.clone());
            for (slot, model) in estimator.estimate(executor)? {
                *models.slot_mut(slot) = model;
            }
            let lr = f64::from(config.learning_rate);
            models.for_each_mut(|model| model.rescale(lr));
            if fallback {
                // Plain boosting with one permutation: the single fold is the estimation.
                models.estimation = models.get(0, 0).clone();
            }
            models
        };

        {
            let _guard = profiler.profile("add_model_value");
            let mut add = self.weak.create_add_model_value(&cache);
            let DynamicBoostingProgress {
                cursors, test_cursor, ..
            } = &mut *progress;
            if let Some(test_cursor) = test_cursor.as_mut() {
                add.add_task(&models.estimation, ViewId::Test, test_cursor.values_mut())?;
            }
            add.add_task(&models.estimation, ViewId::Learn(est), cursors.estimation.values_mut())?;
            for (p, fold_cursors) in cursors.fold_data.iter_mut().enumerate() {
                for (f, cursor) in fold_cursors.iter_mut().enumerate() {
                    let expected = state.folds[p][f].all_samples();
                    ensure_invariant!(
                        cursor.objects_slice() == expected,
                        "cursor {} of permutation {} fold {} does not cover {}",
                        cursor.objects_slice(),
                        p,
                        f,
                        expected
                    );
                    add.add_task(
                        models.get(p as u32, f as u32),
                        ViewId::Learn(p as u32),
                        cursor.slice_view_mut(expected)?,
                    )?;
                }
            }
            add.proceed(executor);
        }

        progress.model.push(models.estimation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_length_mult_anneals() {
        let early = model_length_mult(1000, 0.0);
        let late = model_length_mult(1000, 20.0);
        assert_relative_eq!(early, 1000.0 / 1001.0);
        assert!(late < early);
        assert!(late > 0.0);
    }
}
