//! Dynamic boosting integration tests.
//!
//! Focused on loop behavior: fold planning per mode, permutation counts,
//! metric reporting with and without a test set, early stopping and
//! best-model truncation.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use ndarray::{Array2, Axis};
use ordboost::config::{BoostingConfig, BoostingType, SnapshotParams, TreeParams};
use ordboost::data::DataSetsHolder;
use ordboost::device::DeviceExecutor;
use ordboost::slice::Slice;
use ordboost::training::oblivious::{ObliviousTreeLearner, ObliviousTreeModel};
use ordboost::training::snapshot::read_frame;
use ordboost::training::{
    DynamicBoosting, DynamicBoostingProgress, LeavesEstimator, LoadFn, MetricValue, ModelSlot,
    PermutationTarget, ProgressTracker, SaveFn, ScopedCache, SquaredLoss, StopReason, TargetSlice,
    WeakLearner,
};
use ordboost::{train, Dataset, ObjectsOrder, Objective, Parallelism, TrainError};

fn features(n: usize) -> Array2<u8> {
    Array2::from_shape_fn((3, n), |(f, j)| match f {
        0 => ((j * 7) % 16) as u8,
        1 => ((j * 13 + 5) % 8) as u8,
        _ => (j % 3) as u8,
    })
}

fn target_of(bins: &Array2<u8>, j: usize) -> f32 {
    let f0 = f32::from(bins[[0, j]]);
    let f1 = f32::from(bins[[1, j]]);
    10.0 + 0.5 * f0 + if f1 > 3.0 { 2.0 } else { 0.0 } + ((j * 31) % 7) as f32 * 0.1
}

fn regression_data(n: usize) -> Dataset {
    let bins = features(n);
    let targets = (0..n).map(|j| target_of(&bins, j)).collect();
    Dataset::new(bins, targets).unwrap()
}

fn config() -> BoostingConfig {
    BoostingConfig::builder()
        .iterations(20)
        .learning_rate(0.3)
        .tree(TreeParams::with_depth(3))
        .n_threads(1)
        .build()
        .unwrap()
}

fn rmse(predictions: &[f32], targets: &[f32]) -> f64 {
    let sum: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| (f64::from(p) - f64::from(t)).powi(2))
        .sum();
    (sum / predictions.len() as f64).sqrt()
}

/// Records what the loop reports without ever stopping early.
#[derive(Default)]
struct RecordingTracker {
    iterations: u32,
    done: u32,
    learn: Vec<MetricValue>,
    test: Vec<MetricValue>,
    best_cursor: Option<Array2<f64>>,
}

impl ProgressTracker for RecordingTracker {
    fn should_stop(&self) -> bool {
        self.done >= self.iterations
    }

    fn current_iteration(&self) -> u32 {
        self.done
    }

    fn maybe_save_snapshot(&mut self, _save: &mut SaveFn<'_>) -> Result<(), TrainError> {
        Ok(())
    }

    fn maybe_restore_from_snapshot(&mut self, _load: &mut LoadFn<'_>) -> Result<bool, TrainError> {
        Ok(false)
    }

    fn track_learn_errors(&mut self, metric: MetricValue) {
        self.learn.push(metric);
    }

    fn track_test_errors(&mut self, metric: MetricValue) {
        self.test.push(metric);
    }

    fn is_best_test_iteration(&self) -> bool {
        true
    }

    fn need_best_test_cursor(&self) -> bool {
        true
    }

    fn set_best_test_cursor(&mut self, cursor: Array2<f64>) {
        self.best_cursor = Some(cursor);
    }

    fn finish_iteration(&mut self) {
        self.done += 1;
    }

    fn mark_interrupted(&mut self) {}
}

fn run_recorded(config: &BoostingConfig, learn: &Dataset, test: Option<&Dataset>) -> RecordingTracker {
    let executor = DeviceExecutor::new(config.device_count, Parallelism::Sequential);
    let learner = ObliviousTreeLearner::from_config(config, Parallelism::Sequential);
    let mut tracker = RecordingTracker {
        iterations: config.iterations,
        ..Default::default()
    };
    let mut boosting = DynamicBoosting::new(config, Arc::new(Objective::squared()), &learner, &executor);
    boosting.set_data_provider(learn, test).set_progress_tracker(&mut tracker);
    let model = boosting.run().unwrap();
    assert_eq!(model.len(), config.iterations as usize);
    tracker
}

#[test]
fn ordered_training_reduces_learn_loss() {
    let learn = regression_data(600);
    let config = config();
    let (model, summary) = train(&config, Objective::squared(), &learn, None).unwrap();

    assert_eq!(model.len(), 20);
    assert_eq!(summary.iterations, 20);
    assert_eq!(summary.stop_reason, Some(StopReason::IterationLimit));
    assert_eq!(summary.learn_history.len(), 20);
    assert!(summary.learn_history[19] < summary.learn_history[0] * 0.5);
}

#[test]
fn learn_metric_matches_sum_of_estimation_models() {
    let learn = regression_data(600);
    let config = BoostingConfig { iterations: 8, ..config() };
    let (model, summary) = train(&config, Objective::squared(), &learn, None).unwrap();

    let predictions = model.predict(&learn);
    let last = *summary.learn_history.last().unwrap();
    assert_relative_eq!(rmse(&predictions, learn.targets()), last, epsilon = 1e-5);
}

#[test]
fn test_cursor_tracks_the_same_models_as_learn() {
    let learn = regression_data(600);
    let test = learn.clone();
    let config = BoostingConfig { iterations: 6, ..config() };
    let (_, summary) = train(&config, Objective::squared(), &learn, Some(&test)).unwrap();

    assert_eq!(summary.test_history.len(), 6);
    for (learn_value, test_value) in summary.learn_history.iter().zip(&summary.test_history) {
        assert_relative_eq!(learn_value, test_value, epsilon = 1e-6);
    }
}

#[test]
fn plain_mode_uses_single_fold_over_all_rows() {
    let learn = regression_data(1000);
    let config = BoostingConfig {
        boosting_type: BoostingType::Plain,
        ..config()
    };
    let executor = DeviceExecutor::single();
    let learner = ObliviousTreeLearner::from_config(&config, Parallelism::Sequential);
    let mut boosting = DynamicBoosting::new(&config, Arc::new(Objective::squared()), &learner, &executor);
    boosting.set_data_provider(&learn, None);
    let state = boosting.create_state().unwrap();

    for p in 0..state.learn_permutation_count() {
        let folds = state.folds(p);
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].estimate_samples, Slice::full(1000));
        assert_eq!(folds[0].quality_evaluate_samples, Slice::full(1000));
    }
}

#[test]
fn ordered_folds_chain_to_cover_every_row() {
    let learn = regression_data(1000);
    let config = config();
    let executor = DeviceExecutor::single();
    let learner = ObliviousTreeLearner::from_config(&config, Parallelism::Sequential);
    let mut boosting = DynamicBoosting::new(&config, Arc::new(Objective::squared()), &learner, &executor);
    boosting.set_data_provider(&learn, None);
    let state = boosting.create_state().unwrap();

    let folds = state.folds(0);
    assert_eq!(folds[0].estimate_samples, Slice::new(0, 20));
    assert_eq!(folds[0].quality_evaluate_samples, Slice::new(20, 40));
    for pair in folds.windows(2) {
        assert_eq!(pair[0].quality_evaluate_samples.right, pair[1].quality_evaluate_samples.left);
        assert_eq!(pair[1].estimate_samples, Slice::full(pair[1].quality_evaluate_samples.left));
    }
    assert_eq!(folds.last().unwrap().quality_evaluate_samples.right, 1000);
}

#[test]
fn permutation_counts_follow_data_order() {
    let executor = DeviceExecutor::single();

    let learn = regression_data(1000);
    let config = BoostingConfig {
        permutation_count: 2,
        ..self::config()
    };
    let learner = ObliviousTreeLearner::from_config(&config, Parallelism::Sequential);
    let mut boosting = DynamicBoosting::new(&config, Arc::new(Objective::squared()), &learner, &executor);
    boosting.set_data_provider(&learn, None);
    let state = boosting.create_state().unwrap();
    assert_eq!(state.holder().permutation_count(), 2);
    assert_eq!(state.estimation_permutation(), 1);
    assert_eq!(state.learn_permutation_count(), 1);
    assert!(state.holder().permutation(1).is_identity());

    let ordered = regression_data(1000).with_order(ObjectsOrder::Ordered);
    let config = BoostingConfig {
        permutation_count: 4,
        ..self::config()
    };
    let mut boosting = DynamicBoosting::new(&config, Arc::new(Objective::squared()), &learner, &executor);
    boosting.set_data_provider(&ordered, None);
    let state = boosting.create_state().unwrap();
    assert_eq!(state.holder().permutation_count(), 1);
    assert_eq!(state.estimation_permutation(), 0);
    assert_eq!(state.learn_permutation_count(), 1);
}

#[test]
fn single_permutation_plain_mode_trains() {
    let learn = regression_data(300).with_order(ObjectsOrder::Ordered);
    let config = BoostingConfig {
        boosting_type: BoostingType::Plain,
        iterations: 5,
        ..config()
    };
    let tracker = run_recorded(&config, &learn, None);
    assert_eq!(tracker.learn.len(), 5);
    assert!(tracker.learn[4].value < tracker.learn[0].value);
}

#[test]
fn single_permutation_plain_mode_applies_each_model_once() {
    let learn = regression_data(300).with_order(ObjectsOrder::Ordered);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.snapshot");
    let config = BoostingConfig {
        boosting_type: BoostingType::Plain,
        iterations: 4,
        snapshot: Some(SnapshotParams::new(&path).with_interval(Duration::ZERO)),
        ..config()
    };
    let (model, _) = train(&config, Objective::squared(), &learn, None).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut reader = bytes.as_slice();
    read_frame(&mut reader).unwrap();
    let (progress, _) = DynamicBoostingProgress::<ObliviousTreeModel>::load(&mut reader).unwrap();
    assert_eq!(progress.model, model);
    assert_eq!(progress.cursors.shape(), vec![1]);

    // the only fold covers every row and shares the estimation model
    let fold = progress.cursors.get(0, 0);
    assert_eq!(fold.objects_slice(), Slice::full(300));
    assert_eq!(fold.values(), progress.cursors.estimation.values());
    for (cursor, prediction) in fold.values().iter().zip(model.predict(&learn)) {
        assert_relative_eq!(*cursor, prediction, epsilon = 1e-5);
    }

    // first tree: one Newton step on the single fold from a zero cursor
    let first = &model.models()[0];
    let holder = DataSetsHolder::new(&learn, None, 1, 1, config.seed).unwrap();
    let view = holder.view(0);
    let learner = ObliviousTreeLearner::from_config(&config, Parallelism::Sequential);
    let mut cache = ScopedCache::new();
    learner.cache_structure(&mut cache, &first.structure, &view);
    let target = PermutationTarget::new(Arc::new(SquaredLoss), &view).unwrap();
    let mut estimator = learner.create_estimator();
    estimator
        .add_estimation_task(
            &cache,
            &first.structure,
            TargetSlice::new(&target, Slice::full(300)),
            &view,
            &[0.0; 300],
            ModelSlot::Fold { permutation: 0, fold: 0 },
        )
        .unwrap();
    let (_, fold_model) = estimator.estimate(&DeviceExecutor::single()).unwrap().remove(0);
    let lr = f64::from(config.learning_rate);
    for (&value, &fold_value) in first.values.iter().zip(&fold_model.values) {
        assert_relative_eq!(value, (f64::from(fold_value) * lr) as f32, epsilon = 1e-6);
    }
}

#[test]
fn without_test_set_no_test_metrics_are_reported() {
    let learn = regression_data(400);
    let config = BoostingConfig { iterations: 4, ..config() };
    let tracker = run_recorded(&config, &learn, None);

    assert_eq!(tracker.learn.len(), 4);
    assert!(tracker.learn.iter().all(|m| m.name == "learn-RMSE"));
    assert!(tracker.test.is_empty());
    assert!(tracker.best_cursor.is_none());
}

#[test]
fn with_test_set_best_cursor_has_one_row_per_test_object() {
    let learn = regression_data(400);
    let test = regression_data(90);
    let config = BoostingConfig { iterations: 4, ..config() };
    let tracker = run_recorded(&config, &learn, Some(&test));

    assert_eq!(tracker.test.len(), 4);
    assert!(tracker.test.iter().all(|m| m.name == "test-RMSE"));
    let cursor = tracker.best_cursor.unwrap();
    assert_eq!(cursor.dim(), (1, 90));
    assert!(cursor.index_axis(Axis(0), 0).iter().all(|v| v.is_finite()));
}

#[test]
fn early_stopping_follows_test_metric_and_truncates() {
    let learn = regression_data(400);
    let bins = features(120);
    let inverted = (0..120).map(|j| -target_of(&bins, j)).collect();
    let test = Dataset::new(bins, inverted).unwrap();
    let config = BoostingConfig {
        iterations: 50,
        learning_rate: 0.5,
        early_stopping_rounds: Some(2),
        use_best_model: true,
        ..config()
    };

    let (model, summary) = train(&config, Objective::squared(), &learn, Some(&test)).unwrap();
    assert_eq!(summary.stop_reason, Some(StopReason::EarlyStopping));
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.best_iteration, Some(0));
    assert_eq!(model.len(), 1);
    assert!(summary.best_test_cursor.is_some());
}

#[test]
fn use_best_model_keeps_models_up_to_best_iteration() {
    let learn = regression_data(500);
    let test = regression_data(150);
    let config = BoostingConfig {
        iterations: 12,
        use_best_model: true,
        ..config()
    };
    let (model, summary) = train(&config, Objective::squared(), &learn, Some(&test)).unwrap();

    let best = summary.best_iteration.unwrap();
    assert_eq!(summary.iterations, 12);
    assert_eq!(model.len(), best as usize + 1);
}

#[test]
fn multi_device_training_matches_single_device_metrics_shape() {
    let learn = regression_data(800);
    let config = BoostingConfig {
        iterations: 5,
        device_count: 3,
        ..config()
    };
    let (model, summary) = train(&config, Objective::squared(), &learn, None).unwrap();
    assert_eq!(model.len(), 5);
    assert!(summary.learn_history.iter().all(|v| v.is_finite()));
}

#[test]
fn too_few_rows_for_devices_is_rejected() {
    let learn = regression_data(10);
    let config = BoostingConfig {
        device_count: 4,
        ..config()
    };
    let err = train(&config, Objective::squared(), &learn, None).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)), "got: {err:?}");
}
