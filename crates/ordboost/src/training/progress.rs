//! Progress tracking: stop decisions, metric history and snapshots.
//!
//! The boosting loop only polls [`ProgressTracker::should_stop`]. The tracker
//! owns the iteration budget, the overfitting detector, best-iteration
//! bookkeeping and the snapshot file.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{BoostingConfig, SnapshotParams};
use crate::error::TrainError;

use super::logger::TrainingLogger;
use super::metrics::MetricValue;
use super::overfitting::{DetectorAction, OverfittingDetector};
use super::snapshot;

// =============================================================================
// Interface
// =============================================================================

/// Callback that writes the boosting state into a snapshot.
pub type SaveFn<'a> = dyn FnMut(&mut dyn Write) -> Result<(), TrainError> + 'a;

/// Callback that reads the boosting state from a snapshot.
pub type LoadFn<'a> = dyn FnMut(&mut dyn Read) -> Result<(), TrainError> + 'a;

/// Collaborator deciding when training stops and when state is persisted.
pub trait ProgressTracker {
    fn should_stop(&self) -> bool;

    /// Number of finished iterations.
    fn current_iteration(&self) -> u32;

    /// Persist a snapshot if the policy says so. `save` writes the boosting state.
    fn maybe_save_snapshot(&mut self, save: &mut SaveFn<'_>) -> Result<(), TrainError>;

    /// Restore from an existing snapshot. Returns whether anything was restored.
    fn maybe_restore_from_snapshot(&mut self, load: &mut LoadFn<'_>) -> Result<bool, TrainError>;

    fn track_learn_errors(&mut self, metric: MetricValue);

    fn track_test_errors(&mut self, metric: MetricValue);

    /// Whether the last tracked test metric is the best so far.
    fn is_best_test_iteration(&self) -> bool;

    fn need_best_test_cursor(&self) -> bool;

    /// Receive the best test cursor as an `[approx_dim, test_rows]` matrix.
    fn set_best_test_cursor(&mut self, cursor: Array2<f64>);

    fn finish_iteration(&mut self);

    /// Record that training was interrupted from outside.
    fn mark_interrupted(&mut self);
}

/// Shared flag polled by the boosting loop once per iteration.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    IterationLimit,
    EarlyStopping,
    Interrupted,
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub iterations: u32,
    pub stop_reason: Option<StopReason>,
    /// Iteration with the best test metric.
    pub best_iteration: Option<u32>,
    pub learn_history: Vec<f64>,
    pub test_history: Vec<f64>,
    pub best_test_cursor: Option<Array2<f64>>,
    /// Whether training resumed from a snapshot.
    pub restored: bool,
}

// =============================================================================
// BoostingProgressTracker
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TrackerState {
    iteration: u32,
    learn_history: Vec<f64>,
    test_history: Vec<f64>,
    detector: OverfittingDetector,
    best_test: Option<(u32, f64)>,
    stop_reason: Option<StopReason>,
}

/// Default tracker: iteration budget, overfitting detector and periodic snapshots.
#[derive(Debug)]
pub struct BoostingProgressTracker {
    iterations: u32,
    use_best_model: bool,
    snapshot: Option<SnapshotParams>,
    last_save: Instant,
    state: TrackerState,
    learn_metric: Option<MetricValue>,
    test_metric: Option<MetricValue>,
    is_best_iteration: bool,
    best_test_cursor: Option<Array2<f64>>,
    restored: bool,
    logger: TrainingLogger,
}

impl BoostingProgressTracker {
    pub fn new(config: &BoostingConfig) -> Self {
        let mut logger = TrainingLogger::new(config.verbosity);
        logger.start_training(config.iterations);
        Self {
            iterations: config.iterations,
            use_best_model: config.use_best_model,
            snapshot: config.snapshot.clone(),
            last_save: Instant::now(),
            state: TrackerState {
                detector: OverfittingDetector::new(config.early_stopping_rounds, false),
                ..Default::default()
            },
            learn_metric: None,
            test_metric: None,
            is_best_iteration: false,
            best_test_cursor: None,
            restored: false,
            logger,
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop_reason
    }

    pub fn best_iteration(&self) -> Option<u32> {
        self.state.best_test.map(|(iteration, _)| iteration)
    }

    pub fn logger(&self) -> &TrainingLogger {
        &self.logger
    }

    pub fn into_summary(self) -> TrainingSummary {
        self.logger.finish_training();
        let stop_reason = self.state.stop_reason.or_else(|| {
            (self.state.iteration >= self.iterations).then_some(StopReason::IterationLimit)
        });
        TrainingSummary {
            iterations: self.state.iteration,
            stop_reason,
            best_iteration: self.state.best_test.map(|(iteration, _)| iteration),
            learn_history: self.state.learn_history,
            test_history: self.state.test_history,
            best_test_cursor: self.best_test_cursor,
            restored: self.restored,
        }
    }

    fn write_snapshot(&mut self, path: &Path, save: &mut SaveFn<'_>) -> Result<(), TrainError> {
        let mut buffer = Vec::new();
        snapshot::write_value(&mut buffer, &self.state)?;
        save(&mut buffer)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&buffer)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        self.last_save = Instant::now();
        self.logger.log_snapshot(path, self.state.iteration);
        Ok(())
    }
}

impl ProgressTracker for BoostingProgressTracker {
    fn should_stop(&self) -> bool {
        self.state.stop_reason.is_some() || self.state.iteration >= self.iterations
    }

    fn current_iteration(&self) -> u32 {
        self.state.iteration
    }

    fn maybe_save_snapshot(&mut self, save: &mut SaveFn<'_>) -> Result<(), TrainError> {
        let Some(params) = self.snapshot.clone() else {
            return Ok(());
        };
        if self.should_stop() || self.last_save.elapsed() >= params.interval {
            self.write_snapshot(&params.path, save)?;
        }
        Ok(())
    }

    fn maybe_restore_from_snapshot(&mut self, load: &mut LoadFn<'_>) -> Result<bool, TrainError> {
        let Some(params) = &self.snapshot else {
            return Ok(false);
        };
        if !params.path.exists() {
            return Ok(false);
        }
        let mut reader = BufReader::new(File::open(&params.path)?);
        let mut state: TrackerState = snapshot::read_value(&mut reader)?;
        load(&mut reader)?;
        if state.stop_reason == Some(StopReason::Interrupted) {
            state.stop_reason = None;
        }
        self.state = state;
        self.restored = true;
        self.last_save = Instant::now();
        self.logger.log_restored(self.state.iteration);
        Ok(true)
    }

    fn track_learn_errors(&mut self, metric: MetricValue) {
        self.state.learn_history.push(metric.value);
        self.learn_metric = Some(metric);
    }

    fn track_test_errors(&mut self, metric: MetricValue) {
        let iteration = self.state.iteration;
        self.is_best_iteration = match self.state.best_test {
            None => !metric.value.is_nan(),
            Some((_, best)) => metric.is_better_than_value(best),
        };
        if self.is_best_iteration {
            self.state.best_test = Some((iteration, metric.value));
        }
        self.state.test_history.push(metric.value);
        self.test_metric = Some(metric);
    }

    fn is_best_test_iteration(&self) -> bool {
        self.is_best_iteration
    }

    fn need_best_test_cursor(&self) -> bool {
        self.use_best_model
    }

    fn set_best_test_cursor(&mut self, cursor: Array2<f64>) {
        self.best_test_cursor = Some(cursor);
    }

    fn finish_iteration(&mut self) {
        let iteration = self.state.iteration;
        let metrics: Vec<MetricValue> = self
            .learn_metric
            .take()
            .into_iter()
            .chain(self.test_metric.clone())
            .collect();
        self.logger.log_metrics(iteration, &metrics);

        // The detector follows the test metric when there is one.
        let tracked = self.test_metric.take().or_else(|| metrics.first().cloned());
        if let Some(metric) = tracked {
            if self.state.detector.update(metric.value) == DetectorAction::Stop {
                self.state.stop_reason = Some(StopReason::EarlyStopping);
                self.logger.log_early_stopping(
                    iteration,
                    self.state.detector.best_iteration(),
                    &metric.name,
                );
            }
        }
        self.is_best_iteration = false;
        self.state.iteration += 1;
        if self.state.stop_reason.is_none() && self.state.iteration >= self.iterations {
            self.state.stop_reason = Some(StopReason::IterationLimit);
        }
    }

    fn mark_interrupted(&mut self) {
        self.state.stop_reason = Some(StopReason::Interrupted);
        self.logger.log_interrupted(self.state.iteration);
    }
}
