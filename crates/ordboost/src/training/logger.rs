//! Training progress logging through `tracing`.

use std::path::Path;
use std::time::Instant;

use super::metrics::MetricValue;

/// How much training output to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// Warnings only.
    Warning,
    /// Per-iteration metrics and lifecycle events.
    Info,
    /// Everything, including snapshot and phase timing details.
    Debug,
}

/// Emits training lifecycle events at the configured verbosity.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    iterations: u32,
    started: Option<Instant>,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            iterations: 0,
            started: None,
        }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start_training(&mut self, iterations: u32) {
        self.iterations = iterations;
        self.started = Some(Instant::now());
        if self.enabled(Verbosity::Info) {
            tracing::info!(iterations, "training started");
        }
    }

    pub fn log_restored(&self, iteration: u32) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(iteration, "restored training state from snapshot");
        }
    }

    pub fn log_metrics(&self, iteration: u32, metrics: &[MetricValue]) {
        if !self.enabled(Verbosity::Info) || metrics.is_empty() {
            return;
        }
        let line = metrics
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("  ");
        tracing::info!(iteration, total = self.iterations, "{line}");
    }

    pub fn log_early_stopping(&self, iteration: u32, best_iteration: u32, metric: &str) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(iteration, best_iteration, metric, "overfitting detector stopped training");
        }
    }

    pub fn log_interrupted(&self, iteration: u32) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(iteration, "training interrupted");
        }
    }

    pub fn log_snapshot(&self, path: &Path, iteration: u32) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(path = %path.display(), iteration, "snapshot saved");
        }
    }

    pub fn finish_training(&self) {
        if !self.enabled(Verbosity::Info) {
            return;
        }
        let elapsed = self.started.map(|s| s.elapsed().as_secs_f64()).unwrap_or_default();
        tracing::info!(elapsed_s = elapsed, "training finished");
    }
}
