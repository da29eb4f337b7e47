//! Per-iteration quality metrics.
//!
//! The learn metric is computed from the estimation cursor, the test metric
//! from the test cursor. Both report the objective's own loss.

use std::sync::Arc;

use super::objectives::ObjectiveFn;

// =============================================================================
// MetricValue
// =============================================================================

/// A computed metric value with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    /// Name of the metric (e.g. "learn-RMSE", "test-Logloss").
    pub name: String,
    pub value: f64,
    /// Whether higher values are better.
    pub higher_is_better: bool,
}

impl MetricValue {
    pub fn new(name: impl Into<String>, value: f64, higher_is_better: bool) -> Self {
        Self {
            name: name.into(),
            value,
            higher_is_better,
        }
    }

    /// Returns true if this value is better than a raw value.
    pub fn is_better_than_value(&self, other_value: f64) -> bool {
        if self.higher_is_better {
            self.value > other_value
        } else {
            self.value < other_value
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:.6}", self.name, self.value)
    }
}

// =============================================================================
// MetricCalcer
// =============================================================================

/// Computes the objective's metric over a cursor.
#[derive(Debug)]
pub struct MetricCalcer<O: ?Sized> {
    objective: Arc<O>,
    prefix: &'static str,
}

impl<O: ObjectiveFn + ?Sized> MetricCalcer<O> {
    /// `prefix` names the data set, e.g. "learn" or "test".
    pub fn new(objective: Arc<O>, prefix: &'static str) -> Self {
        Self { objective, prefix }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.prefix, self.objective.name())
    }

    /// Metric of `predictions` against aligned `targets` and `weights`.
    pub fn compute(&self, predictions: &[f32], targets: &[f32], weights: &[f32]) -> MetricValue {
        debug_assert_eq!(predictions.len(), targets.len());
        let loss = self.objective.loss_sum(predictions, targets, weights);
        let weight: f64 = weights.iter().map(|&w| f64::from(w)).sum();
        MetricValue::new(self.name(), self.objective.metric_from_sum(loss, weight), false)
    }
}
