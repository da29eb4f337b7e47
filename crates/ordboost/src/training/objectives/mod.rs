//! Objective (loss) functions.
//!
//! Objectives are expressed per row: a loss value plus its first and second
//! derivative with respect to the raw prediction. Aggregation (weighting,
//! reduction by leaf, normalization) is done by the callers.
//!
//! # Available Objectives
//!
//! - [`SquaredLoss`]: `RMSE`, regression
//! - [`LogisticLoss`]: `Logloss`, binary targets in {0, 1}
//! - [`CrossEntropyLoss`]: `CrossEntropy`, probabilistic targets in [0, 1]

mod classification;
mod regression;

use std::sync::Arc;

pub use classification::{CrossEntropyLoss, LogisticLoss};
pub use regression::SquaredLoss;

use crate::error::DatasetError;

// =============================================================================
// Objective Trait
// =============================================================================

/// A differentiable per-row loss.
///
/// Derivatives follow the loss convention: `grad = dL/df` and
/// `hess = d²L/df²`, so a Newton step towards the optimum is `-grad / hess`.
pub trait ObjectiveFn: Send + Sync {
    /// Name used in logs and metric names.
    fn name(&self) -> &'static str;

    /// Unweighted loss of a single row.
    fn loss(&self, prediction: f64, target: f32) -> f64;

    /// `(grad, hess)` of a single row.
    fn derivatives(&self, prediction: f64, target: f32) -> (f64, f64);

    /// Reject targets the loss is not defined for.
    fn validate_targets(&self, _targets: &[f32]) -> Result<(), DatasetError> {
        Ok(())
    }

    /// Turn a weighted loss sum into the reported metric.
    fn metric_from_sum(&self, loss_sum: f64, weight_sum: f64) -> f64 {
        if weight_sum > 0.0 {
            loss_sum / weight_sum
        } else {
            0.0
        }
    }

    /// Weighted loss sum over aligned slices.
    fn loss_sum(&self, predictions: &[f32], targets: &[f32], weights: &[f32]) -> f64 {
        predictions
            .iter()
            .zip(targets)
            .zip(weights)
            .map(|((&p, &t), &w)| f64::from(w) * self.loss(f64::from(p), t))
            .sum()
    }
}

// =============================================================================
// Objective Enum
// =============================================================================

/// Objective selection for training.
///
/// Wraps the built-in losses and user-provided implementations behind one
/// `ObjectiveFn` implementation.
#[derive(Clone)]
pub enum Objective {
    SquaredLoss(SquaredLoss),
    LogisticLoss(LogisticLoss),
    CrossEntropyLoss(CrossEntropyLoss),
    /// User-provided loss.
    Custom(Arc<dyn ObjectiveFn>),
}

impl std::fmt::Debug for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SquaredLoss(inner) => f.debug_tuple("SquaredLoss").field(inner).finish(),
            Self::LogisticLoss(inner) => f.debug_tuple("LogisticLoss").field(inner).finish(),
            Self::CrossEntropyLoss(inner) => f.debug_tuple("CrossEntropyLoss").field(inner).finish(),
            Self::Custom(inner) => f.debug_tuple("Custom").field(&inner.name()).finish(),
        }
    }
}

impl Objective {
    pub fn squared() -> Self {
        Self::SquaredLoss(SquaredLoss)
    }

    pub fn logistic() -> Self {
        Self::LogisticLoss(LogisticLoss)
    }

    pub fn cross_entropy() -> Self {
        Self::CrossEntropyLoss(CrossEntropyLoss)
    }

    pub fn custom(objective: impl ObjectiveFn + 'static) -> Self {
        Self::Custom(Arc::new(objective))
    }

    fn inner(&self) -> &dyn ObjectiveFn {
        match self {
            Self::SquaredLoss(inner) => inner,
            Self::LogisticLoss(inner) => inner,
            Self::CrossEntropyLoss(inner) => inner,
            Self::Custom(inner) => inner.as_ref(),
        }
    }
}

impl Default for Objective {
    fn default() -> Self {
        Self::squared()
    }
}

impl ObjectiveFn for Objective {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    #[inline]
    fn loss(&self, prediction: f64, target: f32) -> f64 {
        self.inner().loss(prediction, target)
    }

    #[inline]
    fn derivatives(&self, prediction: f64, target: f32) -> (f64, f64) {
        self.inner().derivatives(prediction, target)
    }

    fn validate_targets(&self, targets: &[f32]) -> Result<(), DatasetError> {
        self.inner().validate_targets(targets)
    }

    fn metric_from_sum(&self, loss_sum: f64, weight_sum: f64) -> f64 {
        self.inner().metric_from_sum(loss_sum, weight_sum)
    }
}
