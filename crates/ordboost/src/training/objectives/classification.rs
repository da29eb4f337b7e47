//! Binary classification objectives on raw log-odds.

use crate::error::DatasetError;

use super::ObjectiveFn;

const HESS_MIN: f64 = 1e-16;

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)` without overflow.
#[inline]
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

#[inline]
fn logistic_loss(prediction: f64, target: f32) -> f64 {
    softplus(prediction) - f64::from(target) * prediction
}

#[inline]
fn logistic_derivatives(prediction: f64, target: f32) -> (f64, f64) {
    let p = sigmoid(prediction);
    (p - f64::from(target), (p * (1.0 - p)).max(HESS_MIN))
}

/// Log loss for binary targets in {0, 1}.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl ObjectiveFn for LogisticLoss {
    fn name(&self) -> &'static str {
        "Logloss"
    }

    #[inline]
    fn loss(&self, prediction: f64, target: f32) -> f64 {
        logistic_loss(prediction, target)
    }

    #[inline]
    fn derivatives(&self, prediction: f64, target: f32) -> (f64, f64) {
        logistic_derivatives(prediction, target)
    }

    fn validate_targets(&self, targets: &[f32]) -> Result<(), DatasetError> {
        match targets.iter().position(|&t| t != 0.0 && t != 1.0) {
            Some(row) => Err(DatasetError::InvalidTarget {
                row,
                value: targets[row],
                reason: "Logloss expects targets in {0, 1}",
            }),
            None => Ok(()),
        }
    }
}

/// Cross-entropy for probabilistic targets in [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl ObjectiveFn for CrossEntropyLoss {
    fn name(&self) -> &'static str {
        "CrossEntropy"
    }

    #[inline]
    fn loss(&self, prediction: f64, target: f32) -> f64 {
        logistic_loss(prediction, target)
    }

    #[inline]
    fn derivatives(&self, prediction: f64, target: f32) -> (f64, f64) {
        logistic_derivatives(prediction, target)
    }

    fn validate_targets(&self, targets: &[f32]) -> Result<(), DatasetError> {
        match targets.iter().position(|t| !(0.0..=1.0).contains(t)) {
            Some(row) => Err(DatasetError::InvalidTarget {
                row,
                value: targets[row],
                reason: "CrossEntropy expects targets in [0, 1]",
            }),
            None => Ok(()),
        }
    }
}
