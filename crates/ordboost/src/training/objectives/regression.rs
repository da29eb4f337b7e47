//! Regression objectives.

use super::ObjectiveFn;

/// Squared error, reported as RMSE.
///
/// The per-row loss is `0.5 * (f - y)²` so that `grad = f - y` and `hess = 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl ObjectiveFn for SquaredLoss {
    fn name(&self) -> &'static str {
        "RMSE"
    }

    #[inline]
    fn loss(&self, prediction: f64, target: f32) -> f64 {
        let d = prediction - f64::from(target);
        0.5 * d * d
    }

    #[inline]
    fn derivatives(&self, prediction: f64, target: f32) -> (f64, f64) {
        (prediction - f64::from(target), 1.0)
    }

    fn metric_from_sum(&self, loss_sum: f64, weight_sum: f64) -> f64 {
        if weight_sum > 0.0 {
            (2.0 * loss_sum / weight_sum).sqrt()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_squared_derivatives() {
        let (g, h) = SquaredLoss.derivatives(2.5, 1.0);
        assert_relative_eq!(g, 1.5);
        assert_relative_eq!(h, 1.0);
    }

    #[test]
    fn test_rmse_from_sum() {
        let preds = [1.0f32, 3.0];
        let targets = [0.0f32, 0.0];
        let sum = SquaredLoss.loss_sum(&preds, &targets, &[1.0, 1.0]);
        assert_relative_eq!(SquaredLoss.metric_from_sum(sum, 2.0), 5.0f64.sqrt());
    }
}
