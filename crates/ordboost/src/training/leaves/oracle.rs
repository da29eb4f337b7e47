//! Descent over leaf values.
//!
//! A [`LeavesEstimationOracle`] exposes the loss of a batch of tasks as a
//! function of one concatenated point. Every task owns a contiguous block of
//! coordinates and its value depends only on that block, so the walker can
//! accept or reject steps per block.

use std::ops::Range;

use crate::config::{LeavesEstimationMethod, LeavesEstimationParams};
use crate::device::DeviceExecutor;
use crate::error::{ensure_invariant, TrainError};

/// Loss and derivatives of a batch of leaf-value tasks.
pub trait LeavesEstimationOracle {
    /// Total number of coordinates. Fails when no task was registered.
    fn point_dim(&self) -> Result<usize, TrainError>;

    /// Size of the diagonal blocks of the Hessian.
    fn hessian_block_size(&self) -> usize {
        1
    }

    /// Coordinate range of every task, in registration order.
    fn blocks(&self) -> Vec<Range<usize>>;

    /// Evaluate every task at `point`.
    fn move_to(&mut self, point: &[f64], executor: &DeviceExecutor) -> Result<(), TrainError>;

    /// Project `point` onto the admissible set.
    fn regularize(&self, point: &mut [f64]);

    /// Loss per block and gradient per coordinate at the current point.
    fn write_value_and_first_derivatives(&self, values: &mut [f64], ders: &mut [f64]);

    /// Diagonal of the Hessian at the current point.
    fn write_second_derivatives(&self, ders2: &mut [f64]);

    /// Sample weight behind every coordinate.
    fn write_weights(&self, weights: &mut [f64]);

    fn make_estimation_result(&self, point: &[f64]) -> Vec<f64> {
        point.to_vec()
    }
}

/// Largest number of step halvings per descent iteration.
const MAX_HALVINGS: u32 = 16;

/// Newton or gradient descent with optional per-block backtracking.
///
/// The walker adds an L2 term `λ/2·Σv²` to every block's loss.
#[derive(Debug, Clone)]
pub struct NewtonWalker {
    method: LeavesEstimationMethod,
    iterations: u32,
    backtracking: bool,
    l2: f64,
}

impl NewtonWalker {
    pub fn new(params: &LeavesEstimationParams, l2: f64) -> Self {
        Self {
            method: params.method,
            iterations: params.iterations,
            backtracking: params.backtracking,
            l2,
        }
    }

    /// Run the descent from the zero point and return the final point.
    pub fn estimate<O: LeavesEstimationOracle + ?Sized>(
        &self,
        oracle: &mut O,
        executor: &DeviceExecutor,
    ) -> Result<Vec<f64>, TrainError> {
        let dim = oracle.point_dim()?;
        let blocks = oracle.blocks();
        ensure_invariant!(
            blocks.last().map_or(0, |b| b.end) == dim,
            "blocks do not cover {} coordinates",
            dim
        );
        ensure_invariant!(oracle.hessian_block_size() == 1, "only diagonal Hessians are supported");

        let mut point = vec![0.0; dim];
        oracle.regularize(&mut point);
        oracle.move_to(&point, executor)?;

        let mut values = vec![0.0; blocks.len()];
        let mut ders = vec![0.0; dim];
        let mut denominators = vec![0.0; dim];

        for iteration in 0..self.iterations {
            self.regularized_value(oracle, &point, &blocks, &mut values, &mut ders);
            match self.method {
                LeavesEstimationMethod::Newton => oracle.write_second_derivatives(&mut denominators),
                LeavesEstimationMethod::Gradient => oracle.write_weights(&mut denominators),
            }
            let step: Vec<f64> = ders
                .iter()
                .zip(&denominators)
                .map(|(&d, &h)| {
                    let denom = h + self.l2;
                    if denom > 0.0 {
                        -d / denom
                    } else {
                        0.0
                    }
                })
                .collect();

            if self.backtracking {
                point = self.backtrack(oracle, executor, &point, &step, &blocks, &values)?;
            } else {
                point.iter_mut().zip(&step).for_each(|(p, s)| *p += s);
                oracle.regularize(&mut point);
            }
            oracle.move_to(&point, executor)?;
            tracing::trace!(iteration, loss = values.iter().sum::<f64>(), "leaves descent step");
        }
        Ok(oracle.make_estimation_result(&point))
    }

    /// Oracle values plus the L2 term.
    fn regularized_value<O: LeavesEstimationOracle + ?Sized>(
        &self,
        oracle: &O,
        point: &[f64],
        blocks: &[Range<usize>],
        values: &mut [f64],
        ders: &mut [f64],
    ) {
        oracle.write_value_and_first_derivatives(values, ders);
        for (value, block) in values.iter_mut().zip(blocks) {
            for i in block.clone() {
                *value += 0.5 * self.l2 * point[i] * point[i];
                ders[i] += self.l2 * point[i];
            }
        }
    }

    /// Halve every block's step until its loss does not increase. Blocks that
    /// never improve keep their old coordinates.
    fn backtrack<O: LeavesEstimationOracle + ?Sized>(
        &self,
        oracle: &mut O,
        executor: &DeviceExecutor,
        point: &[f64],
        step: &[f64],
        blocks: &[Range<usize>],
        old_values: &[f64],
    ) -> Result<Vec<f64>, TrainError> {
        let mut accepted = vec![false; blocks.len()];
        let mut scale = vec![1.0; blocks.len()];
        let mut result = point.to_vec();
        let mut new_values = vec![0.0; blocks.len()];
        let mut scratch = vec![0.0; point.len()];

        for _ in 0..=MAX_HALVINGS {
            let mut candidate = result.clone();
            for (b, block) in blocks.iter().enumerate() {
                if accepted[b] {
                    continue;
                }
                for i in block.clone() {
                    candidate[i] = point[i] + scale[b] * step[i];
                }
            }
            oracle.regularize(&mut candidate);
            oracle.move_to(&candidate, executor)?;
            self.regularized_value(oracle, &candidate, blocks, &mut new_values, &mut scratch);

            for (b, block) in blocks.iter().enumerate() {
                if accepted[b] {
                    continue;
                }
                if new_values[b] <= old_values[b] {
                    accepted[b] = true;
                    result[block.clone()].copy_from_slice(&candidate[block.clone()]);
                } else {
                    scale[b] *= 0.5;
                }
            }
            if accepted.iter().all(|&a| a) {
                break;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Independent quadratics `Σ a_i (x_i - c_i)^2 / 2` grouped into blocks.
    struct Quadratic {
        a: Vec<f64>,
        c: Vec<f64>,
        blocks: Vec<Range<usize>>,
        point: Vec<f64>,
        moves: usize,
    }

    impl Quadratic {
        fn new(a: Vec<f64>, c: Vec<f64>, blocks: Vec<Range<usize>>) -> Self {
            let point = vec![0.0; a.len()];
            Self {
                a,
                c,
                blocks,
                point,
                moves: 0,
            }
        }
    }

    impl LeavesEstimationOracle for Quadratic {
        fn point_dim(&self) -> Result<usize, TrainError> {
            Ok(self.a.len())
        }
        fn blocks(&self) -> Vec<Range<usize>> {
            self.blocks.clone()
        }
        fn move_to(&mut self, point: &[f64], _: &DeviceExecutor) -> Result<(), TrainError> {
            self.point = point.to_vec();
            self.moves += 1;
            Ok(())
        }
        fn regularize(&self, _: &mut [f64]) {}
        fn write_value_and_first_derivatives(&self, values: &mut [f64], ders: &mut [f64]) {
            for (b, block) in self.blocks.iter().enumerate() {
                values[b] = block
                    .clone()
                    .map(|i| 0.5 * self.a[i] * (self.point[i] - self.c[i]).powi(2))
                    .sum();
            }
            for i in 0..self.a.len() {
                ders[i] = self.a[i] * (self.point[i] - self.c[i]);
            }
        }
        fn write_second_derivatives(&self, ders2: &mut [f64]) {
            ders2.copy_from_slice(&self.a);
        }
        fn write_weights(&self, weights: &mut [f64]) {
            weights.fill(1.0);
        }
    }

    fn params(method: LeavesEstimationMethod, iterations: u32, backtracking: bool) -> LeavesEstimationParams {
        LeavesEstimationParams {
            method,
            iterations,
            backtracking,
            ..Default::default()
        }
    }

    #[test]
    fn test_newton_solves_quadratic_in_one_step() {
        let mut oracle = Quadratic::new(vec![2.0, 4.0, 1.0], vec![1.0, -3.0, 5.0], vec![0..2, 2..3]);
        let walker = NewtonWalker::new(&params(LeavesEstimationMethod::Newton, 1, true), 0.0);
        let point = walker.estimate(&mut oracle, &DeviceExecutor::single()).unwrap();
        assert_relative_eq!(point[0], 1.0);
        assert_relative_eq!(point[1], -3.0);
        assert_relative_eq!(point[2], 5.0);
    }

    #[test]
    fn test_l2_shrinks_towards_zero() {
        let mut oracle = Quadratic::new(vec![2.0], vec![3.0], vec![0..1]);
        let walker = NewtonWalker::new(&params(LeavesEstimationMethod::Newton, 1, false), 1.0);
        let point = walker.estimate(&mut oracle, &DeviceExecutor::single()).unwrap();
        assert_relative_eq!(point[0], 2.0 * 3.0 / 3.0);
    }

    #[test]
    fn test_backtracking_rejects_overshooting_blocks_independently() {
        // Gradient steps with unit weights overshoot the stiff block (a = 8)
        // and are halved; the soft block (a = 1) takes the full step.
        let mut oracle = Quadratic::new(vec![1.0, 8.0], vec![1.0, 1.0], vec![0..1, 1..2]);
        let walker = NewtonWalker::new(&params(LeavesEstimationMethod::Gradient, 1, true), 0.0);
        let point = walker.estimate(&mut oracle, &DeviceExecutor::single()).unwrap();
        assert_relative_eq!(point[0], 1.0);
        // From loss 4: step 8 gives 196, step 4 gives 36, step 2 gives 4.
        assert_relative_eq!(point[1], 2.0);
    }

    #[test]
    fn test_block_results_do_not_depend_on_neighbours() {
        let walker = NewtonWalker::new(&params(LeavesEstimationMethod::Gradient, 3, true), 0.5);
        let mut alone = Quadratic::new(vec![8.0], vec![1.0], vec![0..1]);
        let mut together = Quadratic::new(vec![1.0, 8.0], vec![-2.0, 1.0], vec![0..1, 1..2]);
        let a = walker.estimate(&mut alone, &DeviceExecutor::single()).unwrap();
        let b = walker.estimate(&mut together, &DeviceExecutor::single()).unwrap();
        assert_eq!(a[0], b[1]);
    }

    #[test]
    fn test_empty_oracle_is_usage_error() {
        struct Empty;
        impl LeavesEstimationOracle for Empty {
            fn point_dim(&self) -> Result<usize, TrainError> {
                Err(TrainError::Usage("no tasks".into()))
            }
            fn blocks(&self) -> Vec<Range<usize>> {
                Vec::new()
            }
            fn move_to(&mut self, _: &[f64], _: &DeviceExecutor) -> Result<(), TrainError> {
                Ok(())
            }
            fn regularize(&self, _: &mut [f64]) {}
            fn write_value_and_first_derivatives(&self, _: &mut [f64], _: &mut [f64]) {}
            fn write_second_derivatives(&self, _: &mut [f64]) {}
            fn write_weights(&self, _: &mut [f64]) {}
        }
        let walker = NewtonWalker::new(&LeavesEstimationParams::default(), 0.0);
        assert!(matches!(
            walker.estimate(&mut Empty, &DeviceExecutor::single()),
            Err(TrainError::Usage(_))
        ));
    }
}
