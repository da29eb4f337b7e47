//! Objectives bound to a permutation's row order.

use std::sync::Arc;

use crate::data::DataSetView;
use crate::error::{ensure_invariant, TrainError};
use crate::slice::Slice;

use super::objectives::ObjectiveFn;

/// Objective plus targets and weights gathered into one view's order.
#[derive(Debug)]
pub struct PermutationTarget<O: ?Sized> {
    objective: Arc<O>,
    targets: Vec<f32>,
    weights: Vec<f32>,
    indices: Vec<u32>,
}

impl<O: ObjectiveFn + ?Sized> PermutationTarget<O> {
    /// Bind `objective` to `view`. Fails on an empty view.
    pub fn new(objective: Arc<O>, view: &DataSetView<'_>) -> Result<Self, TrainError> {
        let indices = view.indices().to_vec();
        ensure_invariant!(!indices.is_empty(), "empty row slice for {:?}", view.id());
        Ok(Self {
            objective,
            targets: view.gather(view.dataset().targets()),
            weights: view.weights(),
            indices,
        })
    }

    #[inline]
    pub fn objective(&self) -> &Arc<O> {
        &self.objective
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Original row of every position.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The full range of positions.
    #[inline]
    pub fn objects_slice(&self) -> Slice {
        Slice::full(self.indices.len() as u32)
    }
}

/// One target per learn permutation.
#[derive(Debug)]
pub struct PermutationTargets<O: ?Sized> {
    targets: Vec<PermutationTarget<O>>,
}

impl<O: ObjectiveFn + ?Sized> PermutationTargets<O> {
    pub fn new(targets: Vec<PermutationTarget<O>>) -> Self {
        Self { targets }
    }

    #[inline]
    pub fn get(&self, permutation: u32) -> &PermutationTarget<O> {
        &self.targets[permutation as usize]
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A target restricted to a range of positions.
#[derive(Debug)]
pub struct TargetSlice<'a, O: ?Sized> {
    pub target: &'a PermutationTarget<O>,
    pub slice: Slice,
}

impl<'a, O: ?Sized> Clone for TargetSlice<'a, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, O: ?Sized> Copy for TargetSlice<'a, O> {}

impl<'a, O: ObjectiveFn + ?Sized> TargetSlice<'a, O> {
    pub fn new(target: &'a PermutationTarget<O>, slice: Slice) -> Self {
        Self { target, slice }
    }

    #[inline]
    pub fn targets(&self) -> &'a [f32] {
        &self.target.targets()[self.slice.range()]
    }

    #[inline]
    pub fn weights(&self) -> &'a [f32] {
        &self.target.weights()[self.slice.range()]
    }
}

/// Weighted derivatives of a target slice at a fixed point.
///
/// `grad[i]`, `hess[i]` and `weights[i]` describe position `slice.left + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedTarget {
    pub slice: Slice,
    pub grad: Vec<f64>,
    pub hess: Vec<f64>,
    pub weights: Vec<f64>,
}

impl ShiftedTarget {
    /// Evaluate `target` over `slice` at `point`, where `point[i]` is the
    /// prediction for position `slice.left + i`.
    pub fn at_point<O: ObjectiveFn + ?Sized>(
        target: &PermutationTarget<O>,
        slice: Slice,
        point: &[f32],
    ) -> Result<Self, TrainError> {
        ensure_invariant!(
            point.len() == slice.len() && slice.right as usize <= target.targets().len(),
            "point of {} rows for slice {}",
            point.len(),
            slice
        );
        let view = TargetSlice::new(target, slice);
        let objective = target.objective();
        let n = slice.len();
        let mut grad = Vec::with_capacity(n);
        let mut hess = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for ((&p, &t), &w) in point.iter().zip(view.targets()).zip(view.weights()) {
            let (g, h) = objective.derivatives(f64::from(p), t);
            let w = f64::from(w);
            grad.push(w * g);
            hess.push(w * h);
            weights.push(w);
        }
        Ok(Self {
            slice,
            grad,
            hess,
            weights,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.grad.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.grad.is_empty()
    }

    /// Sum of squared gradients and row count, for noise scaling.
    pub fn gradient_square_sum(&self) -> f64 {
        self.grad.iter().map(|g| g * g).sum()
    }
}
