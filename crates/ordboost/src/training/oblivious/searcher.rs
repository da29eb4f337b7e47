//! Greedy depth-wise search of an oblivious tree structure.
//!
//! Each level picks the single `(feature, border)` split that maximizes the
//! summed score over all tasks and all current leaves. For a task the score of
//! a child with learn sums `(G, H)` and validate sums `(Gv, Hv)` is the loss
//! decrease on the validate rows when the child's value is fitted on the learn
//! rows:
//!
//! ```text
//! v     = -G / (H + λ)
//! score = -(Gv·v + ½·Hv·v²)
//! ```
//!
//! Plain boosting scores on the learn rows themselves.

use crate::config::TreeParams;
use crate::data::DataSetView;
use crate::error::{ensure_invariant, TrainError};
use crate::training::rng::TrainingRng;
use crate::training::target::ShiftedTarget;
use crate::training::weak::StructureSearcher;
use crate::utils::Parallelism;

use super::structure::{BinarySplit, ObliviousTreeStructure};

/// `(grad_sum, hess_sum)`.
type HistogramBin = (f64, f64);

#[derive(Debug)]
struct SearchTask {
    learn: ShiftedTarget,
    learn_leaves: Vec<u32>,
    /// `None` scores on the learn rows.
    validate: Option<(ShiftedTarget, Vec<u32>)>,
}

impl SearchTask {
    fn new(learn: ShiftedTarget, validate: Option<ShiftedTarget>) -> Self {
        Self {
            learn_leaves: vec![0; learn.len()],
            learn,
            validate: validate.map(|v| {
                let leaves = vec![0; v.len()];
                (v, leaves)
            }),
        }
    }
}

/// Structure searcher over one learn permutation.
#[derive(Debug)]
pub struct ObliviousTreeSearcher<'a> {
    view: DataSetView<'a>,
    params: &'a TreeParams,
    parallelism: Parallelism,
    model_length_mult: f64,
    tasks: Vec<SearchTask>,
}

impl<'a> ObliviousTreeSearcher<'a> {
    pub fn new(view: DataSetView<'a>, params: &'a TreeParams, parallelism: Parallelism) -> Self {
        Self {
            view,
            params,
            parallelism,
            model_length_mult: 1.0,
            tasks: Vec::new(),
        }
    }

    /// Standard deviation of the score noise.
    fn noise_std(&self) -> f64 {
        if self.params.random_strength <= 0.0 {
            return 0.0;
        }
        let (sum, count) = self.tasks.iter().fold((0.0, 0usize), |(s, c), task| {
            (s + task.learn.gradient_square_sum(), c + task.learn.len())
        });
        if count == 0 {
            return 0.0;
        }
        self.params.random_strength * self.model_length_mult * (sum / count as f64).sqrt()
    }

    fn histogram(
        &self,
        feature: usize,
        target: &ShiftedTarget,
        leaves_of_rows: &[u32],
        n_bins: usize,
        leaves: usize,
    ) -> Vec<HistogramBin> {
        let mut hist = vec![(0.0, 0.0); leaves * n_bins];
        let first = target.slice.left as usize;
        for (i, &leaf) in leaves_of_rows.iter().enumerate() {
            let bin = self.view.bin(feature, first + i) as usize;
            let slot = &mut hist[leaf as usize * n_bins + bin];
            slot.0 += target.grad[i];
            slot.1 += target.hess[i];
        }
        hist
    }

    /// Scores of every border of `feature`, summed over tasks and leaves.
    fn score_feature(&self, feature: usize, leaves: usize) -> Vec<f64> {
        let n_bins = self.view.dataset().n_bins(feature) as usize;
        if n_bins < 2 {
            return Vec::new();
        }
        let l2 = self.params.l2_leaf_reg;
        let mut scores = vec![0.0; n_bins - 1];
        for task in &self.tasks {
            let learn = self.histogram(feature, &task.learn, &task.learn_leaves, n_bins, leaves);
            let validate = task.validate.as_ref().map(|(target, rows)| {
                self.histogram(feature, target, rows, n_bins, leaves)
            });
            let validate = validate.as_deref().unwrap_or(&learn);

            for leaf in 0..leaves {
                let lh = &learn[leaf * n_bins..(leaf + 1) * n_bins];
                let vh = &validate[leaf * n_bins..(leaf + 1) * n_bins];
                let total_l = sum_bins(lh);
                let total_v = sum_bins(vh);
                let (mut left_l, mut left_v) = ((0.0, 0.0), (0.0, 0.0));
                for border in 0..n_bins - 1 {
                    left_l = add(left_l, lh[border]);
                    left_v = add(left_v, vh[border]);
                    let right_l = sub(total_l, left_l);
                    let right_v = sub(total_v, left_v);
                    scores[border] += child_score(left_l, left_v, l2) + child_score(right_l, right_v, l2);
                }
            }
        }
        scores
    }

    fn apply_split(&mut self, split: BinarySplit, level: usize) {
        let view = self.view;
        let feature = split.feature as usize;
        let update = |target: &ShiftedTarget, leaves: &mut [u32]| {
            let first = target.slice.left as usize;
            for (i, leaf) in leaves.iter_mut().enumerate() {
                if split.goes_right(view.bin(feature, first + i)) {
                    *leaf |= 1 << level;
                }
            }
        };
        for task in &mut self.tasks {
            update(&task.learn, &mut task.learn_leaves);
            if let Some((target, leaves)) = task.validate.as_mut() {
                update(target, leaves);
            }
        }
    }
}

#[inline]
fn add(a: HistogramBin, b: HistogramBin) -> HistogramBin {
    (a.0 + b.0, a.1 + b.1)
}

#[inline]
fn sub(a: HistogramBin, b: HistogramBin) -> HistogramBin {
    (a.0 - b.0, a.1 - b.1)
}

#[inline]
fn sum_bins(bins: &[HistogramBin]) -> HistogramBin {
    bins.iter().fold((0.0, 0.0), |acc, &b| add(acc, b))
}

#[inline]
fn child_score(learn: HistogramBin, validate: HistogramBin, l2: f64) -> f64 {
    let denom = learn.1 + l2;
    if denom <= 0.0 {
        return 0.0;
    }
    let value = -learn.0 / denom;
    -(validate.0 * value + 0.5 * validate.1 * value * value)
}

impl StructureSearcher for ObliviousTreeSearcher<'_> {
    type Structure = ObliviousTreeStructure;

    fn set_random_strength(&mut self, model_length_mult: f64) {
        self.model_length_mult = model_length_mult;
    }

    fn set_target(&mut self, target: ShiftedTarget) {
        self.tasks = vec![SearchTask::new(target, None)];
    }

    fn add_task(&mut self, learn: ShiftedTarget, validate: ShiftedTarget) {
        self.tasks.push(SearchTask::new(learn, Some(validate)));
    }

    fn fit(mut self, rng: &mut TrainingRng) -> Result<ObliviousTreeStructure, TrainError> {
        ensure_invariant!(!self.tasks.is_empty(), "structure search started without a target");
        let n_features = self.view.dataset().n_features();
        let noise_std = self.noise_std();
        let mut splits: Vec<BinarySplit> = Vec::with_capacity(self.params.depth as usize);

        for level in 0..self.params.depth as usize {
            let leaves = 1usize << level;
            let this = &self;
            let feature_scores = self
                .parallelism
                .maybe_par_map(0..n_features, |f| this.score_feature(f, leaves));

            // Noise is drawn in candidate order so the stream stays reproducible.
            let mut best: Option<(f64, BinarySplit)> = None;
            for (feature, scores) in feature_scores.iter().enumerate() {
                for (border, &score) in scores.iter().enumerate() {
                    let split = BinarySplit {
                        feature: feature as u32,
                        border: border as u8,
                    };
                    if splits.contains(&split) {
                        continue;
                    }
                    let score = score + rng.gaussian(noise_std);
                    if best.map_or(true, |(b, _)| score > b) {
                        best = Some((score, split));
                    }
                }
            }
            let Some((score, split)) = best else {
                tracing::trace!(level, "no split candidates left");
                break;
            };
            tracing::trace!(level, feature = split.feature, border = split.border, score, "split");
            self.apply_split(split, level);
            splits.push(split);
        }
        Ok(ObliviousTreeStructure::new(splits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataSetsHolder, Dataset};
    use crate::slice::Slice;
    use crate::training::objectives::SquaredLoss;
    use crate::training::target::PermutationTarget;
    use ndarray::Array2;
    use std::sync::Arc;

    /// Feature 0 is noise, feature 1 determines the target.
    fn dataset() -> Dataset {
        let n = 64;
        let features = Array2::from_shape_fn((2, n), |(f, j)| match f {
            0 => ((j * 7) % 5) as u8,
            _ => (j % 4) as u8,
        });
        let targets = (0..n).map(|j| if j % 4 >= 2 { 10.0 } else { -10.0 }).collect();
        Dataset::new(features, targets).unwrap()
    }

    fn shifted(holder: &DataSetsHolder<'_>, slice: Slice) -> ShiftedTarget {
        let target = PermutationTarget::new(Arc::new(SquaredLoss), &holder.view(0)).unwrap();
        ShiftedTarget::at_point(&target, slice, &vec![0.0; slice.len()]).unwrap()
    }

    #[test]
    fn test_finds_informative_split() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let params = TreeParams {
            depth: 1,
            l2_leaf_reg: 1.0,
            random_strength: 0.0,
        };
        let mut searcher = ObliviousTreeSearcher::new(holder.view(0), &params, Parallelism::Sequential);
        searcher.set_target(shifted(&holder, Slice::full(64)));
        let structure = searcher.fit(&mut TrainingRng::new(0)).unwrap();
        assert_eq!(structure.splits, vec![BinarySplit { feature: 1, border: 1 }]);
    }

    #[test]
    fn test_ordered_tasks_agree_with_plain_on_clear_signal() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let params = TreeParams {
            depth: 1,
            l2_leaf_reg: 1.0,
            random_strength: 0.0,
        };
        let mut searcher = ObliviousTreeSearcher::new(holder.view(0), &params, Parallelism::Parallel);
        searcher.add_task(shifted(&holder, Slice::new(0, 16)), shifted(&holder, Slice::new(16, 32)));
        searcher.add_task(shifted(&holder, Slice::new(0, 32)), shifted(&holder, Slice::new(32, 64)));
        let structure = searcher.fit(&mut TrainingRng::new(0)).unwrap();
        assert_eq!(structure.splits[0].feature, 1);
    }

    #[test]
    fn test_zero_strength_is_deterministic_and_draws_nothing() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let params = TreeParams {
            depth: 3,
            l2_leaf_reg: 1.0,
            random_strength: 0.0,
        };
        let run = |rng: &mut TrainingRng| {
            let mut s = ObliviousTreeSearcher::new(holder.view(0), &params, Parallelism::Sequential);
            s.set_target(shifted(&holder, Slice::full(64)));
            s.fit(rng).unwrap()
        };
        let mut rng = TrainingRng::new(1);
        let before = rng.clone();
        let a = run(&mut rng);
        assert_eq!(rng, before);
        let b = run(&mut TrainingRng::new(2));
        assert_eq!(a, b);
        let distinct: std::collections::HashSet<_> = a.splits.iter().collect();
        assert_eq!(distinct.len(), a.splits.len());
    }

    #[test]
    fn test_noise_depends_only_on_rng_state() {
        let ds = dataset();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let params = TreeParams {
            depth: 2,
            l2_leaf_reg: 1.0,
            random_strength: 50.0,
        };
        let run = |seed: u64| {
            let mut s = ObliviousTreeSearcher::new(holder.view(0), &params, Parallelism::Parallel);
            s.set_random_strength(1.0);
            s.set_target(shifted(&holder, Slice::full(64)));
            s.fit(&mut TrainingRng::new(seed)).unwrap()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_stops_when_candidates_run_out() {
        let features = Array2::from_shape_fn((1, 8), |(_, j)| (j % 2) as u8);
        let ds = Dataset::new(features, vec![1.0; 8]).unwrap();
        let holder = DataSetsHolder::new(&ds, None, 1, 1, 0).unwrap();
        let params = TreeParams {
            depth: 4,
            l2_leaf_reg: 1.0,
            random_strength: 0.0,
        };
        let mut s = ObliviousTreeSearcher::new(holder.view(0), &params, Parallelism::Sequential);
        s.set_target(shifted(&holder, Slice::full(8)));
        let structure = s.fit(&mut TrainingRng::new(0)).unwrap();
        assert_eq!(structure.depth(), 1);
    }
}
