//! Fold planning for ordered boosting.
//!
//! Within one permutation, fold `k` estimates leaf values on the prefix
//! `EstimateSamples = [0, L_k)` and applies them to the rows of
//! `QualityEvaluateSamples = [L_k, R_k)`. Evaluate ranges chain together and
//! grow geometrically until they cover every row:
//!
//! ```text
//! fold 0: [0, m)   -> [m, m*g)
//! fold 1: [0, m*g) -> [m*g, m*g^2)
//! ...
//! fold K: [0, R)   -> [R, n)
//! ```
//!
//! Every boundary is rounded up to the next group boundary so that no group
//! is split between the estimate and evaluate parts.

use serde::{Deserialize, Serialize};

use crate::config::BoostingType;
use crate::data::SamplesGrouping;
use crate::error::ConfigError;
use crate::slice::Slice;
use crate::utils::{ceil_div, int_log2};

/// Rows below which no row ever needs more than one estimation row.
const SMALL_SAMPLE_COUNT: u32 = 500;

/// Upper bound on the number of folds per permutation.
const MAX_FOLDS: u32 = 18;

/// Rows below which permutations shuffle single rows.
const BLOCK_SHUFFLE_MIN_SAMPLES: u32 = 50_000;

/// A pair of row ranges over one permutation's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub estimate_samples: Slice,
    pub quality_evaluate_samples: Slice,
}

impl Fold {
    /// Rows whose cursor this fold maintains: `[0, evaluate.right)`.
    #[inline]
    pub fn all_samples(&self) -> Slice {
        Slice::full(self.quality_evaluate_samples.right)
    }
}

/// Size of the first estimate range before group alignment.
pub fn min_estimation_size(sample_count: u32, min_fold_size: u32) -> u32 {
    if sample_count < SMALL_SAMPLE_COUNT {
        return 1;
    }
    let folds = int_log2(ceil_div(sample_count, min_fold_size.max(1)));
    if folds >= MAX_FOLDS {
        return ceil_div(sample_count, 1 << MAX_FOLDS);
    }
    min_fold_size.min(sample_count / 50)
}

/// Block size for random permutations.
///
/// Small samples shuffle single rows. Otherwise the configured size is
/// rounded down to a power of two and halved until at least 128 blocks fit.
pub fn permutation_block_size(sample_count: u32, configured: u32) -> u32 {
    if sample_count < BLOCK_SHUFFLE_MIN_SAMPLES {
        return 1;
    }
    let mut block = configured.max(1);
    if block > 1 {
        block = 1 << (31 - block.leading_zeros());
        while block > 1 && u64::from(block) * 128 > u64::from(sample_count) {
            block >>= 1;
        }
    }
    block
}

/// Inputs of [`create_folds`] that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FoldPlan {
    pub boosting_type: BoostingType,
    pub fold_len_multiplier: f64,
    pub min_fold_size: u32,
    pub device_count: u32,
}

/// Build the folds of one permutation.
///
/// Validation happens before the plain-mode shortcut, so plain boosting is
/// rejected on the same inputs as ordered boosting.
pub fn create_folds<G: SamplesGrouping + ?Sized>(
    sample_count: u32,
    grouping: &G,
    plan: &FoldPlan,
) -> Result<Vec<Fold>, ConfigError> {
    let growth = plan.fold_len_multiplier;
    let devices = plan.device_count.max(1);
    let groups = grouping.group_count();

    let mut min_size =
        grouping.next_group_offset_for_line(min_estimation_size(sample_count, plan.min_fold_size));
    if devices > 1 {
        min_size = min_size.max(grouping.group_offset((16 * devices).min(groups / 2)));
    }

    if groups < 4 * devices {
        return Err(ConfigError::InsufficientGroups { groups, devices });
    }
    if min_size == 0 {
        return Err(ConfigError::NonPositiveMinEstimationSize);
    }
    if !(growth > 1.0) {
        return Err(ConfigError::InvalidGrowthRate(growth));
    }

    if plan.boosting_type == BoostingType::Plain {
        let all = Slice::full(sample_count);
        return Ok(vec![Fold {
            estimate_samples: all,
            quality_evaluate_samples: all,
        }]);
    }

    let next_bound = |right: u32| -> u32 {
        let grown = ((f64::from(right) * growth) as u32).min(sample_count);
        let bound = grouping.next_group_offset_for_line(grown);
        if bound > right || right >= sample_count {
            bound
        } else {
            grouping.next_group_offset_for_line(right + 1)
        }
    };

    let mut folds = vec![Fold {
        estimate_samples: Slice::new(0, min_size),
        quality_evaluate_samples: Slice::new(min_size, next_bound(min_size)),
    }];
    loop {
        let right = folds[folds.len() - 1].quality_evaluate_samples.right;
        if right >= sample_count {
            break;
        }
        folds.push(Fold {
            estimate_samples: Slice::new(0, right),
            quality_evaluate_samples: Slice::new(right, next_bound(right)),
        });
    }
    Ok(folds)
}
