//! Training infrastructure for dynamic boosting.
//!
//! ## Planning
//!
//! - [`create_folds`], [`Fold`]: growing (estimate, evaluate) ranges per permutation
//! - [`PermutationTarget`]: an objective bound to one permutation's row order
//!
//! ## Weak learners
//!
//! - [`WeakLearner`]: structure search, caching, estimation and application
//! - [`oblivious`]: oblivious trees
//! - [`leaves`]: leaf-value estimation over partitioned buffers
//!
//! ## The loop
//!
//! - [`DynamicBoosting`]: the per-iteration fit cycle
//! - [`ProgressTracker`], [`BoostingProgressTracker`]: stopping, metrics, snapshots
//! - [`TrainingLogger`], [`Verbosity`]: structured logging

mod boosting;
mod cache;
mod folds;
pub mod leaves;
mod logger;
mod metrics;
pub mod oblivious;
mod objectives;
mod overfitting;
mod progress;
mod rng;
pub mod snapshot;
mod storage;
mod target;
mod weak;

pub use boosting::{model_length_mult, BoostingState, DynamicBoosting};
pub use cache::ScopedCache;
pub use folds::{
    create_folds, min_estimation_size, permutation_block_size, Fold, FoldPlan,
};
pub use logger::{TrainingLogger, Verbosity};
pub use metrics::{MetricCalcer, MetricValue};
pub use objectives::{CrossEntropyLoss, LogisticLoss, Objective, ObjectiveFn, SquaredLoss};
pub use overfitting::{DetectorAction, OverfittingDetector};
pub use progress::{
    BoostingProgressTracker, InterruptFlag, LoadFn, ProgressTracker, SaveFn, StopReason,
    TrainingSummary,
};
pub use rng::TrainingRng;
pub use snapshot::DynamicBoostingProgress;
pub use storage::{Cursor, FoldStorage, ModelSlot};
pub use target::{PermutationTarget, PermutationTargets, ShiftedTarget, TargetSlice};
pub use weak::{
    AddModelValue, LeavesEstimator, StructureBins, StructureSearcher, WeakLearner, WeakModel,
};
