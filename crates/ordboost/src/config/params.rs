//! Nested parameter groups for [`BoostingConfig`](super::BoostingConfig).
//!
//! - [`TreeParams`]: oblivious tree depth, L2 leaf regularization, score noise
//! - [`LeavesEstimationParams`]: the leaf-value descent
//! - [`SnapshotParams`]: where and how often to checkpoint

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Deepest supported oblivious tree (2^16 leaves).
pub const MAX_DEPTH: u32 = 16;

// =============================================================================
// Enums
// =============================================================================

/// Leakage protection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoostingType {
    /// One fold spanning all rows; structure and leaves see the same data.
    Plain,
    /// Growing folds per permutation; rows are scored by models that never saw them.
    #[default]
    Ordered,
}

/// Layout used to obtain leaf bins during leaves estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataPartition {
    /// Read leaf bins from the per-iteration cache.
    #[default]
    FeatureParallel,
    /// Compute leaf bins from the structure for every task.
    DocParallel,
}

/// Step rule of the leaf-value descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeavesEstimationMethod {
    /// Divide the gradient by the Hessian.
    #[default]
    Newton,
    /// Divide the gradient by the leaf weight.
    Gradient,
}

// =============================================================================
// TreeParams
// =============================================================================

/// Oblivious tree parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// Number of levels. Default: 6.
    pub depth: u32,
    /// L2 regularization of leaf values. Default: 3.0.
    pub l2_leaf_reg: f64,
    /// Scale of the Gaussian noise added to split scores. Default: 1.0.
    pub random_strength: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            depth: 6,
            l2_leaf_reg: 3.0,
            random_strength: 1.0,
        }
    }
}

impl TreeParams {
    pub fn with_depth(depth: u32) -> Self {
        Self {
            depth,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth > MAX_DEPTH {
            return Err(ConfigError::InvalidDepth {
                depth: self.depth,
                max: MAX_DEPTH,
            });
        }
        if !(self.l2_leaf_reg >= 0.0) {
            return Err(ConfigError::InvalidRegularization {
                field: "l2_leaf_reg",
                value: self.l2_leaf_reg,
            });
        }
        if !(self.random_strength >= 0.0) {
            return Err(ConfigError::InvalidRegularization {
                field: "random_strength",
                value: self.random_strength,
            });
        }
        Ok(())
    }
}

// =============================================================================
// LeavesEstimationParams
// =============================================================================

/// Leaf-value descent parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LeavesEstimationParams {
    pub method: LeavesEstimationMethod,
    /// Descent steps per estimation. Default: 1.
    pub iterations: u32,
    /// Halve a task's step while it does not decrease that task's loss. Default: true.
    pub backtracking: bool,
    /// Divide each task's derivatives by its total weight. Default: false.
    pub normalize: bool,
    /// Shift leaf values to a zero weighted mean per task. Default: false.
    pub zero_average: bool,
}

impl Default for LeavesEstimationParams {
    fn default() -> Self {
        Self {
            method: LeavesEstimationMethod::Newton,
            iterations: 1,
            backtracking: true,
            normalize: false,
            zero_average: false,
        }
    }
}

impl LeavesEstimationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidLeavesEstimationIterations);
        }
        Ok(())
    }
}

// =============================================================================
// SnapshotParams
// =============================================================================

/// Checkpointing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotParams {
    /// Snapshot file. Restored from on start when it exists.
    pub path: PathBuf,
    /// Minimum time between two saves. A final save happens regardless.
    pub interval: Duration,
}

impl SnapshotParams {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_secs(600),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}
