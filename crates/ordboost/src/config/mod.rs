//! Training configuration with builder pattern.
//!
//! [`BoostingConfig`] groups every read-only input of a training run. It
//! composes nested parameter groups and uses the `bon` crate for the builder,
//! validating in `build()`.
//!
//! # Example
//!
//! ```
//! use ordboost::config::{BoostingConfig, BoostingType, TreeParams};
//!
//! let config = BoostingConfig::builder()
//!     .boosting_type(BoostingType::Plain)
//!     .iterations(200)
//!     .learning_rate(0.1)
//!     .tree(TreeParams::with_depth(4))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.permutation_count, 4);
//! ```

mod params;

use bon::Builder;

pub use params::{
    BoostingType, DataPartition, LeavesEstimationMethod, LeavesEstimationParams, SnapshotParams,
    TreeParams, MAX_DEPTH,
};

use crate::error::ConfigError;
use crate::training::Verbosity;

/// Configuration of a dynamic boosting run.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct BoostingConfig {
    // === Boosting ===
    /// Leakage protection mode. Default: `Ordered`.
    #[builder(default)]
    pub boosting_type: BoostingType,

    /// Maximum number of weak models. Default: 100.
    #[builder(default = 100)]
    pub iterations: u32,

    /// Shrinkage applied to every estimated model. Default: 0.03.
    #[builder(default = 0.03)]
    pub learning_rate: f32,

    // === Permutations and folds ===
    /// Number of permutations including the estimation one. Default: 4.
    #[builder(default = 4)]
    pub permutation_count: u32,

    /// Requested shuffle block size for large samples. Default: 32.
    #[builder(default = 32)]
    pub permutation_block_size: u32,

    /// Growth factor of consecutive fold bounds. Default: 2.0.
    #[builder(default = 2.0)]
    pub fold_len_multiplier: f64,

    /// Base size of the first estimate range. Default: 100.
    #[builder(default = 100)]
    pub min_fold_size: u32,

    // === Nested parameter groups ===
    #[builder(default)]
    pub tree: TreeParams,

    #[builder(default)]
    pub leaves_estimation: LeavesEstimationParams,

    #[builder(default)]
    pub data_partition: DataPartition,

    // === Resources ===
    /// Number of simulated devices. Default: 1.
    #[builder(default = 1)]
    pub device_count: u32,

    /// Worker threads. 0 uses all cores, 1 runs sequentially. Default: 0.
    #[builder(default)]
    pub n_threads: usize,

    // === Reproducibility ===
    /// Seed of permutations and of the training random stream. Default: 0.
    #[builder(default)]
    pub seed: u64,

    // === Stopping and checkpoints ===
    /// Stop after this many iterations without improvement.
    pub early_stopping_rounds: Option<u32>,

    /// Keep the best test cursor and truncate the model to the best iteration.
    #[builder(default)]
    pub use_best_model: bool,

    pub snapshot: Option<SnapshotParams>,

    // === Logging ===
    /// Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: boosting_config_builder::IsComplete> BoostingConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a non-positive learning rate, zero iterations
    /// or permutations, a fold multiplier `<= 1`, a zero minimum fold size,
    /// zero devices, or invalid nested parameters.
    pub fn build(self) -> Result<BoostingConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl BoostingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        if self.permutation_count == 0 {
            return Err(ConfigError::InvalidPermutationCount);
        }
        if !(self.fold_len_multiplier > 1.0) {
            return Err(ConfigError::InvalidGrowthRate(self.fold_len_multiplier));
        }
        if self.min_fold_size == 0 {
            return Err(ConfigError::InvalidMinFoldSize);
        }
        if self.device_count == 0 {
            return Err(ConfigError::InvalidDeviceCount);
        }
        self.tree.validate()?;
        self.leaves_estimation.validate()?;
        Ok(())
    }
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}
