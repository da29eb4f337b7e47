//! ordboost: ordered (dynamic) gradient boosting over oblivious trees.
//!
//! Training keeps several random permutations of the learn rows. Within each
//! permutation, rows are scored by models fitted only on rows that precede
//! them, which keeps a row's own target out of its gradient.
//!
//! # Key Types
//!
//! - [`BoostingConfig`] - Configuration builder
//! - [`Dataset`] - Quantized features, targets, weights, baseline, groups
//! - [`DynamicBoosting`](training::DynamicBoosting) - The boosting loop
//! - [`AdditiveModel`] - The trained ensemble
//!
//! # Training
//!
//! ```
//! use ndarray::Array2;
//! use ordboost::{train, BoostingConfig, Dataset, Objective};
//!
//! let features = Array2::from_shape_fn((1, 200), |(_, j)| (j % 8) as u8);
//! let targets = (0..200).map(|j| (j % 8) as f32).collect();
//! let learn = Dataset::new(features, targets).unwrap();
//!
//! let config = BoostingConfig::builder().iterations(10).learning_rate(0.3).build().unwrap();
//! let (model, summary) = train(&config, Objective::squared(), &learn, None).unwrap();
//! assert_eq!(model.len(), 10);
//! assert_eq!(summary.iterations, 10);
//! ```

pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod model;
pub mod slice;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use config::{BoostingConfig, BoostingType};
pub use data::{Dataset, ObjectsOrder};
pub use error::{ConfigError, DatasetError, SnapshotError, TrainError};
pub use model::{train, train_with_interrupt, AdditiveModel};
pub use training::{Objective, ObjectiveFn};
pub use utils::{run_with_threads, Parallelism};
