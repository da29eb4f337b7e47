//! Datasets, row groupings and permuted views.
//!
//! - [`Dataset`]: quantized feature bins plus targets, weights and baseline
//! - [`Grouping`] / [`SamplesGrouping`]: group-boundary queries for folds
//! - [`Permutation`]: seeded block or group shuffles
//! - [`DataSetsHolder`] / [`DataSetView`]: the learn permutations and test view

mod dataset;
mod grouping;
mod permutation;
mod views;

pub use dataset::{Dataset, ObjectsOrder};
pub use grouping::{Grouping, SamplesGrouping};
pub use permutation::Permutation;
pub use views::{DataSetView, DataSetsHolder, ViewId};
