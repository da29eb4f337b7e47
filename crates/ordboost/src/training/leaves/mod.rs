//! Leaf-value estimation.
//!
//! - [`LeavesEstimationOracle`]: loss and derivatives of a batch of tasks
//! - [`NewtonWalker`]: the descent run over an oracle
//! - [`ObliviousTreeLeavesEstimator`]: the oracle for oblivious trees over partitioned buffers

mod estimator;
mod oracle;

pub use estimator::{ObliviousTreeLeavesEstimator, PermutationDerCalcer};
pub use oracle::{LeavesEstimationOracle, NewtonWalker};
