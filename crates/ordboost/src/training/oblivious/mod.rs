//! Oblivious decision trees: structure, greedy search and the weak learner.

mod learner;
mod searcher;
mod structure;

pub use learner::ObliviousTreeLearner;
pub use searcher::ObliviousTreeSearcher;
pub use structure::{BinarySplit, ObliviousTreeModel, ObliviousTreeStructure};
